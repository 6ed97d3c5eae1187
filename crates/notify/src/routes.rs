//! Static delivery route policies keyed by (type, priority).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::NotifyError;
use crate::types::{Channel, NotificationPriority, NotificationType};

/// How notifications of one (type, priority) are delivered and retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutePolicy {
    pub default_channels: Vec<Channel>,
    #[serde(default)]
    pub fallback_channels: Vec<Channel>,
    /// When false a successful send counts as delivered.
    #[serde(default)]
    pub require_confirmation: bool,
    /// Becomes the notification's `max_retries`.
    pub max_attempts: u32,
    /// Minutes to wait before retry N, indexed by `retry_count - 1`.
    #[serde(default)]
    pub retry_delay_minutes: Vec<u32>,
    #[serde(default)]
    pub escalate_on_failure: bool,
    #[serde(default)]
    pub escalation_role: Option<String>,
}

impl RoutePolicy {
    fn new(
        default_channels: &[Channel],
        fallback_channels: &[Channel],
        require_confirmation: bool,
        max_attempts: u32,
        retry_delay_minutes: &[u32],
        escalate_on_failure: bool,
    ) -> Self {
        Self {
            default_channels: default_channels.to_vec(),
            fallback_channels: fallback_channels.to_vec(),
            require_confirmation,
            max_attempts,
            retry_delay_minutes: retry_delay_minutes.to_vec(),
            escalate_on_failure,
            escalation_role: None,
        }
    }
}

/// One row of a YAML route table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteEntry {
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    #[serde(default)]
    pub priority: Option<NotificationPriority>,
    #[serde(flatten)]
    pub policy: RoutePolicy,
}

/// Lookup `(type, priority)` → `(type)` → catch-all.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: HashMap<(NotificationType, Option<NotificationPriority>), RoutePolicy>,
    catch_all: RoutePolicy,
    default_escalation_role: String,
}

impl RouteTable {
    /// An empty table that routes everything through `catch_all`.
    pub fn new(catch_all: RoutePolicy) -> Self {
        Self {
            routes: HashMap::new(),
            catch_all,
            default_escalation_role: "supervisor".to_string(),
        }
    }

    pub fn insert(
        &mut self,
        notification_type: NotificationType,
        priority: Option<NotificationPriority>,
        policy: RoutePolicy,
    ) {
        self.routes.insert((notification_type, priority), policy);
    }

    pub fn with_escalation_role(mut self, role: impl Into<String>) -> Self {
        self.default_escalation_role = role.into();
        self
    }

    /// Resolve the policy for a notification.
    pub fn resolve(
        &self,
        notification_type: NotificationType,
        priority: NotificationPriority,
    ) -> &RoutePolicy {
        self.routes
            .get(&(notification_type, Some(priority)))
            .or_else(|| self.routes.get(&(notification_type, None)))
            .unwrap_or(&self.catch_all)
    }

    /// Role an exhausted notification on `policy` is escalated to.
    pub fn escalation_role<'a>(&'a self, policy: &'a RoutePolicy) -> &'a str {
        policy
            .escalation_role
            .as_deref()
            .unwrap_or(&self.default_escalation_role)
    }

    /// Layer YAML route entries over the built-in defaults.
    ///
    /// ```yaml
    /// - type: dispatch_alert
    ///   priority: critical
    ///   default_channels: [sms, voice]
    ///   fallback_channels: [email]
    ///   require_confirmation: true
    ///   max_attempts: 5
    ///   retry_delay_minutes: [1, 2, 5, 10]
    ///   escalate_on_failure: true
    /// ```
    pub fn from_yaml_str(yaml: &str) -> Result<Self, NotifyError> {
        let entries: Vec<RouteEntry> =
            serde_yaml::from_str(yaml).map_err(|e| NotifyError::Config(format!("invalid route table: {e}")))?;
        let mut table = Self::default();
        for entry in entries {
            if entry.policy.max_attempts == 0 {
                return Err(NotifyError::Config(format!(
                    "route {} has max_attempts = 0",
                    entry.notification_type
                )));
            }
            table.insert(entry.notification_type, entry.priority, entry.policy);
        }
        Ok(table)
    }
}

impl Default for RouteTable {
    /// Built-in routing for the alert types this system emits.
    fn default() -> Self {
        use Channel::*;
        use NotificationPriority::*;
        use NotificationType::*;

        let mut table = RouteTable::new(RoutePolicy::new(&[Push, Email], &[Sms], false, 3, &[5, 15, 60], false));

        table.insert(DispatchAlert, Some(Critical), RoutePolicy::new(&[Sms, Voice, Push], &[Email], true, 5, &[1, 2, 5, 10], true));
        table.insert(DispatchAlert, Some(Urgent), RoutePolicy::new(&[Sms, Push], &[Voice, Email], true, 4, &[2, 5, 10], true));
        table.insert(DispatchAlert, None, RoutePolicy::new(&[Push, Sms], &[Email], true, 3, &[5, 15], true));
        table.insert(DispatchReminder, None, RoutePolicy::new(&[Push, Sms], &[Email], false, 3, &[5, 15], false));
        table.insert(DispatchEscalation, None, RoutePolicy::new(&[Sms, Voice], &[Email], true, 5, &[1, 2, 5, 10], true));
        table.insert(PoliceNotice, None, RoutePolicy::new(&[Email], &[Sms], true, 3, &[5, 15], true));
        table.insert(StatusUpdate, None, RoutePolicy::new(&[InApp, Push, Email], &[Email], false, 2, &[15], false));
        table.insert(System, None, RoutePolicy::new(&[Email], &[], false, 1, &[], false));

        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_type_and_priority_first() {
        let table = RouteTable::default();
        let p = table.resolve(NotificationType::DispatchAlert, NotificationPriority::Critical);
        assert_eq!(p.max_attempts, 5);
        assert_eq!(p.default_channels[0], Channel::Sms);
    }

    #[test]
    fn falls_back_to_type_only() {
        let table = RouteTable::default();
        let p = table.resolve(NotificationType::DispatchAlert, NotificationPriority::Low);
        assert_eq!(p.max_attempts, 3);
        assert_eq!(p.retry_delay_minutes, vec![5, 15]);
    }

    #[test]
    fn unknown_combination_uses_catch_all() {
        let table = RouteTable::new(RoutePolicy::new(&[Channel::Email], &[], false, 2, &[10], false));
        let p = table.resolve(NotificationType::PoliceNotice, NotificationPriority::High);
        assert_eq!(p.default_channels, vec![Channel::Email]);
        assert_eq!(p.max_attempts, 2);
    }

    #[test]
    fn yaml_overrides_layer_over_defaults() {
        let table = RouteTable::from_yaml_str(
            r#"
- type: dispatch_alert
  priority: critical
  default_channels: [voice]
  max_attempts: 2
  retry_delay_minutes: [3]
  escalate_on_failure: true
  escalation_role: duty-sergeant
"#,
        )
        .unwrap();
        let p = table.resolve(NotificationType::DispatchAlert, NotificationPriority::Critical);
        assert_eq!(p.default_channels, vec![Channel::Voice]);
        assert!(p.fallback_channels.is_empty());
        assert_eq!(table.escalation_role(p), "duty-sergeant");

        let reminder = table.resolve(NotificationType::DispatchReminder, NotificationPriority::Normal);
        assert_eq!(table.escalation_role(reminder), "supervisor");
    }

    #[test]
    fn yaml_rejects_zero_attempts() {
        let err = RouteTable::from_yaml_str(
            "- type: system\n  default_channels: [email]\n  max_attempts: 0\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("max_attempts"));
    }
}
