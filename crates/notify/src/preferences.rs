//! Per-recipient notification preferences.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::quiet_hours::QuietHours;
use crate::types::{Channel, NotificationType};

/// Enabled/verified state and delivery address for one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelPreference {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub verified: bool,
    /// Phone number, email address, device token, ... depending on channel.
    #[serde(default)]
    pub address: Option<String>,
}

/// Per-type enable flag and optional channel override list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypePreference {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub channels: Option<Vec<Channel>>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimit {
    #[serde(default)]
    pub max_per_hour: Option<u32>,
    #[serde(default)]
    pub max_per_day: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPreferences {
    pub recipient_id: String,
    #[serde(default)]
    pub channels: HashMap<Channel, ChannelPreference>,
    #[serde(default)]
    pub types: HashMap<NotificationType, TypePreference>,
    #[serde(default)]
    pub quiet_hours: Option<QuietHours>,
    #[serde(default)]
    pub rate_limit: Option<RateLimit>,
    #[serde(default)]
    pub global_opt_out: bool,
}

impl NotificationPreferences {
    /// Preferences with no channels configured.
    pub fn new(recipient_id: impl Into<String>) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            channels: HashMap::new(),
            types: HashMap::new(),
            quiet_hours: None,
            rate_limit: None,
            global_opt_out: false,
        }
    }

    /// Builder-style helper: enable and verify `channel` at `address`.
    pub fn with_channel(mut self, channel: Channel, address: impl Into<String>) -> Self {
        self.channels.insert(
            channel,
            ChannelPreference {
                enabled: true,
                verified: true,
                address: Some(address.into()),
            },
        );
        self
    }

    pub fn is_channel_enabled(&self, channel: Channel) -> bool {
        self.channels.get(&channel).map_or(false, |c| c.enabled)
    }

    /// Enabled, verified and addressable.
    pub fn is_channel_usable(&self, channel: Channel) -> bool {
        self.channels
            .get(&channel)
            .map_or(false, |c| c.enabled && c.verified && c.address.is_some())
    }

    pub fn address_for(&self, channel: Channel) -> Option<&str> {
        self.channels.get(&channel).and_then(|c| c.address.as_deref())
    }

    /// Types are enabled unless explicitly turned off.
    pub fn is_type_enabled(&self, notification_type: NotificationType) -> bool {
        self.types.get(&notification_type).map_or(true, |t| t.enabled)
    }

    /// The recipient's channel override list for a type, if any.
    pub fn type_channels(&self, notification_type: NotificationType) -> Option<&[Channel]> {
        self.types
            .get(&notification_type)
            .and_then(|t| t.channels.as_deref())
            .filter(|c| !c.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_from_json_with_enum_keys() {
        let prefs: NotificationPreferences = serde_json::from_str(
            r#"{
                "recipient_id": "officer-7",
                "channels": {
                    "sms": {"enabled": true, "verified": true, "address": "+15550107"},
                    "email": {"enabled": true, "verified": false, "address": "o7@example.gov"}
                },
                "types": {"status_update": {"enabled": false}},
                "quiet_hours": {"start": "22:00", "end": "07:00", "timezone": "America/Chicago"}
            }"#,
        )
        .unwrap();

        assert!(prefs.is_channel_usable(Channel::Sms));
        assert!(prefs.is_channel_enabled(Channel::Email));
        assert!(!prefs.is_channel_usable(Channel::Email));
        assert!(!prefs.is_channel_enabled(Channel::Push));
        assert!(!prefs.is_type_enabled(NotificationType::StatusUpdate));
        assert!(prefs.is_type_enabled(NotificationType::DispatchAlert));
        assert_eq!(prefs.address_for(Channel::Sms), Some("+15550107"));
        assert!(prefs.quiet_hours.is_some());
        assert!(!prefs.global_opt_out);
    }

    #[test]
    fn empty_type_override_list_is_ignored() {
        let mut prefs = NotificationPreferences::new("o1");
        prefs.types.insert(
            NotificationType::DispatchAlert,
            TypePreference {
                enabled: true,
                channels: Some(Vec::new()),
            },
        );
        assert!(prefs.type_channels(NotificationType::DispatchAlert).is_none());
    }
}
