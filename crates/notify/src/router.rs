//! Per-recipient send decisions and channel selection.

use chrono::{DateTime, Utc};

use crate::preferences::NotificationPreferences;
use crate::routes::RouteTable;
use crate::types::{Channel, Notification, NotificationPriority, NotificationType, SuppressReason};

/// Outcome of [`NotificationRouter::should_send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendDecision {
    Send,
    Suppress(SuppressReason),
}

impl SendDecision {
    pub fn is_send(&self) -> bool {
        matches!(self, SendDecision::Send)
    }
}

/// Applies recipient preferences and route policies to notifications.
#[derive(Debug, Clone, Default)]
pub struct NotificationRouter {
    routes: RouteTable,
}

impl NotificationRouter {
    pub fn new(routes: RouteTable) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Decide whether `notification` may be sent to its recipient at `now`.
    ///
    /// Checks run in order: global opt-out, channel present, channel
    /// enabled, type enabled, quiet hours. The first failing check wins.
    pub fn should_send(
        &self,
        notification: &Notification,
        prefs: &NotificationPreferences,
        now: DateTime<Utc>,
    ) -> SendDecision {
        if prefs.global_opt_out {
            return SendDecision::Suppress(SuppressReason::GlobalOptOut);
        }

        let Some(channel) = notification.channel else {
            return SendDecision::Suppress(SuppressReason::NoChannel);
        };

        if !prefs.is_channel_enabled(channel) {
            return SendDecision::Suppress(SuppressReason::ChannelDisabled { channel });
        }

        if !prefs.is_type_enabled(notification.notification_type) {
            return SendDecision::Suppress(SuppressReason::TypeDisabled {
                notification_type: notification.notification_type,
            });
        }

        if let Some(quiet) = &prefs.quiet_hours {
            if quiet.suppresses(now, notification.priority, notification.notification_type) {
                return SendDecision::Suppress(SuppressReason::QuietHours);
            }
        }

        SendDecision::Send
    }

    /// Pick the channel a notification should go out on.
    ///
    /// The recipient's per-type override list is tried first, then the
    /// route's default channels, then the route's fallback channels. A
    /// channel qualifies only when it is enabled, verified and has an
    /// address. `None` means nothing qualifies.
    pub fn best_channel(
        &self,
        notification_type: NotificationType,
        priority: NotificationPriority,
        prefs: &NotificationPreferences,
    ) -> Option<Channel> {
        let policy = self.routes.resolve(notification_type, priority);
        let preferred = prefs
            .type_channels(notification_type)
            .unwrap_or(&policy.default_channels);

        preferred
            .iter()
            .chain(policy.fallback_channels.iter())
            .copied()
            .find(|c| prefs.is_channel_usable(*c))
    }
}
