//! Notification entity and its delivery state machine.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use welfare_core::{DispatchId, NotificationId};

use crate::carrier::CarrierReceipt;
use crate::error::NotifyError;

/// Delay used when a route defines no retry schedule.
pub const DEFAULT_RETRY_DELAY_MINUTES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    DispatchAlert,
    DispatchReminder,
    DispatchEscalation,
    PoliceNotice,
    StatusUpdate,
    System,
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationType::DispatchAlert => "dispatch_alert",
            NotificationType::DispatchReminder => "dispatch_reminder",
            NotificationType::DispatchEscalation => "dispatch_escalation",
            NotificationType::PoliceNotice => "police_notice",
            NotificationType::StatusUpdate => "status_update",
            NotificationType::System => "system",
        };
        f.write_str(s)
    }
}

/// Delivery priority. Variant order follows the processing score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    Normal,
    High,
    Urgent,
    Critical,
}

impl NotificationPriority {
    pub fn score(&self) -> u8 {
        match self {
            NotificationPriority::Low => 1,
            NotificationPriority::Normal => 2,
            NotificationPriority::High => 3,
            NotificationPriority::Urgent => 4,
            NotificationPriority::Critical => 5,
        }
    }

    /// Priorities that are never rate limited.
    pub fn bypasses_rate_limit(&self) -> bool {
        matches!(self, NotificationPriority::Critical | NotificationPriority::Urgent)
    }
}

impl fmt::Display for NotificationPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotificationPriority::Low => "low",
            NotificationPriority::Normal => "normal",
            NotificationPriority::High => "high",
            NotificationPriority::Urgent => "urgent",
            NotificationPriority::Critical => "critical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Sms,
    Voice,
    Email,
    Push,
    InApp,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Channel::Sms => "sms",
            Channel::Voice => "voice",
            Channel::Email => "email",
            Channel::Push => "push",
            Channel::InApp => "in_app",
        };
        f.write_str(s)
    }
}

/// `pending → queued → sent → delivered → read`, or `failed` /
/// `cancelled` / `suppressed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Queued,
    Sent,
    Delivered,
    Read,
    Failed,
    Cancelled,
    Suppressed,
}

impl NotificationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NotificationStatus::Delivered
                | NotificationStatus::Read
                | NotificationStatus::Failed
                | NotificationStatus::Cancelled
                | NotificationStatus::Suppressed
        )
    }

    /// Allowed edges of the delivery state machine.
    ///
    /// `delivered → read` is the only edge out of a terminal state and it
    /// lands on another terminal state.
    pub fn can_transition_to(&self, next: NotificationStatus) -> bool {
        use NotificationStatus::*;
        matches!(
            (self, next),
            (Pending, Queued)
                | (Pending, Cancelled)
                | (Pending, Suppressed)
                | (Pending, Failed)
                | (Queued, Sent)
                | (Queued, Pending)
                | (Queued, Failed)
                | (Queued, Cancelled)
                | (Sent, Delivered)
                | (Sent, Read)
                | (Sent, Pending)
                | (Sent, Failed)
                | (Delivered, Read)
        )
    }
}

/// Why a notification was never attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SuppressReason {
    GlobalOptOut,
    ChannelDisabled { channel: Channel },
    TypeDisabled { notification_type: NotificationType },
    QuietHours,
    NoChannel,
    RateLimited,
}

impl fmt::Display for SuppressReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuppressReason::GlobalOptOut => write!(f, "recipient opted out of all notifications"),
            SuppressReason::ChannelDisabled { channel } => write!(f, "channel {channel} disabled"),
            SuppressReason::TypeDisabled { notification_type } => {
                write!(f, "notification type {notification_type} disabled")
            }
            SuppressReason::QuietHours => write!(f, "within recipient quiet hours"),
            SuppressReason::NoChannel => write!(f, "no enabled and verified channel"),
            SuppressReason::RateLimited => write!(f, "recipient rate limit reached"),
        }
    }
}

/// Recipient's response to the thing the notification asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Pending,
    Acknowledged,
    Declined,
}

/// Result of [`Notification::mark_failed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureOutcome {
    RetryScheduled { attempt: u32, next_retry_at: DateTime<Utc> },
    Exhausted { attempts: u32 },
}

/// One (dispatch, recipient, channel) fan-out unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient_id: String,
    pub notification_type: NotificationType,
    pub priority: NotificationPriority,
    /// `None` only when no channel qualified and the notification is suppressed.
    pub channel: Option<Channel>,
    pub address: Option<String>,
    pub subject: String,
    pub body: String,
    pub status: NotificationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suppression_reason: Option<SuppressReason>,
    pub retry_count: u32,
    /// Fixed at creation from the route policy.
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Set while `queued`; a claim older than the worker's lease is released.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatch_id: Option<DispatchId>,
    pub response_status: ResponseStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
}

impl Notification {
    /// A fresh `pending` notification.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        recipient_id: impl Into<String>,
        notification_type: NotificationType,
        priority: NotificationPriority,
        channel: Option<Channel>,
        address: Option<String>,
        subject: String,
        body: String,
        max_retries: u32,
        dispatch_id: Option<DispatchId>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient_id: recipient_id.into(),
            notification_type,
            priority,
            channel,
            address,
            subject,
            body,
            status: NotificationStatus::Pending,
            suppression_reason: None,
            retry_count: 0,
            max_retries,
            next_retry_at: None,
            claimed_at: None,
            last_error: None,
            provider_id: None,
            dispatch_id,
            response_status: ResponseStatus::Pending,
            created_at: now,
            updated_at: now,
            sent_at: None,
            delivered_at: None,
            read_at: None,
        }
    }

    fn transition(&mut self, to: NotificationStatus, now: DateTime<Utc>) -> Result<(), NotifyError> {
        if !self.status.can_transition_to(to) {
            return Err(NotifyError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = now;
        if to != NotificationStatus::Queued {
            self.claimed_at = None;
        }
        Ok(())
    }

    pub fn mark_queued(&mut self, now: DateTime<Utc>) -> Result<(), NotifyError> {
        self.transition(NotificationStatus::Queued, now)?;
        self.next_retry_at = None;
        self.claimed_at = Some(now);
        Ok(())
    }

    /// Give up a claim without recording an attempt: `queued → pending`,
    /// due immediately.
    pub fn release_claim(&mut self, now: DateTime<Utc>) -> Result<(), NotifyError> {
        self.transition(NotificationStatus::Pending, now)?;
        self.next_retry_at = Some(now);
        Ok(())
    }

    /// Queued with a claim taken before `cutoff`.
    pub fn is_claim_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.status == NotificationStatus::Queued && self.claimed_at.map_or(true, |at| at < cutoff)
    }

    pub fn mark_sent(&mut self, receipt: &CarrierReceipt, now: DateTime<Utc>) -> Result<(), NotifyError> {
        self.transition(NotificationStatus::Sent, now)?;
        self.provider_id = Some(receipt.provider_id.clone());
        self.sent_at = Some(now);
        self.last_error = None;
        Ok(())
    }

    pub fn mark_delivered(&mut self, now: DateTime<Utc>) -> Result<(), NotifyError> {
        self.transition(NotificationStatus::Delivered, now)?;
        self.delivered_at = Some(now);
        Ok(())
    }

    pub fn mark_read(&mut self, now: DateTime<Utc>) -> Result<(), NotifyError> {
        self.transition(NotificationStatus::Read, now)?;
        if self.delivered_at.is_none() {
            self.delivered_at = Some(now);
        }
        self.read_at = Some(now);
        Ok(())
    }

    pub fn suppress(&mut self, reason: SuppressReason, now: DateTime<Utc>) -> Result<(), NotifyError> {
        self.transition(NotificationStatus::Suppressed, now)?;
        self.suppression_reason = Some(reason);
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<(), NotifyError> {
        self.transition(NotificationStatus::Cancelled, now)
    }

    /// Record a failed delivery attempt.
    ///
    /// Increments `retry_count`. While it stays below `max_retries` the
    /// notification returns to `pending` with `next_retry_at` taken from
    /// `retry_delay_minutes[retry_count - 1]` (the last entry repeats when
    /// the schedule is shorter). Otherwise it becomes terminal `failed`.
    pub fn mark_failed(
        &mut self,
        error: impl Into<String>,
        retry_delay_minutes: &[u32],
        now: DateTime<Utc>,
    ) -> Result<FailureOutcome, NotifyError> {
        if self.status.is_terminal() {
            return Err(NotifyError::InvalidTransition {
                from: self.status,
                to: NotificationStatus::Failed,
            });
        }

        self.retry_count += 1;
        self.last_error = Some(error.into());

        if self.retry_count < self.max_retries {
            let idx = (self.retry_count - 1) as usize;
            let delay = retry_delay_minutes
                .get(idx)
                .or_else(|| retry_delay_minutes.last())
                .copied()
                .unwrap_or(DEFAULT_RETRY_DELAY_MINUTES);
            let next = now + Duration::minutes(i64::from(delay));
            if self.status != NotificationStatus::Pending {
                self.transition(NotificationStatus::Pending, now)?;
            }
            self.updated_at = now;
            self.next_retry_at = Some(next);
            Ok(FailureOutcome::RetryScheduled {
                attempt: self.retry_count,
                next_retry_at: next,
            })
        } else {
            self.transition(NotificationStatus::Failed, now)?;
            self.next_retry_at = None;
            Ok(FailureOutcome::Exhausted {
                attempts: self.retry_count,
            })
        }
    }

    /// Whether the retry worker should pick this notification up at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == NotificationStatus::Pending
            && self.next_retry_at.map_or(false, |at| at <= now)
    }
}
