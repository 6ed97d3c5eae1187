//! Message carrier trait and shared carrier types.

use serde::Serialize;
use welfare_core::NotificationId;

use crate::types::{Channel, Notification, NotificationPriority};

/// Errors a carrier can report for a single send.
#[derive(Debug, thiserror::Error)]
pub enum CarrierError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Carrier rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Carrier unavailable: {0}")]
    Unavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Provider acknowledgement of an accepted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CarrierReceipt {
    pub provider_id: String,
    pub provider_status: String,
}

/// A rendered message ready for a carrier.
#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessage {
    pub notification_id: NotificationId,
    pub channel: Channel,
    pub address: String,
    pub subject: String,
    pub body: String,
    pub priority: NotificationPriority,
}

impl OutboundMessage {
    /// `None` when the notification has no channel or address to send to.
    pub fn from_notification(notification: &Notification) -> Option<Self> {
        Some(Self {
            notification_id: notification.id,
            channel: notification.channel?,
            address: notification.address.clone()?,
            subject: notification.subject.clone(),
            body: notification.body.clone(),
            priority: notification.priority,
        })
    }
}

/// Trait for outbound delivery providers (SMS/voice gateway, email relay, push).
#[async_trait::async_trait]
pub trait MessageCarrier: Send + Sync {
    /// Hand one message to the provider.
    async fn send(&self, message: &OutboundMessage) -> Result<CarrierReceipt, CarrierError>;

    /// Human-readable name for this carrier (e.g., "webhook").
    fn carrier_name(&self) -> &str;
}

/// Carrier that only logs messages. Used when no gateway is configured.
#[derive(Debug, Default)]
pub struct TracingCarrier;

#[async_trait::async_trait]
impl MessageCarrier for TracingCarrier {
    async fn send(&self, message: &OutboundMessage) -> Result<CarrierReceipt, CarrierError> {
        tracing::info!(
            notification_id = %message.notification_id,
            channel = %message.channel,
            address = %message.address,
            priority = %message.priority,
            subject = %message.subject,
            "Outbound message (no gateway configured)"
        );
        Ok(CarrierReceipt {
            provider_id: format!("log-{}", message.notification_id),
            provider_status: "logged".to_string(),
        })
    }

    fn carrier_name(&self) -> &str {
        "tracing"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NotificationType;
    use chrono::Utc;

    #[test]
    fn outbound_requires_channel_and_address() {
        let mut n = Notification::new(
            "officer-1",
            NotificationType::DispatchAlert,
            NotificationPriority::High,
            Some(Channel::Email),
            None,
            "s".to_string(),
            "b".to_string(),
            3,
            None,
            Utc::now(),
        );
        assert!(OutboundMessage::from_notification(&n).is_none());
        n.address = Some("o1@example.gov".to_string());
        let msg = OutboundMessage::from_notification(&n).unwrap();
        assert_eq!(msg.channel, Channel::Email);
        assert_eq!(msg.notification_id, n.id);
    }

    #[tokio::test]
    async fn tracing_carrier_always_accepts() {
        let msg = OutboundMessage {
            notification_id: uuid::Uuid::new_v4(),
            channel: Channel::Sms,
            address: "+15550100".to_string(),
            subject: "s".to_string(),
            body: "b".to_string(),
            priority: NotificationPriority::Critical,
        };
        let receipt = TracingCarrier.send(&msg).await.unwrap();
        assert_eq!(receipt.provider_status, "logged");
        assert!(receipt.provider_id.starts_with("log-"));
    }
}
