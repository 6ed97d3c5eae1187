//! Notification error types.

use welfare_core::{NotificationId, StoreError};

use crate::types::NotificationStatus;

/// Errors raised by the notification router and delivery manager.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Template rendering failed: {0}")]
    Template(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Notification store error: {0}")]
    Store(#[from] StoreError),

    #[error("Notification {0} not found")]
    NotFound(NotificationId),

    #[error("Invalid status transition {from:?} -> {to:?}")]
    InvalidTransition {
        from: NotificationStatus,
        to: NotificationStatus,
    },
}
