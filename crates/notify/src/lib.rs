//! Notification router and delivery manager for dispatch alerts.
//!
//! This crate provides:
//! - Recipient preferences, quiet hours and rate limits
//! - A static route table keyed by notification type and priority
//! - `NotificationRouter` for send decisions and channel selection
//! - `DeliveryManager` driving the send → retry → escalate state machine
//! - `MessageCarrier` trait with webhook gateway and tracing carriers
//! - Minijinja rendering of alert subjects and bodies
//! - `RetryWorker` that resubmits notifications whose retry is due

pub mod carrier;
pub mod delivery;
pub mod error;
pub mod preferences;
pub mod queue;
pub mod quiet_hours;
pub mod retry_worker;
pub mod router;
pub mod routes;
pub mod store;
pub mod templating;
pub mod types;
pub mod webhook;

pub use carrier::{CarrierError, CarrierReceipt, MessageCarrier, OutboundMessage, TracingCarrier};
pub use delivery::{DeliveryManager, DeliveryOutcome, EscalationSignal, NotificationRequest};
pub use error::NotifyError;
pub use preferences::NotificationPreferences;
pub use retry_worker::{RetrySweepReport, RetryWorker};
pub use router::{NotificationRouter, SendDecision};
pub use routes::{RoutePolicy, RouteTable};
pub use store::{InMemoryNotificationStore, NotificationStore};
pub use templating::{AlertContext, TemplateRenderer};
pub use types::{
    Channel, Notification, NotificationPriority, NotificationStatus, NotificationType,
    ResponseStatus, SuppressReason,
};
pub use webhook::WebhookCarrier;
