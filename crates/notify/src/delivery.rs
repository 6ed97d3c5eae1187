//! Notification creation and the send → retry → escalate lifecycle.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use welfare_core::{Clock, DispatchId, NotificationId, SystemClock};

use crate::carrier::{MessageCarrier, OutboundMessage};
use crate::error::NotifyError;
use crate::preferences::NotificationPreferences;
use crate::router::{NotificationRouter, SendDecision};
use crate::routes::RoutePolicy;
use crate::store::NotificationStore;
use crate::templating::{MessageTemplate, TemplateRenderer};
use crate::types::{
    FailureOutcome, Notification, NotificationPriority, NotificationStatus, NotificationType,
    ResponseStatus, SuppressReason,
};

/// What to send to one recipient.
#[derive(Debug, Clone)]
pub struct NotificationRequest {
    pub recipient_id: String,
    pub notification_type: NotificationType,
    pub priority: NotificationPriority,
    pub subject: String,
    pub body: String,
    pub dispatch_id: Option<DispatchId>,
}

/// "Needs escalation" report for an exhausted notification. Acting on it
/// belongs to an external escalation workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EscalationSignal {
    pub notification_id: NotificationId,
    pub dispatch_id: Option<DispatchId>,
    pub recipient_id: String,
    pub notification_type: NotificationType,
    pub role: String,
    pub reason: String,
    pub attempts: u32,
}

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// Accepted by the carrier; waiting for a delivery receipt.
    Sent,
    /// Accepted by the carrier on a route that needs no confirmation.
    Delivered,
    RetryScheduled { attempt: u32, next_retry_at: DateTime<Utc> },
    Failed { attempts: u32, escalation: Option<EscalationSignal> },
    /// Never attempted.
    Suppressed(SuppressReason),
    /// Another worker owns the notification, or it is no longer pending.
    NotClaimed,
}

impl DeliveryOutcome {
    /// The carrier accepted the message.
    pub fn is_success(&self) -> bool {
        matches!(self, DeliveryOutcome::Sent | DeliveryOutcome::Delivered)
    }
}

/// Creates notifications, hands them to the carrier and drives their
/// state machine.
pub struct DeliveryManager {
    store: Arc<dyn NotificationStore>,
    carrier: Arc<dyn MessageCarrier>,
    router: NotificationRouter,
    renderer: TemplateRenderer,
    clock: Arc<dyn Clock>,
}

impl DeliveryManager {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        carrier: Arc<dyn MessageCarrier>,
        router: NotificationRouter,
    ) -> Self {
        Self {
            store,
            carrier,
            router,
            renderer: TemplateRenderer::new(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn router(&self) -> &NotificationRouter {
        &self.router
    }

    pub fn store(&self) -> &Arc<dyn NotificationStore> {
        &self.store
    }

    /// Render the built-in subject/body for `notification_type`.
    pub fn render<S: Serialize>(
        &self,
        notification_type: NotificationType,
        ctx: &S,
    ) -> Result<(String, String), NotifyError> {
        self.renderer
            .render_message(&MessageTemplate::for_type(notification_type), ctx)
    }

    fn policy(&self, notification: &Notification) -> &RoutePolicy {
        self.router
            .routes()
            .resolve(notification.notification_type, notification.priority)
    }

    /// Create and persist a notification for one recipient.
    ///
    /// The result is either `pending` (ready to deliver) or `suppressed`
    /// with the reason that rejected it. `max_retries` is fixed here from
    /// the route policy.
    pub async fn create(
        &self,
        request: NotificationRequest,
        prefs: &NotificationPreferences,
    ) -> Result<Notification, NotifyError> {
        let now = self.clock.now();
        let policy = self
            .router
            .routes()
            .resolve(request.notification_type, request.priority);
        let channel = self
            .router
            .best_channel(request.notification_type, request.priority, prefs);
        let address = channel.and_then(|c| prefs.address_for(c)).map(str::to_string);

        let mut notification = Notification::new(
            request.recipient_id,
            request.notification_type,
            request.priority,
            channel,
            address,
            request.subject,
            request.body,
            policy.max_attempts,
            request.dispatch_id,
            now,
        );

        let mut decision = self.router.should_send(&notification, prefs, now);
        if decision.is_send() && self.is_rate_limited(&notification, prefs, now).await? {
            decision = SendDecision::Suppress(SuppressReason::RateLimited);
        }

        if let SendDecision::Suppress(reason) = decision {
            tracing::info!(
                notification_id = %notification.id,
                recipient_id = %notification.recipient_id,
                notification_type = %notification.notification_type,
                reason = %reason,
                "Notification suppressed"
            );
            notification.suppress(reason, now)?;
        }

        self.store.insert(&notification).await?;
        Ok(notification)
    }

    async fn is_rate_limited(
        &self,
        notification: &Notification,
        prefs: &NotificationPreferences,
        now: DateTime<Utc>,
    ) -> Result<bool, NotifyError> {
        if notification.priority.bypasses_rate_limit() {
            return Ok(false);
        }
        let Some(limit) = &prefs.rate_limit else {
            return Ok(false);
        };

        if let Some(max) = limit.max_per_hour {
            let sent = self
                .store
                .count_sent_since(&notification.recipient_id, now - Duration::hours(1))
                .await?;
            if sent >= u64::from(max) {
                return Ok(true);
            }
        }
        if let Some(max) = limit.max_per_day {
            let sent = self
                .store
                .count_sent_since(&notification.recipient_id, now - Duration::days(1))
                .await?;
            if sent >= u64::from(max) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Create a notification and, unless suppressed, attempt delivery once.
    pub async fn create_and_send(
        &self,
        request: NotificationRequest,
        prefs: &NotificationPreferences,
    ) -> Result<(Notification, DeliveryOutcome), NotifyError> {
        let notification = self.create(request, prefs).await?;
        if let Some(reason) = &notification.suppression_reason {
            let outcome = DeliveryOutcome::Suppressed(reason.clone());
            return Ok((notification, outcome));
        }
        let outcome = self.deliver(notification.id).await?;
        Ok((notification, outcome))
    }

    /// Claim a pending notification and hand it to the carrier.
    ///
    /// The claim is a compare-and-swap `pending → queued`; if it fails the
    /// notification is left alone and [`DeliveryOutcome::NotClaimed`] is
    /// returned. Carrier errors feed [`Notification::mark_failed`]. If the
    /// attempt cannot be recorded, the claim is released so the retry
    /// worker picks the notification up again.
    pub async fn deliver(&self, id: NotificationId) -> Result<DeliveryOutcome, NotifyError> {
        let now = self.clock.now();
        let Some(notification) = self.store.claim(id, now).await? else {
            if self.store.get(id).await?.is_none() {
                return Err(NotifyError::NotFound(id));
            }
            tracing::debug!(notification_id = %id, "Notification not claimable, skipping");
            return Ok(DeliveryOutcome::NotClaimed);
        };

        match self.attempt(notification).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                match self.store.release_claim(id, self.clock.now()).await {
                    Ok(Some(_)) => tracing::warn!(
                        notification_id = %id,
                        error = %e,
                        "Delivery attempt not recorded, claim released"
                    ),
                    Ok(None) => {}
                    Err(release_err) => tracing::error!(
                        notification_id = %id,
                        error = %e,
                        release_error = %release_err,
                        "Delivery attempt not recorded and claim release failed"
                    ),
                }
                Err(e)
            }
        }
    }

    /// Send a claimed notification and persist the result.
    async fn attempt(&self, mut notification: Notification) -> Result<DeliveryOutcome, NotifyError> {
        let policy = self.policy(&notification).clone();

        let send_result = match OutboundMessage::from_notification(&notification) {
            Some(message) => self.carrier.send(&message).await.map_err(|e| e.to_string()),
            None => Err("notification has no channel or address".to_string()),
        };
        let now = self.clock.now();

        let outcome = match send_result {
            Ok(receipt) => {
                notification.mark_sent(&receipt, now)?;
                let outcome = if policy.require_confirmation {
                    DeliveryOutcome::Sent
                } else {
                    notification.mark_delivered(now)?;
                    DeliveryOutcome::Delivered
                };
                tracing::info!(
                    notification_id = %notification.id,
                    recipient_id = %notification.recipient_id,
                    carrier = self.carrier.carrier_name(),
                    provider_id = %receipt.provider_id,
                    "Notification sent"
                );
                outcome
            }
            Err(error) => {
                tracing::warn!(
                    notification_id = %notification.id,
                    recipient_id = %notification.recipient_id,
                    carrier = self.carrier.carrier_name(),
                    attempt = notification.retry_count + 1,
                    error = %error,
                    "Notification delivery failed"
                );
                match notification.mark_failed(error, &policy.retry_delay_minutes, now)? {
                    FailureOutcome::RetryScheduled { attempt, next_retry_at } => {
                        DeliveryOutcome::RetryScheduled { attempt, next_retry_at }
                    }
                    FailureOutcome::Exhausted { attempts } => DeliveryOutcome::Failed {
                        attempts,
                        escalation: self.escalation_for(&notification, &policy),
                    },
                }
            }
        };

        self.store.update(&notification).await?;
        Ok(outcome)
    }

    fn escalation_for(&self, notification: &Notification, policy: &RoutePolicy) -> Option<EscalationSignal> {
        if !policy.escalate_on_failure {
            return None;
        }
        let role = self.router.routes().escalation_role(policy).to_string();
        tracing::warn!(
            notification_id = %notification.id,
            recipient_id = %notification.recipient_id,
            role = %role,
            attempts = notification.retry_count,
            "Notification retries exhausted, escalation required"
        );
        Some(EscalationSignal {
            notification_id: notification.id,
            dispatch_id: notification.dispatch_id,
            recipient_id: notification.recipient_id.clone(),
            notification_type: notification.notification_type,
            role,
            reason: notification
                .last_error
                .clone()
                .unwrap_or_else(|| "delivery failed".to_string()),
            attempts: notification.retry_count,
        })
    }

    async fn load(&self, id: NotificationId) -> Result<Notification, NotifyError> {
        self.store.get(id).await?.ok_or(NotifyError::NotFound(id))
    }

    /// Record a carrier delivery receipt.
    pub async fn mark_delivered(&self, id: NotificationId) -> Result<Notification, NotifyError> {
        let mut notification = self.load(id).await?;
        notification.mark_delivered(self.clock.now())?;
        self.store.update(&notification).await?;
        Ok(notification)
    }

    /// Record a read receipt.
    pub async fn mark_read(&self, id: NotificationId) -> Result<Notification, NotifyError> {
        let mut notification = self.load(id).await?;
        notification.mark_read(self.clock.now())?;
        self.store.update(&notification).await?;
        Ok(notification)
    }

    /// Cancel a notification that is still waiting to be sent. A
    /// notification a worker has already claimed cannot be cancelled.
    pub async fn cancel(&self, id: NotificationId) -> Result<Notification, NotifyError> {
        match self.store.cancel_if_pending(id, self.clock.now()).await? {
            Some(cancelled) => Ok(cancelled),
            None => {
                let current = self.load(id).await?;
                Err(NotifyError::InvalidTransition {
                    from: current.status,
                    to: NotificationStatus::Cancelled,
                })
            }
        }
    }

    /// Set the response status on a recipient's notifications for a dispatch.
    pub async fn record_response(
        &self,
        dispatch_id: DispatchId,
        recipient_id: &str,
        status: ResponseStatus,
    ) -> Result<usize, NotifyError> {
        let changed = self
            .store
            .set_response_status(dispatch_id, recipient_id, status, self.clock.now())
            .await?;
        tracing::debug!(%dispatch_id, recipient_id, ?status, changed, "Notification responses updated");
        Ok(changed)
    }

    /// Cancel every still-pending notification of a dispatch, e.g. once a
    /// responder has accepted it. Returns how many were cancelled.
    pub async fn cancel_pending_for_dispatch(&self, dispatch_id: DispatchId) -> Result<usize, NotifyError> {
        let now = self.clock.now();
        let mut cancelled = 0;
        for n in self.store.list_for_dispatch(dispatch_id).await? {
            if n.status != NotificationStatus::Pending {
                continue;
            }
            // The listing is a snapshot; the store re-checks under its lock.
            if self.store.cancel_if_pending(n.id, now).await?.is_some() {
                cancelled += 1;
            }
        }
        Ok(cancelled)
    }
}
