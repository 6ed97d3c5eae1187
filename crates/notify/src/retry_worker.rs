//! Background poller that resubmits notifications whose retry is due.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Notify};
use tracing::{error, info, warn};

use crate::delivery::{DeliveryManager, DeliveryOutcome, EscalationSignal};
use crate::error::NotifyError;
use crate::queue::ProcessingQueue;

const DEFAULT_CLAIM_LEASE_MINUTES: i64 = 5;

/// Counts from one sweep.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RetrySweepReport {
    /// Stale claims put back to `pending` before selection.
    pub reclaimed: usize,
    pub due: usize,
    pub sent: usize,
    pub rescheduled: usize,
    pub failed: usize,
    /// Lost the claim to another worker.
    pub skipped: usize,
    pub errors: usize,
    pub escalations: Vec<EscalationSignal>,
}

/// Polls the store for `pending` notifications whose `next_retry_at` has
/// passed and hands each to [`DeliveryManager::deliver`], which claims it
/// by compare-and-swap before sending. Safe to run on several workers.
///
/// A row left `queued` longer than the claim lease belongs to a worker that
/// died mid-attempt; each sweep releases it so it is delivered again.
pub struct RetryWorker {
    manager: Arc<DeliveryManager>,
    poll_interval: Duration,
    batch_size: usize,
    claim_lease: chrono::Duration,
    escalations: Option<mpsc::UnboundedSender<EscalationSignal>>,
}

impl RetryWorker {
    pub fn new(manager: Arc<DeliveryManager>, poll_interval: Duration, batch_size: usize) -> Self {
        Self {
            manager,
            poll_interval,
            batch_size,
            claim_lease: chrono::Duration::minutes(DEFAULT_CLAIM_LEASE_MINUTES),
            escalations: None,
        }
    }

    pub fn with_claim_lease(mut self, lease: chrono::Duration) -> Self {
        self.claim_lease = lease;
        self
    }

    /// Forward escalation signals to an external workflow.
    pub fn with_escalation_channel(mut self, tx: mpsc::UnboundedSender<EscalationSignal>) -> Self {
        self.escalations = Some(tx);
        self
    }

    /// One sweep: select due notifications, order them by priority then
    /// age, and attempt delivery of each.
    pub async fn poll_once(&self, now: DateTime<Utc>) -> Result<RetrySweepReport, NotifyError> {
        let reclaimed = self
            .manager
            .store()
            .release_stale_claims(now - self.claim_lease, now)
            .await?;
        for id in &reclaimed {
            warn!(notification_id = %id, "stale claim released for redelivery");
        }

        let due = self
            .manager
            .store()
            .due_for_retry(now, self.batch_size)
            .await?;

        let mut report = RetrySweepReport {
            reclaimed: reclaimed.len(),
            due: due.len(),
            ..Default::default()
        };
        let mut queue: ProcessingQueue = due.iter().collect();

        while let Some(item) = queue.pop() {
            match self.manager.deliver(item.notification_id).await {
                Ok(DeliveryOutcome::Sent | DeliveryOutcome::Delivered) => report.sent += 1,
                Ok(DeliveryOutcome::RetryScheduled { .. }) => report.rescheduled += 1,
                Ok(DeliveryOutcome::Failed { escalation, .. }) => {
                    report.failed += 1;
                    report.escalations.extend(escalation);
                }
                Ok(DeliveryOutcome::NotClaimed | DeliveryOutcome::Suppressed(_)) => report.skipped += 1,
                Err(e) => {
                    report.errors += 1;
                    warn!(notification_id = %item.notification_id, error = %e, "retry delivery errored");
                }
            }
        }

        Ok(report)
    }

    fn forward_escalations(&self, signals: &[EscalationSignal]) {
        for signal in signals {
            match &self.escalations {
                Some(tx) => {
                    if tx.send(signal.clone()).is_err() {
                        warn!(notification_id = %signal.notification_id, "escalation receiver dropped");
                    }
                }
                None => warn!(
                    notification_id = %signal.notification_id,
                    role = %signal.role,
                    "escalation signal with no receiver configured"
                ),
            }
        }
    }

    /// Poll until `shutdown` is notified.
    pub async fn run(&self, shutdown: Arc<Notify>) {
        let mut interval = tokio::time::interval(self.poll_interval);
        info!(
            poll_secs = self.poll_interval.as_secs(),
            batch_size = self.batch_size,
            "retry worker started"
        );
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.poll_once(self.manager.now()).await {
                        Ok(report) => {
                            if report.due > 0 {
                                info!(
                                    reclaimed = report.reclaimed,
                                    due = report.due,
                                    sent = report.sent,
                                    rescheduled = report.rescheduled,
                                    failed = report.failed,
                                    skipped = report.skipped,
                                    "retry sweep complete"
                                );
                            }
                            self.forward_escalations(&report.escalations);
                        }
                        Err(e) => error!(error = %e, "retry sweep failed"),
                    }
                }
                _ = shutdown.notified() => {
                    info!("retry worker shutting down");
                    break;
                }
            }
        }
    }
}
