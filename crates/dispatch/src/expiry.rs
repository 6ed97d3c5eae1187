//! Periodic sweep that flags overdue `PENDING` dispatches.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use welfare_core::{Clock, DispatchId, Jurisdiction, SystemClock};
use welfare_rules::schema::LawPriority;

use crate::error::DispatchError;
use crate::model::{AuditEntry, AuditMetadata, DispatchStatus, StatusChange};
use crate::repository::DispatchRepository;

/// A dispatch that passed its deadline without being accepted and now
/// needs a human decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpiredDispatch {
    pub dispatch_id: DispatchId,
    pub jurisdiction: Jurisdiction,
    pub priority: LawPriority,
    pub expires_at: DateTime<Utc>,
    pub overdue_minutes: i64,
}

/// Moves overdue `PENDING` dispatches to `EXPIRED`.
///
/// Each move is a compare-and-set from `PENDING`, so a dispatch accepted
/// between selection and update is left alone, and concurrent sweepers
/// never expire the same dispatch twice.
pub struct ExpirySweeper {
    repo: Arc<dyn DispatchRepository>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    batch_size: usize,
}

impl ExpirySweeper {
    pub fn new(repo: Arc<dyn DispatchRepository>, interval: Duration) -> Self {
        Self {
            repo,
            clock: Arc::new(SystemClock),
            interval,
            batch_size: 500,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// One sweep. Returns the dispatches this call expired.
    pub async fn sweep_once(&self) -> Result<Vec<ExpiredDispatch>, DispatchError> {
        let now = self.clock.now();
        let overdue = self.repo.overdue_pending(now, self.batch_size).await?;
        let mut expired = Vec::with_capacity(overdue.len());

        for dispatch in overdue {
            let change = StatusChange::Expire { at: now };
            let Some(updated) = self
                .repo
                .transition(dispatch.id, &[DispatchStatus::Pending], change)
                .await?
            else {
                continue;
            };

            let overdue_minutes = (now - updated.expires_at).num_minutes();
            warn!(
                dispatch_id = %updated.id,
                jurisdiction = %updated.jurisdiction,
                priority = %updated.priority,
                overdue_minutes,
                "dispatch expired without response, escalation required"
            );

            let entry = AuditEntry::new(
                updated.id,
                AuditEntry::SYSTEM_ACTOR,
                format!("No responder accepted before {}", updated.expires_at.to_rfc3339()),
                AuditMetadata::Expired {
                    expires_at: updated.expires_at,
                    overdue_minutes,
                },
                now,
            );
            if let Err(e) = self.repo.append_audit(&entry).await {
                warn!(dispatch_id = %updated.id, error = %e, "failed to append expiry audit entry");
            }

            expired.push(ExpiredDispatch {
                dispatch_id: updated.id,
                jurisdiction: updated.jurisdiction,
                priority: updated.priority,
                expires_at: updated.expires_at,
                overdue_minutes,
            });
        }

        Ok(expired)
    }

    /// Sweep on every tick until `shutdown` is notified.
    pub async fn run(&self, shutdown: Arc<Notify>) {
        let mut interval = tokio::time::interval(self.interval);
        info!(interval_secs = self.interval.as_secs(), "expiry sweeper started");
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.sweep_once().await {
                        Ok(expired) if !expired.is_empty() => {
                            info!(expired = expired.len(), "expiry sweep complete");
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "expiry sweep failed"),
                    }
                }
                _ = shutdown.notified() => {
                    info!("expiry sweeper shutting down");
                    break;
                }
            }
        }
    }
}
