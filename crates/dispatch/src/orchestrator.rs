//! Dispatch orchestrator: rule verdict → dispatch record → fan-out.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use welfare_core::{Clock, Config, DispatchId, SystemClock, DEFAULT_SLA_MINUTES};
use welfare_notify::{
    AlertContext, DeliveryManager, NotificationRequest, NotificationType, ResponseStatus,
};
use welfare_rules::{LawTriggerResult, RuleEngine};

use crate::error::DispatchError;
use crate::model::{
    AuditEntry, AuditMetadata, DispatchParams, DispatchRequest, DispatchStatus, ResolutionCode,
    Responder, StatusChange,
};
use crate::police::{PoliceLog, PoliceNotificationRecord};
use crate::repository::DispatchRepository;

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Applied when the primary rule has no SLA.
    pub default_sla_minutes: u32,
    pub police_enabled: bool,
    pub police_agency: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_sla_minutes: DEFAULT_SLA_MINUTES,
            police_enabled: true,
            police_agency: "local-pd".to_string(),
        }
    }
}

impl From<&Config> for OrchestratorConfig {
    fn from(config: &Config) -> Self {
        Self {
            default_sla_minutes: config.dispatch.default_sla_minutes,
            police_enabled: config.police.enabled,
            police_agency: config.police.agency.clone(),
        }
    }
}

/// Result of [`DispatchOrchestrator::create_dispatch`].
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    /// `None` when the evaluation did not require a dispatch.
    pub dispatch_id: Option<DispatchId>,
    pub evaluation: LawTriggerResult,
    pub notifications_sent: usize,
    pub police_notified: bool,
}

/// Creates dispatches and drives their acknowledge/resolve transitions.
pub struct DispatchOrchestrator {
    engine: Arc<RuleEngine>,
    repo: Arc<dyn DispatchRepository>,
    notifier: Arc<DeliveryManager>,
    police: Arc<dyn PoliceLog>,
    config: OrchestratorConfig,
    clock: Arc<dyn Clock>,
}

impl DispatchOrchestrator {
    pub fn new(
        engine: Arc<RuleEngine>,
        repo: Arc<dyn DispatchRepository>,
        notifier: Arc<DeliveryManager>,
        police: Arc<dyn PoliceLog>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            engine,
            repo,
            notifier,
            police,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Evaluate an incident and, when the law requires it, create a
    /// dispatch and alert every eligible responder.
    ///
    /// Only validation and the dispatch insert can fail the call. Audit
    /// writes, responder lookup, case linking and police notification are
    /// best-effort; per-responder notification failures are counted, not
    /// propagated.
    pub async fn create_dispatch(&self, params: DispatchParams) -> Result<DispatchOutcome, DispatchError> {
        params.validate()?;

        let evaluation = self.engine.evaluate(&params.jurisdiction, &params.triggers).await;
        if !evaluation.triggers_dispatch {
            debug!(
                jurisdiction = %params.jurisdiction,
                fail_open = evaluation.is_fail_open(),
                "no dispatch required"
            );
            return Ok(DispatchOutcome {
                dispatch_id: None,
                evaluation,
                notifications_sent: 0,
                police_notified: false,
            });
        }

        let now = self.clock.now();
        let dispatch =
            DispatchRequest::from_evaluation(&params, &evaluation, self.config.default_sla_minutes, now);

        if let Err(e) = self.repo.create(&dispatch).await {
            error!(
                dispatch_id = %dispatch.id,
                jurisdiction = %dispatch.jurisdiction,
                error = %e,
                "failed to persist dispatch, aborting"
            );
            return Err(DispatchError::Persistence(e));
        }
        info!(
            dispatch_id = %dispatch.id,
            jurisdiction = %dispatch.jurisdiction,
            priority = %dispatch.priority,
            rule_id = dispatch.rule_id.as_deref().unwrap_or("-"),
            expires_at = %dispatch.expires_at,
            "dispatch created"
        );

        self.audit_offered(&dispatch, now).await;

        let responders = match self.repo.eligible_responders(&dispatch.jurisdiction).await {
            Ok(r) => r,
            Err(e) => {
                error!(dispatch_id = %dispatch.id, error = %e, "responder lookup failed, no alerts sent");
                Vec::new()
            }
        };
        let notifications_sent = self.fan_out(&dispatch, &responders).await;

        if let Some(case_id) = &dispatch.source_case_id {
            if let Err(e) = self.repo.link_case(case_id, dispatch.id).await {
                warn!(dispatch_id = %dispatch.id, case_id = %case_id, error = %e, "failed to link source case");
            }
        }

        let police_notified = if params.notify_police {
            if self.config.police_enabled {
                self.notify_police(&dispatch).await
            } else {
                info!(dispatch_id = %dispatch.id, "police notification requested but disabled");
                false
            }
        } else {
            false
        };

        Ok(DispatchOutcome {
            dispatch_id: Some(dispatch.id),
            evaluation,
            notifications_sent,
            police_notified,
        })
    }

    async fn audit_offered(&self, dispatch: &DispatchRequest, now: DateTime<Utc>) {
        let description = match (&dispatch.rule_name, dispatch.legal_basis) {
            (Some(name), Some(basis)) => format!("Dispatch offered under {name} ({basis})"),
            _ => "Dispatch offered".to_string(),
        };
        let entry = AuditEntry::new(
            dispatch.id,
            AuditEntry::SYSTEM_ACTOR,
            description,
            AuditMetadata::Offered {
                rule_id: dispatch.rule_id.clone(),
                legal_basis: dispatch.legal_basis,
                priority: dispatch.priority,
                citations: dispatch.citations.clone(),
                expires_at: dispatch.expires_at,
            },
            now,
        );
        self.append_audit(&entry).await;
    }

    async fn append_audit(&self, entry: &AuditEntry) -> bool {
        match self.repo.append_audit(entry).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    dispatch_id = %entry.dispatch_id,
                    action = ?entry.action,
                    error = %e,
                    "failed to append audit entry"
                );
                false
            }
        }
    }

    fn alert_context(dispatch: &DispatchRequest) -> AlertContext {
        AlertContext {
            dispatch_id: dispatch.id.to_string(),
            priority: dispatch.priority.to_string(),
            species: dispatch.species.clone(),
            condition: dispatch.condition.clone(),
            location: dispatch.location.address.clone(),
            jurisdiction: dispatch.jurisdiction.to_string(),
            rule_name: dispatch.rule_name.clone(),
            legal_basis: dispatch.legal_basis.map(|b| b.to_string()),
            citations: dispatch.citations.clone(),
            expires_at: dispatch.expires_at.to_rfc3339(),
            requires_immediate: dispatch.requires_immediate,
        }
    }

    /// One notification per responder, all attempted concurrently.
    /// Returns how many the carrier accepted.
    async fn fan_out(&self, dispatch: &DispatchRequest, responders: &[Responder]) -> usize {
        if responders.is_empty() {
            info!(dispatch_id = %dispatch.id, "no eligible responders");
            return 0;
        }

        let ctx = Self::alert_context(dispatch);
        let (subject, body) = match self.notifier.render(NotificationType::DispatchAlert, &ctx) {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!(dispatch_id = %dispatch.id, error = %e, "alert template failed, using plain text");
                (
                    format!("[{}] Animal welfare dispatch", ctx.priority),
                    format!("{} at {}: {}", ctx.species, ctx.location, ctx.condition),
                )
            }
        };
        let priority = dispatch.alert_priority();

        let sends = responders.iter().map(|responder| {
            let request = NotificationRequest {
                recipient_id: responder.officer_id.clone(),
                notification_type: NotificationType::DispatchAlert,
                priority,
                subject: subject.clone(),
                body: body.clone(),
                dispatch_id: Some(dispatch.id),
            };
            async move {
                match self.notifier.create_and_send(request, &responder.preferences).await {
                    Ok((notification, outcome)) => {
                        debug!(
                            dispatch_id = %dispatch.id,
                            officer_id = %responder.officer_id,
                            notification_id = %notification.id,
                            outcome = ?outcome,
                            "responder alert attempted"
                        );
                        outcome.is_success()
                    }
                    Err(e) => {
                        warn!(
                            dispatch_id = %dispatch.id,
                            officer_id = %responder.officer_id,
                            error = %e,
                            "responder alert failed"
                        );
                        false
                    }
                }
            }
        });

        let sent = join_all(sends).await.into_iter().filter(|ok| *ok).count();
        info!(
            dispatch_id = %dispatch.id,
            responders = responders.len(),
            sent,
            "dispatch fan-out complete"
        );
        sent
    }

    /// Record a police notification for `dispatch`.
    ///
    /// Returns `true` when the police log accepted the record. When the log
    /// is unavailable an audit entry is written instead and `false` is
    /// returned. Never fails.
    pub async fn notify_police(&self, dispatch: &DispatchRequest) -> bool {
        let now = self.clock.now();
        let record = PoliceNotificationRecord::for_dispatch(dispatch, &self.config.police_agency, now);

        let failure = match self.police.log_police_notification(&record).await {
            Ok(true) => None,
            Ok(false) => Some("police log unavailable".to_string()),
            Err(e) => Some(e.to_string()),
        };

        let logged = failure.is_none();
        if logged {
            if let Err(e) = self.repo.mark_police_notified(dispatch.id, now).await {
                warn!(dispatch_id = %dispatch.id, error = %e, "failed to flag dispatch as police-notified");
            }
            info!(dispatch_id = %dispatch.id, agency = %record.agency, "police notified");
        } else {
            warn!(
                dispatch_id = %dispatch.id,
                agency = %record.agency,
                error = failure.as_deref().unwrap_or_default(),
                "police log unavailable, falling back to audit entry"
            );
        }

        let description = if logged {
            format!("Police notified ({})", record.agency)
        } else {
            format!("Police notification for {} recorded in audit trail only", record.agency)
        };
        let entry = AuditEntry::new(
            dispatch.id,
            AuditEntry::SYSTEM_ACTOR,
            description,
            AuditMetadata::PoliceNotified {
                agency: record.agency.clone(),
                logged,
                error: failure,
            },
            now,
        );
        self.append_audit(&entry).await;

        logged
    }

    async fn load(&self, id: DispatchId) -> Result<DispatchRequest, DispatchError> {
        self.repo.get(id).await?.ok_or(DispatchError::NotFound(id))
    }

    fn lost_race(dispatch: DispatchRequest, to: DispatchStatus) -> DispatchError {
        if dispatch.status == to {
            DispatchError::Conflict {
                id: dispatch.id,
                current: dispatch.status,
            }
        } else {
            DispatchError::InvalidTransition {
                id: dispatch.id,
                from: dispatch.status,
                to,
            }
        }
    }

    /// `PENDING | EXPIRED → ACCEPTED` for `officer_id`.
    ///
    /// The status change is a compare-and-set, so of two concurrent
    /// acknowledgements exactly one wins; the other gets
    /// [`DispatchError::Conflict`].
    pub async fn acknowledge(&self, id: DispatchId, officer_id: &str) -> Result<DispatchRequest, DispatchError> {
        let current = self.load(id).await?;
        if !current.dispatch_eligible {
            return Err(DispatchError::NotEligible(id));
        }

        let now = self.clock.now();
        let change = StatusChange::Accept {
            officer_id: officer_id.to_string(),
            at: now,
        };
        let Some(updated) = self.repo.transition(id, DispatchStatus::ACCEPTABLE, change).await? else {
            let latest = self.load(id).await?;
            return Err(Self::lost_race(latest, DispatchStatus::Accepted));
        };

        info!(dispatch_id = %id, officer_id, "dispatch accepted");
        let entry = AuditEntry::new(
            id,
            officer_id,
            format!("Dispatch accepted by {officer_id}"),
            AuditMetadata::Accepted {
                officer_id: officer_id.to_string(),
            },
            now,
        );
        self.append_audit(&entry).await;

        match self
            .notifier
            .record_response(id, officer_id, ResponseStatus::Acknowledged)
            .await
        {
            Ok(0) => debug!(dispatch_id = %id, officer_id, "no notifications to acknowledge"),
            Ok(_) => {}
            Err(e) => warn!(dispatch_id = %id, officer_id, error = %e, "failed to acknowledge notifications"),
        }
        match self.notifier.cancel_pending_for_dispatch(id).await {
            Ok(0) => {}
            Ok(n) => debug!(dispatch_id = %id, cancelled = n, "pending alert retries cancelled"),
            Err(e) => warn!(dispatch_id = %id, error = %e, "failed to cancel pending alerts"),
        }

        Ok(updated)
    }

    /// Any non-terminal status `→ COMPLETED` with a resolution.
    pub async fn resolve(
        &self,
        id: DispatchId,
        code: ResolutionCode,
        notes: Option<String>,
        resolved_by: &str,
    ) -> Result<DispatchRequest, DispatchError> {
        self.load(id).await?;
        let now = self.clock.now();
        let change = StatusChange::Complete {
            code,
            notes: notes.clone(),
            resolved_by: resolved_by.to_string(),
            at: now,
        };
        let Some(updated) = self.repo.transition(id, DispatchStatus::RESOLVABLE, change).await? else {
            let latest = self.load(id).await?;
            return Err(Self::lost_race(latest, DispatchStatus::Completed));
        };

        info!(dispatch_id = %id, resolved_by, resolution = ?code, "dispatch completed");
        let entry = AuditEntry::new(
            id,
            resolved_by,
            format!("Dispatch completed: {code:?}"),
            AuditMetadata::Completed {
                resolution_code: code,
                notes,
            },
            now,
        );
        self.append_audit(&entry).await;

        Ok(updated)
    }
}
