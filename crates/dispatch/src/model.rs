//! Dispatch records, audit trail entries and responders.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use welfare_core::{AuditEntryId, CaseId, DispatchId, Jurisdiction, OfficerId};
use welfare_notify::{NotificationPreferences, NotificationPriority};
use welfare_rules::schema::{LawPriority, LegalBasis, TriggerCategory};
use welfare_rules::LawTriggerResult;

use crate::error::DispatchError;

// ── Status ──────────────────────────────────────────────────────────

/// `PENDING → ACCEPTED → COMPLETED`. Overdue `PENDING` dispatches are
/// moved to `EXPIRED` by the expiry sweeper; `EXPIRED` can still be
/// accepted or completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DispatchStatus {
    Pending,
    Accepted,
    Completed,
    Expired,
}

impl DispatchStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DispatchStatus::Completed)
    }

    /// States an officer may accept from.
    pub const ACCEPTABLE: &'static [DispatchStatus] = &[DispatchStatus::Pending, DispatchStatus::Expired];

    /// States a dispatch may be completed from.
    pub const RESOLVABLE: &'static [DispatchStatus] = &[
        DispatchStatus::Pending,
        DispatchStatus::Accepted,
        DispatchStatus::Expired,
    ];
}

impl fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchStatus::Pending => write!(f, "PENDING"),
            DispatchStatus::Accepted => write!(f, "ACCEPTED"),
            DispatchStatus::Completed => write!(f, "COMPLETED"),
            DispatchStatus::Expired => write!(f, "EXPIRED"),
        }
    }
}

/// How a dispatch was closed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionCode {
    AnimalSecured,
    AnimalSeized,
    CitationIssued,
    WarningIssued,
    ReferredToAgency,
    NoViolationFound,
    UnableToLocate,
    Duplicate,
    Other,
}

// ── Dispatch request ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

impl Location {
    pub fn address(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            latitude: None,
            longitude: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Input to [`DispatchOrchestrator::create_dispatch`](crate::DispatchOrchestrator::create_dispatch).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchParams {
    /// Incident record this dispatch originates from, if any.
    #[serde(default)]
    pub source_case_id: Option<CaseId>,
    pub jurisdiction: Jurisdiction,
    pub location: Location,
    pub species: String,
    pub condition: String,
    #[serde(default)]
    pub requester: Option<ContactInfo>,
    #[serde(default)]
    pub triggers: BTreeSet<TriggerCategory>,
    #[serde(default)]
    pub notify_police: bool,
}

impl DispatchParams {
    /// Reject missing required fields before anything is created.
    pub fn validate(&self) -> Result<(), DispatchError> {
        let mut missing = Vec::new();
        if self.jurisdiction.is_empty() {
            missing.push("jurisdiction");
        }
        if self.location.address.trim().is_empty() {
            missing.push("location.address");
        }
        if self.species.trim().is_empty() {
            missing.push("species");
        }
        if self.condition.trim().is_empty() {
            missing.push("condition");
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(DispatchError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )))
        }
    }
}

/// A dispatch record. Created once per qualifying incident, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub id: DispatchId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_case_id: Option<CaseId>,
    pub jurisdiction: Jurisdiction,
    pub location: Location,
    pub species: String,
    pub condition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester: Option<ContactInfo>,
    pub triggers: BTreeSet<TriggerCategory>,
    pub priority: LawPriority,
    pub status: DispatchStatus,
    pub dispatch_eligible: bool,
    pub requires_immediate: bool,
    /// Primary rule that produced the dispatch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legal_basis: Option<LegalBasis>,
    pub citations: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// `created_at` plus the primary rule's SLA. Fixed at creation.
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_officer: Option<OfficerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub police_notified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub police_notified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expired_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_code: Option<ResolutionCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl DispatchRequest {
    /// Build a `PENDING` dispatch from a positive evaluation.
    ///
    /// `expires_at` is `now` plus the primary rule's SLA, or
    /// `default_sla_minutes` when the rule sets none.
    pub fn from_evaluation(
        params: &DispatchParams,
        evaluation: &LawTriggerResult,
        default_sla_minutes: u32,
        now: DateTime<Utc>,
    ) -> Self {
        let primary = evaluation.primary_rule.as_ref();
        let sla = evaluation.sla_minutes().unwrap_or(default_sla_minutes);

        Self {
            id: Uuid::new_v4(),
            source_case_id: params.source_case_id.clone(),
            jurisdiction: params.jurisdiction.clone(),
            location: params.location.clone(),
            species: params.species.trim().to_string(),
            condition: params.condition.trim().to_string(),
            requester: params.requester.clone(),
            triggers: params.triggers.clone(),
            priority: primary.map_or(LawPriority::Low, |r| r.priority),
            status: DispatchStatus::Pending,
            dispatch_eligible: evaluation.triggers_dispatch,
            requires_immediate: evaluation.requires_immediate,
            rule_id: primary.map(|r| r.id.clone()),
            rule_name: primary.map(|r| r.name.clone()),
            legal_basis: primary.map(|r| r.legal_basis),
            citations: evaluation.citations.clone(),
            created_at: now,
            updated_at: now,
            expires_at: now + Duration::minutes(i64::from(sla)),
            assigned_officer: None,
            accepted_at: None,
            police_notified: false,
            police_notified_at: None,
            expired_at: None,
            resolution_code: None,
            resolution_notes: None,
            resolved_by: None,
            resolved_at: None,
        }
    }

    /// Read-time expiry: still `PENDING` past its deadline.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == DispatchStatus::Pending && now > self.expires_at
    }

    /// Notification priority for alerts about this dispatch.
    pub fn alert_priority(&self) -> NotificationPriority {
        match self.priority {
            LawPriority::Critical => NotificationPriority::Critical,
            LawPriority::High => NotificationPriority::Urgent,
            LawPriority::Medium => NotificationPriority::High,
            LawPriority::Low => NotificationPriority::Normal,
        }
    }
}

/// A status change applied atomically by [`DispatchRepository::transition`](crate::DispatchRepository::transition).
#[derive(Debug, Clone, PartialEq)]
pub enum StatusChange {
    Accept {
        officer_id: OfficerId,
        at: DateTime<Utc>,
    },
    Complete {
        code: ResolutionCode,
        notes: Option<String>,
        resolved_by: String,
        at: DateTime<Utc>,
    },
    Expire {
        at: DateTime<Utc>,
    },
}

impl StatusChange {
    pub fn target(&self) -> DispatchStatus {
        match self {
            StatusChange::Accept { .. } => DispatchStatus::Accepted,
            StatusChange::Complete { .. } => DispatchStatus::Completed,
            StatusChange::Expire { .. } => DispatchStatus::Expired,
        }
    }

    /// Apply to a record whose current status has already been checked.
    pub fn apply(&self, dispatch: &mut DispatchRequest) {
        dispatch.status = self.target();
        match self {
            StatusChange::Accept { officer_id, at } => {
                dispatch.assigned_officer = Some(officer_id.clone());
                dispatch.accepted_at = Some(*at);
                dispatch.updated_at = *at;
            }
            StatusChange::Complete { code, notes, resolved_by, at } => {
                dispatch.resolution_code = Some(*code);
                dispatch.resolution_notes = notes.clone();
                dispatch.resolved_by = Some(resolved_by.clone());
                dispatch.resolved_at = Some(*at);
                dispatch.updated_at = *at;
            }
            StatusChange::Expire { at } => {
                dispatch.expired_at = Some(*at);
                dispatch.updated_at = *at;
            }
        }
    }
}

// ── Audit trail ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Offered,
    Accepted,
    Completed,
    PoliceNotified,
    Expired,
}

/// Per-action audit payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditMetadata {
    Offered {
        rule_id: Option<String>,
        legal_basis: Option<LegalBasis>,
        priority: LawPriority,
        citations: Vec<String>,
        expires_at: DateTime<Utc>,
    },
    Accepted {
        officer_id: OfficerId,
    },
    Completed {
        resolution_code: ResolutionCode,
        notes: Option<String>,
    },
    PoliceNotified {
        agency: String,
        /// False when the police log was unavailable and this entry is the fallback record.
        logged: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Expired {
        expires_at: DateTime<Utc>,
        overdue_minutes: i64,
    },
}

impl AuditMetadata {
    pub fn action(&self) -> AuditAction {
        match self {
            AuditMetadata::Offered { .. } => AuditAction::Offered,
            AuditMetadata::Accepted { .. } => AuditAction::Accepted,
            AuditMetadata::Completed { .. } => AuditAction::Completed,
            AuditMetadata::PoliceNotified { .. } => AuditAction::PoliceNotified,
            AuditMetadata::Expired { .. } => AuditAction::Expired,
        }
    }
}

/// Append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: AuditEntryId,
    pub dispatch_id: DispatchId,
    pub action: AuditAction,
    /// Officer id, or `system` for automated entries.
    pub actor: String,
    pub description: String,
    pub metadata: AuditMetadata,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub const SYSTEM_ACTOR: &'static str = "system";

    pub fn new(
        dispatch_id: DispatchId,
        actor: impl Into<String>,
        description: impl Into<String>,
        metadata: AuditMetadata,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            dispatch_id,
            action: metadata.action(),
            actor: actor.into(),
            description: description.into(),
            metadata,
            created_at: now,
        }
    }
}

// ── Responders ──────────────────────────────────────────────────────

/// An officer who can receive dispatch alerts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Responder {
    pub officer_id: OfficerId,
    pub display_name: String,
    /// Area the officer covers; an officer covers every jurisdiction below it.
    pub jurisdiction: Jurisdiction,
    pub active: bool,
    pub preferences: NotificationPreferences,
}

impl Responder {
    /// Active and covering `jurisdiction` or one of its ancestors.
    pub fn is_eligible_for(&self, jurisdiction: &Jurisdiction) -> bool {
        self.active && jurisdiction.lineage().contains(&self.jurisdiction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use welfare_rules::schema::LawRule;

    fn params() -> DispatchParams {
        DispatchParams {
            source_case_id: Some("case-9".to_string()),
            jurisdiction: Jurisdiction::new("US-CA/los-angeles"),
            location: Location::address("100 Main St"),
            species: "dog".to_string(),
            condition: "left in hot car".to_string(),
            requester: None,
            triggers: BTreeSet::from([TriggerCategory::HotVehicle]),
            notify_police: false,
        }
    }

    fn rule(sla: Option<u32>) -> LawRule {
        LawRule {
            id: "ca-pc-597-7".to_string(),
            name: "Animal in unattended vehicle".to_string(),
            legal_basis: LegalBasis::StateStatute,
            priority: LawPriority::Critical,
            sla_minutes: sla,
            requires_immediate: true,
            citations: vec!["Cal. Penal Code § 597.7".to_string()],
        }
    }

    #[test]
    fn expiry_uses_rule_sla() {
        let now = Utc::now();
        let eval = LawTriggerResult::from_rules(vec![rule(Some(15))]);
        let d = DispatchRequest::from_evaluation(&params(), &eval, 480, now);
        assert_eq!(d.expires_at, now + Duration::minutes(15));
        assert_eq!(d.status, DispatchStatus::Pending);
        assert_eq!(d.rule_id.as_deref(), Some("ca-pc-597-7"));
        assert!(d.dispatch_eligible);
        assert_eq!(d.alert_priority(), NotificationPriority::Critical);
    }

    #[test]
    fn expiry_defaults_when_rule_has_no_sla() {
        let now = Utc::now();
        let eval = LawTriggerResult::from_rules(vec![rule(None)]);
        let d = DispatchRequest::from_evaluation(&params(), &eval, 480, now);
        assert_eq!(d.expires_at, now + Duration::minutes(480));
        assert!(!d.is_overdue(now + Duration::minutes(480)));
        assert!(d.is_overdue(now + Duration::minutes(481)));
    }

    #[test]
    fn validation_lists_missing_fields() {
        let mut p = params();
        p.species = "  ".to_string();
        p.location.address.clear();
        match p.validate().unwrap_err() {
            DispatchError::Validation(msg) => {
                assert!(msg.contains("species"));
                assert!(msg.contains("location.address"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        let mut empty_triggers = params();
        empty_triggers.triggers.clear();
        assert!(empty_triggers.validate().is_ok());
    }

    #[test]
    fn audit_metadata_is_tagged_by_action() {
        let entry = AuditEntry::new(
            Uuid::new_v4(),
            "officer-1",
            "accepted",
            AuditMetadata::Accepted { officer_id: "officer-1".to_string() },
            Utc::now(),
        );
        assert_eq!(entry.action, AuditAction::Accepted);
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["action"], "ACCEPTED");
        assert_eq!(json["metadata"]["action"], "ACCEPTED");
        assert_eq!(json["metadata"]["officer_id"], "officer-1");
    }

    #[test]
    fn responder_covers_descendant_jurisdictions() {
        let state = Responder {
            officer_id: "o1".to_string(),
            display_name: "State officer".to_string(),
            jurisdiction: Jurisdiction::new("US-CA"),
            active: true,
            preferences: NotificationPreferences::new("o1"),
        };
        assert!(state.is_eligible_for(&Jurisdiction::new("US-CA/los-angeles")));
        assert!(!state.is_eligible_for(&Jurisdiction::new("US-NV")));

        let mut city = state.clone();
        city.jurisdiction = Jurisdiction::new("US-CA/los-angeles");
        assert!(!city.is_eligible_for(&Jurisdiction::new("US-CA")));
        city.active = false;
        assert!(!city.is_eligible_for(&Jurisdiction::new("US-CA/los-angeles")));
    }
}
