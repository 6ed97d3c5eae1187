//! Police / 911 notification log.

use chrono::{DateTime, Utc};
use serde::Serialize;
use welfare_core::{DispatchId, Jurisdiction, StoreError};
use welfare_rules::schema::LawPriority;

use crate::model::DispatchRequest;

/// Structured record handed to the police log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoliceNotificationRecord {
    pub dispatch_id: DispatchId,
    pub agency: String,
    pub jurisdiction: Jurisdiction,
    pub address: String,
    pub species: String,
    pub condition: String,
    pub priority: LawPriority,
    pub requires_immediate: bool,
    pub citations: Vec<String>,
    pub requested_at: DateTime<Utc>,
}

impl PoliceNotificationRecord {
    pub fn for_dispatch(dispatch: &DispatchRequest, agency: &str, now: DateTime<Utc>) -> Self {
        Self {
            dispatch_id: dispatch.id,
            agency: agency.to_string(),
            jurisdiction: dispatch.jurisdiction.clone(),
            address: dispatch.location.address.clone(),
            species: dispatch.species.clone(),
            condition: dispatch.condition.clone(),
            priority: dispatch.priority,
            requires_immediate: dispatch.requires_immediate,
            citations: dispatch.citations.clone(),
            requested_at: now,
        }
    }
}

/// Dedicated police notification log. `Ok(false)` or an error means the
/// log is unavailable and the caller falls back to an audit entry.
#[async_trait::async_trait]
pub trait PoliceLog: Send + Sync {
    async fn log_police_notification(&self, record: &PoliceNotificationRecord) -> Result<bool, StoreError>;
}

/// Emits the record as a structured event on the `welfare::police` target.
#[derive(Debug, Default)]
pub struct TracingPoliceLog;

#[async_trait::async_trait]
impl PoliceLog for TracingPoliceLog {
    async fn log_police_notification(&self, record: &PoliceNotificationRecord) -> Result<bool, StoreError> {
        tracing::warn!(
            target: "welfare::police",
            dispatch_id = %record.dispatch_id,
            agency = %record.agency,
            jurisdiction = %record.jurisdiction,
            address = %record.address,
            species = %record.species,
            priority = %record.priority,
            requires_immediate = record.requires_immediate,
            citations = ?record.citations,
            "police notification"
        );
        Ok(true)
    }
}
