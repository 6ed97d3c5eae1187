//! Dispatch record storage.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use welfare_core::{CaseId, DispatchId, Jurisdiction, StoreError};

use crate::model::{AuditEntry, DispatchRequest, DispatchStatus, Responder, StatusChange};

/// Storage seam for dispatch records, their audit trail and responders.
///
/// `transition` is the compare-and-set used for every status change: it
/// applies `change` only if the stored status is one of `from`, atomically
/// with respect to other transitions on the same record.
#[async_trait::async_trait]
pub trait DispatchRepository: Send + Sync {
    async fn create(&self, dispatch: &DispatchRequest) -> Result<(), StoreError>;

    async fn get(&self, id: DispatchId) -> Result<Option<DispatchRequest>, StoreError>;

    /// Returns the updated record, or `None` when the current status is not in `from`.
    async fn transition(
        &self,
        id: DispatchId,
        from: &[DispatchStatus],
        change: StatusChange,
    ) -> Result<Option<DispatchRequest>, StoreError>;

    async fn mark_police_notified(&self, id: DispatchId, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn append_audit(&self, entry: &AuditEntry) -> Result<(), StoreError>;

    /// Audit entries for a dispatch, oldest first.
    async fn list_audit(&self, id: DispatchId) -> Result<Vec<AuditEntry>, StoreError>;

    /// Active responders covering `jurisdiction`.
    async fn eligible_responders(&self, jurisdiction: &Jurisdiction) -> Result<Vec<Responder>, StoreError>;

    /// Write a back-reference from the source incident to the dispatch.
    async fn link_case(&self, case_id: &CaseId, dispatch_id: DispatchId) -> Result<(), StoreError>;

    /// `PENDING` dispatches whose `expires_at` has passed, oldest deadline first.
    async fn overdue_pending(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<DispatchRequest>, StoreError>;
}

/// Process-local repository. Stands in for the external records store in
/// the worker binary and in tests.
#[derive(Debug, Default)]
pub struct InMemoryDispatchRepository {
    dispatches: RwLock<HashMap<DispatchId, DispatchRequest>>,
    audit: RwLock<Vec<AuditEntry>>,
    responders: RwLock<Vec<Responder>>,
    case_links: RwLock<HashMap<CaseId, DispatchId>>,
}

impl InMemoryDispatchRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_responders(responders: Vec<Responder>) -> Self {
        let repo = Self::new();
        *repo.responders.write().expect("responders lock poisoned") = responders;
        repo
    }

    pub fn add_responder(&self, responder: Responder) {
        self.responders
            .write()
            .expect("responders lock poisoned")
            .push(responder);
    }

    /// Dispatch linked to `case_id`, if any.
    pub fn case_link(&self, case_id: &str) -> Option<DispatchId> {
        self.case_links
            .read()
            .expect("case links lock poisoned")
            .get(case_id)
            .copied()
    }

    pub fn dispatch_count(&self) -> usize {
        self.dispatches.read().expect("dispatch lock poisoned").len()
    }
}

#[async_trait::async_trait]
impl DispatchRepository for InMemoryDispatchRepository {
    async fn create(&self, dispatch: &DispatchRequest) -> Result<(), StoreError> {
        let mut rows = self.dispatches.write().expect("dispatch lock poisoned");
        if rows.contains_key(&dispatch.id) {
            return Err(StoreError::Duplicate(dispatch.id.to_string()));
        }
        rows.insert(dispatch.id, dispatch.clone());
        Ok(())
    }

    async fn get(&self, id: DispatchId) -> Result<Option<DispatchRequest>, StoreError> {
        Ok(self
            .dispatches
            .read()
            .expect("dispatch lock poisoned")
            .get(&id)
            .cloned())
    }

    async fn transition(
        &self,
        id: DispatchId,
        from: &[DispatchStatus],
        change: StatusChange,
    ) -> Result<Option<DispatchRequest>, StoreError> {
        let mut rows = self.dispatches.write().expect("dispatch lock poisoned");
        let row = rows
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if !from.contains(&row.status) {
            return Ok(None);
        }
        change.apply(row);
        Ok(Some(row.clone()))
    }

    async fn mark_police_notified(&self, id: DispatchId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut rows = self.dispatches.write().expect("dispatch lock poisoned");
        let row = rows
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        row.police_notified = true;
        row.police_notified_at = Some(at);
        row.updated_at = at;
        Ok(())
    }

    async fn append_audit(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        self.audit
            .write()
            .expect("audit lock poisoned")
            .push(entry.clone());
        Ok(())
    }

    async fn list_audit(&self, id: DispatchId) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(self
            .audit
            .read()
            .expect("audit lock poisoned")
            .iter()
            .filter(|e| e.dispatch_id == id)
            .cloned()
            .collect())
    }

    async fn eligible_responders(&self, jurisdiction: &Jurisdiction) -> Result<Vec<Responder>, StoreError> {
        Ok(self
            .responders
            .read()
            .expect("responders lock poisoned")
            .iter()
            .filter(|r| r.is_eligible_for(jurisdiction))
            .cloned()
            .collect())
    }

    async fn link_case(&self, case_id: &CaseId, dispatch_id: DispatchId) -> Result<(), StoreError> {
        self.case_links
            .write()
            .expect("case links lock poisoned")
            .insert(case_id.clone(), dispatch_id);
        Ok(())
    }

    async fn overdue_pending(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<DispatchRequest>, StoreError> {
        let rows = self.dispatches.read().expect("dispatch lock poisoned");
        let mut overdue: Vec<DispatchRequest> = rows.values().filter(|d| d.is_overdue(now)).cloned().collect();
        overdue.sort_by_key(|d| d.expires_at);
        overdue.truncate(limit);
        Ok(overdue)
    }
}
