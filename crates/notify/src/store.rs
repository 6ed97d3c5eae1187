//! Notification persistence.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use welfare_core::{DispatchId, NotificationId, StoreError};

use crate::types::{Notification, NotificationStatus, ResponseStatus};

/// Storage seam for notifications.
///
/// `claim` is the single point where a worker takes ownership of a
/// pending notification; it must be atomic so two workers never send the
/// same notification. Every other status change on a row that a worker
/// may be touching goes through a conditional operation as well
/// (`cancel_if_pending`, `release_claim`), never through `update`.
#[async_trait::async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert(&self, notification: &Notification) -> Result<(), StoreError>;

    async fn get(&self, id: NotificationId) -> Result<Option<Notification>, StoreError>;

    /// Replace a stored notification wholesale.
    async fn update(&self, notification: &Notification) -> Result<(), StoreError>;

    /// Atomically move `pending → queued`. Returns `None` when the
    /// notification is missing or not pending.
    async fn claim(&self, id: NotificationId, now: DateTime<Utc>) -> Result<Option<Notification>, StoreError>;

    /// Atomically move `pending → cancelled`. Returns `None` when the
    /// notification is missing or no longer pending.
    async fn cancel_if_pending(&self, id: NotificationId, now: DateTime<Utc>) -> Result<Option<Notification>, StoreError>;

    /// Atomically move `queued → pending`, due immediately. Returns `None`
    /// when the notification is missing or not queued.
    async fn release_claim(&self, id: NotificationId, now: DateTime<Utc>) -> Result<Option<Notification>, StoreError>;

    /// Release every claim taken before `cutoff`. Returns the released ids.
    async fn release_stale_claims(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<NotificationId>, StoreError>;

    /// Pending notifications whose `next_retry_at` has passed, oldest due first.
    async fn due_for_retry(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Notification>, StoreError>;

    /// Notifications sent to `recipient_id` at or after `since`.
    async fn count_sent_since(&self, recipient_id: &str, since: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn list_for_dispatch(&self, dispatch_id: DispatchId) -> Result<Vec<Notification>, StoreError>;

    /// Set the response status on every notification for `(dispatch, recipient)`.
    /// Returns how many rows changed.
    async fn set_response_status(
        &self,
        dispatch_id: DispatchId,
        recipient_id: &str,
        status: ResponseStatus,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError>;
}

/// Process-local store backed by a `RwLock<HashMap>`.
#[derive(Debug, Default)]
pub struct InMemoryNotificationStore {
    rows: RwLock<HashMap<NotificationId, Notification>>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().expect("notification store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every stored notification.
    pub fn all(&self) -> Vec<Notification> {
        self.rows
            .read()
            .expect("notification store lock poisoned")
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait::async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn insert(&self, notification: &Notification) -> Result<(), StoreError> {
        let mut rows = self.rows.write().expect("notification store lock poisoned");
        if rows.contains_key(&notification.id) {
            return Err(StoreError::Duplicate(notification.id.to_string()));
        }
        rows.insert(notification.id, notification.clone());
        Ok(())
    }

    async fn get(&self, id: NotificationId) -> Result<Option<Notification>, StoreError> {
        let rows = self.rows.read().expect("notification store lock poisoned");
        Ok(rows.get(&id).cloned())
    }

    async fn update(&self, notification: &Notification) -> Result<(), StoreError> {
        let mut rows = self.rows.write().expect("notification store lock poisoned");
        match rows.get_mut(&notification.id) {
            Some(row) => {
                *row = notification.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(notification.id.to_string())),
        }
    }

    async fn claim(&self, id: NotificationId, now: DateTime<Utc>) -> Result<Option<Notification>, StoreError> {
        let mut rows = self.rows.write().expect("notification store lock poisoned");
        let Some(row) = rows.get_mut(&id) else {
            return Ok(None);
        };
        if row.status != NotificationStatus::Pending {
            return Ok(None);
        }
        row.mark_queued(now)
            .map_err(|e| StoreError::Other(e.to_string()))?;
        Ok(Some(row.clone()))
    }

    async fn cancel_if_pending(&self, id: NotificationId, now: DateTime<Utc>) -> Result<Option<Notification>, StoreError> {
        let mut rows = self.rows.write().expect("notification store lock poisoned");
        let Some(row) = rows.get_mut(&id) else {
            return Ok(None);
        };
        if row.status != NotificationStatus::Pending {
            return Ok(None);
        }
        row.cancel(now).map_err(|e| StoreError::Other(e.to_string()))?;
        Ok(Some(row.clone()))
    }

    async fn release_claim(&self, id: NotificationId, now: DateTime<Utc>) -> Result<Option<Notification>, StoreError> {
        let mut rows = self.rows.write().expect("notification store lock poisoned");
        let Some(row) = rows.get_mut(&id) else {
            return Ok(None);
        };
        if row.status != NotificationStatus::Queued {
            return Ok(None);
        }
        row.release_claim(now)
            .map_err(|e| StoreError::Other(e.to_string()))?;
        Ok(Some(row.clone()))
    }

    async fn release_stale_claims(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<NotificationId>, StoreError> {
        let mut rows = self.rows.write().expect("notification store lock poisoned");
        let mut released = Vec::new();
        for row in rows.values_mut().filter(|n| n.is_claim_stale(cutoff)) {
            row.release_claim(now)
                .map_err(|e| StoreError::Other(e.to_string()))?;
            released.push(row.id);
        }
        Ok(released)
    }

    async fn due_for_retry(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Notification>, StoreError> {
        let rows = self.rows.read().expect("notification store lock poisoned");
        let mut due: Vec<Notification> = rows.values().filter(|n| n.is_due(now)).cloned().collect();
        due.sort_by_key(|n| (n.next_retry_at, n.created_at));
        due.truncate(limit);
        Ok(due)
    }

    async fn count_sent_since(&self, recipient_id: &str, since: DateTime<Utc>) -> Result<u64, StoreError> {
        let rows = self.rows.read().expect("notification store lock poisoned");
        Ok(rows
            .values()
            .filter(|n| n.recipient_id == recipient_id)
            .filter(|n| n.sent_at.map_or(false, |at| at >= since))
            .count() as u64)
    }

    async fn list_for_dispatch(&self, dispatch_id: DispatchId) -> Result<Vec<Notification>, StoreError> {
        let rows = self.rows.read().expect("notification store lock poisoned");
        let mut list: Vec<Notification> = rows
            .values()
            .filter(|n| n.dispatch_id == Some(dispatch_id))
            .cloned()
            .collect();
        list.sort_by_key(|n| n.created_at);
        Ok(list)
    }

    async fn set_response_status(
        &self,
        dispatch_id: DispatchId,
        recipient_id: &str,
        status: ResponseStatus,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut rows = self.rows.write().expect("notification store lock poisoned");
        let mut changed = 0;
        for n in rows.values_mut() {
            if n.dispatch_id == Some(dispatch_id)
                && n.recipient_id == recipient_id
                && n.response_status != status
            {
                n.response_status = status;
                n.updated_at = now;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Channel, NotificationPriority, NotificationType};
    use chrono::Duration;
    use std::sync::Arc;

    fn notification(recipient: &str, dispatch_id: Option<DispatchId>) -> Notification {
        Notification::new(
            recipient,
            NotificationType::DispatchAlert,
            NotificationPriority::High,
            Some(Channel::Sms),
            Some("+1".to_string()),
            "s".to_string(),
            "b".to_string(),
            3,
            dispatch_id,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn insert_rejects_duplicates() {
        let store = InMemoryNotificationStore::new();
        let n = notification("o1", None);
        store.insert(&n).await.unwrap();
        assert!(matches!(store.insert(&n).await, Err(StoreError::Duplicate(_))));
    }

    #[tokio::test]
    async fn claim_is_exclusive() {
        let store = Arc::new(InMemoryNotificationStore::new());
        let n = notification("o1", None);
        store.insert(&n).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let id = n.id;
            handles.push(tokio::spawn(async move { store.claim(id, Utc::now()).await.unwrap() }));
        }
        let mut claimed = 0;
        for h in handles {
            if h.await.unwrap().is_some() {
                claimed += 1;
            }
        }
        assert_eq!(claimed, 1);
        assert_eq!(store.get(n.id).await.unwrap().unwrap().status, NotificationStatus::Queued);
    }

    #[tokio::test]
    async fn cancel_if_pending_leaves_claimed_rows_alone() {
        let store = InMemoryNotificationStore::new();
        let now = Utc::now();
        let claimed = notification("o1", None);
        let idle = notification("o1", None);
        store.insert(&claimed).await.unwrap();
        store.insert(&idle).await.unwrap();
        store.claim(claimed.id, now).await.unwrap().unwrap();

        assert!(store.cancel_if_pending(claimed.id, now).await.unwrap().is_none());
        assert_eq!(store.get(claimed.id).await.unwrap().unwrap().status, NotificationStatus::Queued);

        let cancelled = store.cancel_if_pending(idle.id, now).await.unwrap().unwrap();
        assert_eq!(cancelled.status, NotificationStatus::Cancelled);
        assert!(store.cancel_if_pending(idle.id, now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_claims_are_released_for_retry() {
        let store = InMemoryNotificationStore::new();
        let now = Utc::now();
        let old = notification("o1", None);
        let fresh = notification("o1", None);
        store.insert(&old).await.unwrap();
        store.insert(&fresh).await.unwrap();
        store.claim(old.id, now - Duration::minutes(30)).await.unwrap().unwrap();
        store.claim(fresh.id, now).await.unwrap().unwrap();

        let released = store
            .release_stale_claims(now - Duration::minutes(5), now)
            .await
            .unwrap();
        assert_eq!(released, vec![old.id]);

        let due = store.due_for_retry(now, 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, old.id);
        assert_eq!(store.get(fresh.id).await.unwrap().unwrap().status, NotificationStatus::Queued);
    }

    #[tokio::test]
    async fn due_for_retry_respects_time_and_limit() {
        let store = InMemoryNotificationStore::new();
        let now = Utc::now();
        for minutes in [1, 2, 10] {
            let mut n = notification("o1", None);
            n.mark_failed("e", &[minutes], now).unwrap();
            store.insert(&n).await.unwrap();
        }
        store.insert(&notification("o2", None)).await.unwrap();

        let due = store.due_for_retry(now + Duration::minutes(5), 10).await.unwrap();
        assert_eq!(due.len(), 2);
        assert!(due[0].next_retry_at <= due[1].next_retry_at);

        let limited = store.due_for_retry(now + Duration::minutes(30), 1).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn response_status_is_scoped_to_dispatch_and_recipient() {
        let store = InMemoryNotificationStore::new();
        let dispatch = uuid::Uuid::new_v4();
        store.insert(&notification("o1", Some(dispatch))).await.unwrap();
        store.insert(&notification("o1", Some(dispatch))).await.unwrap();
        store.insert(&notification("o2", Some(dispatch))).await.unwrap();
        store.insert(&notification("o1", None)).await.unwrap();

        let changed = store
            .set_response_status(dispatch, "o1", ResponseStatus::Acknowledged, Utc::now())
            .await
            .unwrap();
        assert_eq!(changed, 2);
        assert_eq!(store.list_for_dispatch(dispatch).await.unwrap().len(), 3);
    }
}
