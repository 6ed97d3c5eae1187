//! Priority ordering for pending notification work.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};
use welfare_core::NotificationId;

use crate::types::{Notification, NotificationPriority};

/// A queued unit of work: which notification, and the keys it sorts by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedItem {
    pub notification_id: NotificationId,
    pub priority: NotificationPriority,
    pub created_at: DateTime<Utc>,
}

impl From<&Notification> for QueuedItem {
    fn from(n: &Notification) -> Self {
        Self {
            notification_id: n.id,
            priority: n.priority,
            created_at: n.created_at,
        }
    }
}

impl Ord for QueuedItem {
    /// Max-heap order: higher priority score first, then older first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .score()
            .cmp(&other.priority.score())
            .then_with(|| other.created_at.cmp(&self.created_at))
            .then_with(|| other.notification_id.cmp(&self.notification_id))
    }
}

impl PartialOrd for QueuedItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// In-process queue yielding notifications by priority score (descending),
/// then creation time (ascending).
#[derive(Debug, Default)]
pub struct ProcessingQueue {
    heap: BinaryHeap<QueuedItem>,
}

impl ProcessingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: impl Into<QueuedItem>) {
        self.heap.push(item.into());
    }

    pub fn pop(&mut self) -> Option<QueuedItem> {
        self.heap.pop()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drain every item in processing order.
    pub fn drain_ordered(&mut self) -> Vec<QueuedItem> {
        let mut out = Vec::with_capacity(self.heap.len());
        while let Some(item) = self.heap.pop() {
            out.push(item);
        }
        out
    }
}

impl<'a> FromIterator<&'a Notification> for ProcessingQueue {
    fn from_iter<I: IntoIterator<Item = &'a Notification>>(iter: I) -> Self {
        let mut queue = Self::new();
        for n in iter {
            queue.push(n);
        }
        queue
    }
}
