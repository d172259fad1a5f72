//! Dead-letter queue (C9): append-only record of permanently failed items.

use super::item::QueueItem;
use chrono::{DateTime, Utc};

/// A terminally failed item. Immutable once added; never re-enters the live queue.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetterItem {
    pub item: QueueItem,
    pub failure_reason: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct DeadLetterQueue {
    items: Vec<DeadLetterItem>,
}

impl DeadLetterQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, item: QueueItem, reason: impl Into<String>) {
        self.items.push(DeadLetterItem {
            item,
            failure_reason: reason.into(),
            failed_at: Utc::now(),
        });
    }

    /// Immutable snapshot of all dead-lettered items, oldest first.
    pub fn list(&self) -> &[DeadLetterItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
