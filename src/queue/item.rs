//! The queue's data model: [`Priority`] and [`QueueItem`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The four fixed priority levels. Higher numeric value dequeues first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Priority {
    Low = 1,
    Normal = 5,
    High = 10,
    Critical = 20,
}

impl Priority {
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// A unit of work. `data` is an opaque JSON payload handed to the user work function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    pub data: serde_json::Value,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub ttl_seconds: Option<f64>,
    pub partition: Option<usize>,
}

/// Raised when [`QueueItem`] construction violates an invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueItemError {
    EmptyId,
    RetryCountExceedsMax { retry_count: u32, max_retries: u32 },
}

impl std::fmt::Display for QueueItemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "item id must be non-empty"),
            Self::RetryCountExceedsMax { retry_count, max_retries } => write!(
                f,
                "retry_count ({retry_count}) must not exceed max_retries ({max_retries})"
            ),
        }
    }
}

impl std::error::Error for QueueItemError {}

impl QueueItem {
    /// Builds a new item with `retry_count` reset to 0.
    pub fn new(
        id: impl Into<String>,
        data: serde_json::Value,
        priority: Priority,
        max_retries: u32,
    ) -> Result<Self, QueueItemError> {
        let id = id.into();
        if id.is_empty() {
            return Err(QueueItemError::EmptyId);
        }
        Ok(Self {
            id,
            data,
            priority,
            created_at: Utc::now(),
            retry_count: 0,
            max_retries,
            ttl_seconds: None,
            partition: None,
        })
    }

    pub fn with_ttl(mut self, ttl_seconds: f64) -> Self {
        self.ttl_seconds = Some(ttl_seconds);
        self
    }

    pub fn with_partition(mut self, partition: usize) -> Self {
        self.partition = Some(partition);
        self
    }

    fn validate(&self) -> Result<(), QueueItemError> {
        if self.id.is_empty() {
            return Err(QueueItemError::EmptyId);
        }
        if self.retry_count > self.max_retries {
            return Err(QueueItemError::RetryCountExceedsMax {
                retry_count: self.retry_count,
                max_retries: self.max_retries,
            });
        }
        Ok(())
    }

    pub fn check_invariants(&self) -> Result<(), QueueItemError> {
        self.validate()
    }

    /// True once `now - created_at > ttl_seconds`. Items without a TTL never expire.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.ttl_seconds {
            None => false,
            Some(ttl) => {
                let age = (now - self.created_at).num_milliseconds() as f64 / 1000.0;
                age > ttl
            }
        }
    }

    /// Returns a clone with `retry_count` incremented, preserving `created_at`
    /// (TTL is end-to-end, not per-attempt).
    pub fn incremented_for_retry(&self) -> Self {
        let mut next = self.clone();
        next.retry_count += 1;
        next
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}
