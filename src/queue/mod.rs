//! Distributed (in-process, shardable) priority queue: C6–C10.

pub mod alerts;
pub mod backpressure;
pub mod dead_letter;
pub mod heap;
pub mod item;
pub mod manager;
pub mod persistence;

pub use alerts::{Alert, AlertThresholds};
pub use backpressure::BackpressureController;
pub use dead_letter::{DeadLetterItem, DeadLetterQueue};
pub use heap::PriorityHeap;
pub use item::{Priority, QueueItem, QueueItemError};
pub use manager::{AlertMetric, QueueConfigError, QueueError, QueueManager, QueueMetrics};
pub use persistence::{Codec, FilesystemStore, GzipCodec, NoopCodec, PersistenceStore};
