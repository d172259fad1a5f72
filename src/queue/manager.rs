//! Queue Manager (C10): the only public queue surface.
//!
//! Composes the priority heap, backpressure controller, circuit breaker,
//! dead-letter queue, alert thresholds and persistence behind a single
//! reentrant lock. Rate-limit sleeps happen outside that lock so a paced
//! dequeue never blocks a concurrent enqueue.

use super::alerts::{Alert, AlertThresholds};
use super::backpressure::BackpressureController;
use super::dead_letter::DeadLetterQueue;
use super::heap::PriorityHeap;
use super::item::QueueItem;
use super::persistence::{Codec, FilesystemStore, GzipCodec, ItemDict, PersistedMetrics, PersistenceStore, QueueSnapshot};
use crate::circuit_breaker::CircuitBreaker;
use crate::error::CoreError;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;

const WAIT_TIME_RING_LEN: usize = 1000;

/// Queue-manager-only error type. The public queue surface never threads a
/// user work-function error, so `E = Infallible`.
pub type QueueError = CoreError<Infallible>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertMetric {
    Size,
    WaitTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueConfigError {
    ZeroPartitions,
    NonPositiveRate,
}

impl std::fmt::Display for QueueConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroPartitions => write!(f, "partition count must be greater than zero"),
            Self::NonPositiveRate => write!(f, "rate limit must be a positive items-per-second value"),
        }
    }
}
impl std::error::Error for QueueConfigError {}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueueMetrics {
    pub size: usize,
    pub max_size: usize,
    pub total_enqueued: u64,
    pub total_dequeued: u64,
    pub dead_letter_count: u64,
    pub expired_count: u64,
    pub avg_wait_time_secs: f64,
    pub backpressure_active: bool,
    pub circuit_breaker_open: bool,
}

/// Paces dequeues to at most `rate` items/sec. Sleeps outside the queue lock.
struct DequeuePacer {
    min_interval: Duration,
    last_tick: AsyncMutex<Option<Instant>>,
}

impl DequeuePacer {
    fn new(items_per_sec: f64) -> Self {
        Self {
            min_interval: Duration::from_secs_f64(1.0 / items_per_sec),
            last_tick: AsyncMutex::new(None),
        }
    }

    async fn pace(&self) {
        let mut last = self.last_tick.lock().await;
        let now = Instant::now();
        if let Some(prev) = *last {
            let elapsed = now.saturating_duration_since(prev);
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

struct Inner {
    heap: PriorityHeap,
    partitions: Option<Vec<PriorityHeap>>,
    next_partition: usize,
    dlq: DeadLetterQueue,
    expired: Vec<QueueItem>,
    wait_times: VecDeque<f64>,
    total_enqueued: u64,
    total_dequeued: u64,
    backpressure: BackpressureController,
    alerts: AlertThresholds,
}

impl Inner {
    fn size(&self) -> usize {
        let partitioned: usize = self.partitions.as_ref().map_or(0, |p| p.iter().map(|h| h.len()).sum());
        self.heap.len() + partitioned
    }

    fn push(&mut self, item: QueueItem) {
        match &mut self.partitions {
            Some(parts) if !parts.is_empty() => {
                let idx = item.partition.unwrap_or(0) % parts.len();
                parts[idx].push(item);
            }
            _ => self.heap.push(item),
        }
    }

    fn evict_expired(&mut self) {
        let now = Utc::now();
        let mut removed = self.heap.remove_where(|item| item.is_expired(now));
        if let Some(parts) = &mut self.partitions {
            for part in parts.iter_mut() {
                removed.extend(part.remove_where(|item| item.is_expired(now)));
            }
        }
        let count = removed.len();
        self.expired.extend(removed);
        if count > 0 {
            tracing::debug!(count, "evicted expired items during dequeue TTL scan");
        }
    }

    fn pop(&mut self) -> Option<QueueItem> {
        match &mut self.partitions {
            Some(parts) if !parts.is_empty() => {
                let n = parts.len();
                for offset in 0..n {
                    let idx = (self.next_partition + offset) % n;
                    if let Some(item) = parts[idx].pop() {
                        self.next_partition = (idx + 1) % n;
                        return Some(item);
                    }
                }
                None
            }
            _ => self.heap.pop(),
        }
    }

    fn record_dequeue(&mut self, item: &QueueItem) {
        let wait = (Utc::now() - item.created_at).num_milliseconds() as f64 / 1000.0;
        if self.wait_times.len() >= WAIT_TIME_RING_LEN {
            self.wait_times.pop_front();
        }
        self.wait_times.push_back(wait.max(0.0));
        self.total_dequeued += 1;
    }

    fn avg_wait_time(&self) -> f64 {
        if self.wait_times.is_empty() {
            0.0
        } else {
            self.wait_times.iter().sum::<f64>() / self.wait_times.len() as f64
        }
    }
}

/// The primary, and only, public queue surface.
pub struct QueueManager {
    inner: Mutex<Inner>,
    max_size: usize,
    circuit_breaker: Mutex<CircuitBreaker>,
    dequeue_pacer: Mutex<Option<Arc<DequeuePacer>>>,
    persistence: Mutex<Option<(Box<dyn PersistenceStore>, Box<dyn Codec>)>>,
}

impl QueueManager {
    pub fn new(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                heap: PriorityHeap::new(),
                partitions: None,
                next_partition: 0,
                dlq: DeadLetterQueue::new(),
                expired: Vec::new(),
                wait_times: VecDeque::new(),
                total_enqueued: 0,
                total_dequeued: 0,
                backpressure: BackpressureController::default_threshold(),
                alerts: AlertThresholds::new(),
            }),
            max_size,
            circuit_breaker: Mutex::new(CircuitBreaker::new(5, Duration::from_secs(30))),
            dequeue_pacer: Mutex::new(None),
            persistence: Mutex::new(None),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("queue manager mutex poisoned")
    }

    /// Backpressure active -> `BACKPRESSURE_ACTIVE`; at capacity -> `QUEUE_FULL`.
    pub fn enqueue(&self, item: QueueItem) -> Result<(), QueueError> {
        item.check_invariants().map_err(|e| QueueError::ValidationError { message: e.to_string() })?;

        let mut inner = self.lock();
        if inner.backpressure.is_active() {
            return Err(QueueError::BackpressureActive);
        }
        let size = inner.size();
        if size >= self.max_size {
            return Err(QueueError::QueueFull { size, max_size: self.max_size });
        }

        inner.push(item);
        inner.total_enqueued += 1;
        let size = inner.size();
        inner.backpressure.check(size, self.max_size);
        self.refresh_alerts(&mut inner);
        Ok(())
    }

    /// Sequential application; stops at the first rejection and reports how many landed.
    pub fn enqueue_batch(&self, items: Vec<QueueItem>) -> (usize, Option<QueueError>) {
        let mut accepted = 0;
        for item in items {
            match self.enqueue(item) {
                Ok(()) => accepted += 1,
                Err(e) => return (accepted, Some(e)),
            }
        }
        (accepted, None)
    }

    /// Circuit-open -> fail; otherwise paces, TTL-scans, and pops the highest-priority item.
    pub async fn dequeue(&self) -> Result<Option<QueueItem>, QueueError> {
        {
            let breaker = self.circuit_breaker.lock().expect("circuit breaker mutex poisoned").clone();
            if !breaker.can_proceed() {
                return Err(QueueError::CircuitOpen {
                    failure_count: breaker.failure_count(),
                    open_for: Duration::from_secs(0),
                });
            }
        }

        let pacer = self.dequeue_pacer.lock().expect("pacer mutex poisoned").clone();
        if let Some(pacer) = pacer {
            pacer.pace().await;
        }

        let mut inner = self.lock();
        inner.evict_expired();
        let popped = inner.pop();
        if let Some(item) = &popped {
            inner.record_dequeue(item);
        }
        let size = inner.size();
        inner.backpressure.check(size, self.max_size);
        self.refresh_alerts(&mut inner);
        Ok(popped)
    }

    /// Up to `n` items; each call independently re-runs the circuit/pace/TTL gates.
    pub async fn dequeue_batch(&self, n: usize) -> Result<Vec<QueueItem>, QueueError> {
        let mut items = Vec::with_capacity(n);
        for _ in 0..n {
            match self.dequeue().await? {
                Some(item) => items.push(item),
                None => break,
            }
        }
        Ok(items)
    }

    /// Linear scan for the first match; not circuit-breaker-gated (administrative path).
    pub fn dequeue_filtered(&self, mut pred: impl FnMut(&QueueItem) -> bool) -> Option<QueueItem> {
        let mut inner = self.lock();
        if let Some(found) = inner.heap.remove_first_where(&mut pred) {
            let size = inner.size();
            inner.backpressure.check(size, self.max_size);
            return Some(found);
        }
        if let Some(parts) = &mut inner.partitions {
            for part in parts.iter_mut() {
                if let Some(found) = part.remove_first_where(&mut pred) {
                    let size = inner.size();
                    inner.backpressure.check(size, self.max_size);
                    return Some(found);
                }
            }
        }
        None
    }

    pub fn move_to_dead_letter(&self, item: QueueItem, reason: impl Into<String>) {
        self.lock().dlq.add(item, reason);
    }

    /// Feeds the circuit breaker only; never touches queue contents.
    pub fn report_processing_failure(&self) {
        self.circuit_breaker.lock().expect("circuit breaker mutex poisoned").record_failure();
    }

    /// A cheap, cloned handle to the configured circuit breaker, for callers
    /// (the orchestrator) that need to report processing successes directly.
    pub fn circuit_breaker_handle(&self) -> CircuitBreaker {
        self.circuit_breaker.lock().expect("circuit breaker mutex poisoned").clone()
    }

    pub fn size(&self) -> usize {
        self.lock().size()
    }

    pub fn get_metrics(&self) -> QueueMetrics {
        let inner = self.lock();
        let breaker = self.circuit_breaker.lock().expect("circuit breaker mutex poisoned");
        QueueMetrics {
            size: inner.size(),
            max_size: self.max_size,
            total_enqueued: inner.total_enqueued,
            total_dequeued: inner.total_dequeued,
            dead_letter_count: inner.dlq.len() as u64,
            expired_count: inner.expired.len() as u64,
            avg_wait_time_secs: inner.avg_wait_time(),
            backpressure_active: inner.backpressure.is_active(),
            circuit_breaker_open: breaker.is_open(),
        }
    }

    pub fn get_active_alerts(&self) -> Vec<Alert> {
        let inner = self.lock();
        inner.alerts.evaluate(inner.size(), inner.avg_wait_time())
    }

    pub fn get_dead_letter_items(&self) -> Vec<super::dead_letter::DeadLetterItem> {
        self.lock().dlq.list().to_vec()
    }

    pub fn get_expired_items(&self) -> Vec<QueueItem> {
        self.lock().expired.clone()
    }

    pub fn partition_distribution(&self) -> HashMap<usize, usize> {
        let inner = self.lock();
        match &inner.partitions {
            Some(parts) => parts.iter().enumerate().map(|(i, h)| (i, h.len())).collect(),
            None => HashMap::new(),
        }
    }

    fn refresh_alerts(&self, inner: &mut Inner) {
        let alerts = inner.alerts.evaluate(inner.size(), inner.avg_wait_time());
        for alert in &alerts {
            tracing::warn!(?alert, "queue alert active");
        }
    }

    // -- configuration toggles --

    pub fn enable_partitioning(&self, partitions: usize) -> Result<(), QueueConfigError> {
        if partitions == 0 {
            return Err(QueueConfigError::ZeroPartitions);
        }
        let mut inner = self.lock();
        let mut drained: Vec<QueueItem> = std::iter::from_fn(|| inner.heap.pop()).collect();
        if let Some(existing) = inner.partitions.take() {
            for mut part in existing {
                drained.extend(std::iter::from_fn(move || part.pop()));
            }
        }
        let mut new_partitions: Vec<PriorityHeap> = (0..partitions).map(|_| PriorityHeap::new()).collect();
        for item in drained {
            let idx = item.partition.unwrap_or(0) % partitions;
            new_partitions[idx].push(item);
        }
        inner.partitions = Some(new_partitions);
        inner.next_partition = 0;
        Ok(())
    }

    pub fn set_rate_limit(&self, items_per_sec: f64) -> Result<(), QueueConfigError> {
        if items_per_sec <= 0.0 {
            return Err(QueueConfigError::NonPositiveRate);
        }
        *self.dequeue_pacer.lock().expect("pacer mutex poisoned") = Some(Arc::new(DequeuePacer::new(items_per_sec)));
        Ok(())
    }

    pub fn configure_circuit_breaker(&self, failure_threshold: usize, recovery: Duration) {
        *self.circuit_breaker.lock().expect("circuit breaker mutex poisoned") =
            CircuitBreaker::new(failure_threshold, recovery);
    }

    pub fn set_alert_threshold(&self, metric: AlertMetric, value: f64) {
        let mut inner = self.lock();
        match metric {
            AlertMetric::Size => inner.alerts.set_size_threshold(value as usize),
            AlertMetric::WaitTime => inner.alerts.set_wait_time_threshold(value),
        }
    }

    pub fn enable_persistence(&self, store: impl PersistenceStore + 'static, codec: impl Codec + 'static) {
        *self.persistence.lock().expect("persistence mutex poisoned") = Some((Box::new(store), Box::new(codec)));
    }

    pub fn enable_persistence_at_path(&self, path: impl AsRef<std::path::Path>) {
        self.enable_persistence(FilesystemStore::new(path), GzipCodec);
    }

    /// Serializes heap + counters through the configured codec/store.
    /// A no-op if persistence was never enabled.
    pub fn save_state(&self) -> std::io::Result<()> {
        let guard = self.persistence.lock().expect("persistence mutex poisoned");
        let Some((store, codec)) = guard.as_ref() else { return Ok(()) };

        let inner = self.lock();
        let mut queue: Vec<ItemDict> = inner.heap.iter_items().map(ItemDict::from).collect();
        if let Some(parts) = &inner.partitions {
            for part in parts {
                queue.extend(part.iter_items().map(ItemDict::from));
            }
        }
        let snapshot = QueueSnapshot {
            queue,
            metrics: PersistedMetrics {
                total_enqueued: inner.total_enqueued,
                total_dequeued: inner.total_dequeued,
            },
        };
        drop(inner);

        let json = serde_json::to_vec(&snapshot)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let compressed = codec.compress(&json)?;
        store.save(&compressed)
    }

    /// Rebuilds the heap from a stored snapshot, reassigning sequences in scan
    /// order. On any failure the queue is left empty and the error is logged,
    /// never raised.
    pub fn restore_state(&self) {
        let guard = self.persistence.lock().expect("persistence mutex poisoned");
        let Some((store, codec)) = guard.as_ref() else { return };

        let result = store
            .load()
            .and_then(|bytes| codec.decompress(&bytes))
            .map_err(|e| e.to_string())
            .and_then(|json| serde_json::from_slice::<QueueSnapshot>(&json).map_err(|e| e.to_string()));

        match result {
            Ok(snapshot) => {
                let items: Vec<QueueItem> = snapshot
                    .queue
                    .into_iter()
                    .filter_map(|dict| QueueItem::try_from(dict).ok())
                    .collect();
                let mut inner = self.lock();
                inner.heap.rebuild_from(items);
                if let Some(parts) = &mut inner.partitions {
                    for part in parts.iter_mut() {
                        part.rebuild_from(Vec::new());
                    }
                }
                inner.total_enqueued = snapshot.metrics.total_enqueued;
                inner.total_dequeued = snapshot.metrics.total_dequeued;
            }
            Err(err) => {
                tracing::warn!(error = %err, "restore_state failed, queue left empty");
                let mut inner = self.lock();
                inner.heap.rebuild_from(Vec::new());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::item::Priority;

    fn item(id: &str, priority: Priority) -> QueueItem {
        QueueItem::new(id, serde_json::json!(null), priority, 3).unwrap()
    }

    #[tokio::test]
    async fn enqueue_then_dequeue_in_priority_order() {
        let manager = QueueManager::new(100);
        manager.enqueue(item("low", Priority::Low)).unwrap();
        manager.enqueue(item("high", Priority::High)).unwrap();
        manager.enqueue(item("normal", Priority::Normal)).unwrap();
        manager.enqueue(item("critical", Priority::Critical)).unwrap();

        let mut order = Vec::new();
        while let Some(popped) = manager.dequeue().await.unwrap() {
            order.push(popped.id);
        }
        assert_eq!(order, vec!["critical", "high", "normal", "low"]);
    }

    #[tokio::test]
    async fn backpressure_then_queue_full_scenario() {
        // max_size=10, default threshold=0.8: the 8th successful enqueue brings
        // size/max to 8/10 == 0.8, which trips backpressure immediately (it is
        // re-evaluated after every push). The 9th attempt is rejected before it
        // can land, so size never reaches the configured max in this scenario.
        let manager = QueueManager::new(10);
        for i in 0..8 {
            manager.enqueue(item(&format!("item-{i}"), Priority::Normal)).unwrap();
        }
        assert_eq!(manager.size(), 8);
        assert!(manager.get_metrics().backpressure_active);

        let err = manager.enqueue(item("overflow", Priority::Normal)).unwrap_err();
        assert!(err.is_backpressure() || err.is_queue_full());

        for _ in 0..5 {
            manager.dequeue().await.unwrap();
        }
        assert!(!manager.get_metrics().backpressure_active);
        manager.enqueue(item("fits-now", Priority::Normal)).unwrap();
    }

    #[tokio::test]
    async fn circuit_open_blocks_dequeue() {
        let manager = QueueManager::new(10);
        manager.configure_circuit_breaker(1, Duration::from_secs(60));
        manager.enqueue(item("a", Priority::Normal)).unwrap();
        manager.report_processing_failure();

        let err = manager.dequeue().await.unwrap_err();
        assert!(err.is_circuit_open());
    }

    #[tokio::test]
    async fn ttl_expired_items_never_dequeued() {
        let manager = QueueManager::new(10);
        let mut expiring = item("expiring", Priority::Normal).with_ttl(0.001);
        expiring.created_at = Utc::now() - chrono::Duration::seconds(5);
        manager.enqueue(expiring).unwrap();
        manager.enqueue(item("fresh", Priority::Normal)).unwrap();

        let popped = manager.dequeue().await.unwrap().unwrap();
        assert_eq!(popped.id, "fresh");
        assert_eq!(manager.get_expired_items().len(), 1);
    }

    #[tokio::test]
    async fn dequeue_filtered_is_not_circuit_gated() {
        let manager = QueueManager::new(10);
        manager.configure_circuit_breaker(1, Duration::from_secs(60));
        manager.enqueue(item("a", Priority::Normal)).unwrap();
        manager.report_processing_failure();
        assert!(manager.dequeue().await.is_err());

        let found = manager.dequeue_filtered(|i| i.id == "a");
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn move_to_dead_letter_records_reason() {
        let manager = QueueManager::new(10);
        manager.move_to_dead_letter(item("a", Priority::Normal), "max retries exceeded");
        assert_eq!(manager.get_dead_letter_items().len(), 1);
        assert_eq!(manager.get_metrics().dead_letter_count, 1);
    }

    #[tokio::test]
    async fn partitioning_routes_by_modulo_and_preserves_intra_partition_order() {
        let manager = QueueManager::new(10);
        manager.enable_partitioning(2).unwrap();
        manager.enqueue(item("a", Priority::Normal).with_partition(0)).unwrap();
        manager.enqueue(item("b", Priority::Normal).with_partition(1)).unwrap();
        manager.enqueue(item("c", Priority::Normal).with_partition(0)).unwrap();

        let dist = manager.partition_distribution();
        assert_eq!(dist.get(&0), Some(&2));
        assert_eq!(dist.get(&1), Some(&1));
    }

    #[tokio::test]
    async fn save_then_restore_preserves_multiset_and_counters() {
        let dir = std::env::temp_dir().join(format!("qm-persist-test-{}", std::process::id()));
        let manager = QueueManager::new(10);
        manager.enable_persistence_at_path(&dir);
        manager.enqueue(item("a", Priority::High)).unwrap();
        manager.enqueue(item("b", Priority::Low)).unwrap();
        manager.dequeue().await.unwrap();
        manager.save_state().unwrap();

        let restored = QueueManager::new(10);
        restored.enable_persistence_at_path(&dir);
        restored.restore_state();

        assert_eq!(restored.size(), 1);
        assert_eq!(restored.get_metrics().total_enqueued, 2);
        assert_eq!(restored.get_metrics().total_dequeued, 1);
        let _ = std::fs::remove_file(&dir);
    }

    #[tokio::test]
    async fn enqueue_batch_short_circuits_on_first_rejection() {
        let manager = QueueManager::new(2);
        let items = vec![
            item("a", Priority::Normal),
            item("b", Priority::Normal),
            item("c", Priority::Normal),
        ];
        let (accepted, err) = manager.enqueue_batch(items);
        assert_eq!(accepted, 2);
        assert!(err.is_some());
    }

    #[tokio::test]
    async fn alert_thresholds_surface_active_alerts() {
        let manager = QueueManager::new(10);
        manager.set_alert_threshold(AlertMetric::Size, 2.0);
        manager.enqueue(item("a", Priority::Normal)).unwrap();
        manager.enqueue(item("b", Priority::Normal)).unwrap();
        let alerts = manager.get_active_alerts();
        assert_eq!(alerts.len(), 1);
    }
}
