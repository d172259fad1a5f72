//! Orchestrator (C13): wires the Queue Manager, Concurrency Controller,
//! Worker Pool and Connection Pool Optimizer into the end-to-end flow:
//! producer enqueues onto the
//! queue; the auto-adjust loop observes depth and resource pressure and
//! sizes the worker pool; workers dequeue and run user work against the
//! connection optimizer; failures feed the circuit breaker and retry path.
//!
//! None of the four components reaches for a process-wide singleton —
//! [`Registry`] is the explicit value an embedder constructs once and hands
//! to [`Orchestrator::new`], the idiomatic-Rust stand-in for the
//! module-level globals a dynamically-typed original might reach for.

use crate::concurrency::{ConcurrencyController, ConcurrencyMetrics};
use crate::connection::{ConnectionPoolOptimizer, Transport};
use crate::error::CoreError;
use crate::queue::manager::{QueueError, QueueManager};
use crate::queue::QueueItem;
use crate::resource_monitor::ResourceMonitor;
use crate::worker_pool::WorkerPool;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Notify;

/// Converts the queue manager's `E = Infallible` error into the caller's `E`.
/// `Infallible` is uninhabited, so the `Inner`/`MaxRetriesExceeded` arms are
/// unreachable by construction — the queue manager never produces them.
fn widen_queue_error<E>(err: QueueError) -> CoreError<E> {
    match err {
        CoreError::BackpressureActive => CoreError::BackpressureActive,
        CoreError::QueueFull { size, max_size } => CoreError::QueueFull { size, max_size },
        CoreError::CircuitOpen { failure_count, open_for } => CoreError::CircuitOpen { failure_count, open_for },
        CoreError::RateLimitExceeded { retry_after } => CoreError::RateLimitExceeded { retry_after },
        CoreError::Timeout { elapsed, timeout } => CoreError::Timeout { elapsed, timeout },
        CoreError::MemoryLimit { limit_mb } => CoreError::MemoryLimit { limit_mb },
        CoreError::ItemExpired { item_id } => CoreError::ItemExpired { item_id },
        CoreError::ValidationError { message } => CoreError::ValidationError { message },
        CoreError::MaxRetriesExceeded { .. } => unreachable!("queue manager never exhausts retries itself"),
        CoreError::Inner(never) => match never {},
    }
}

/// The four wired components, constructed once and owned by the caller.
/// No component here reaches for a module-level static.
#[derive(Clone)]
pub struct Registry {
    pub queue: Arc<QueueManager>,
    pub controller: Arc<ConcurrencyController>,
    pub workers: Arc<WorkerPool>,
    pub resource_monitor: Arc<std::sync::Mutex<ResourceMonitor>>,
}

impl Registry {
    pub fn new(queue: Arc<QueueManager>, controller: Arc<ConcurrencyController>, workers: Arc<WorkerPool>) -> Self {
        Self { queue, controller, workers, resource_monitor: Arc::new(std::sync::Mutex::new(ResourceMonitor::new())) }
    }
}

/// Wires C10 (Queue Manager) <-> C12 (Concurrency Controller) <-> C11 (Worker
/// Pool) <-> C4 (Connection Pool Optimizer).
pub struct Orchestrator<T: Transport> {
    registry: Registry,
    optimizer: Arc<ConnectionPoolOptimizer<T>>,
    auto_adjust_stop: Notify,
}

impl<T: Transport> Orchestrator<T> {
    pub fn new(registry: Registry, optimizer: Arc<ConnectionPoolOptimizer<T>>) -> Self {
        Self { registry, optimizer, auto_adjust_stop: Notify::new() }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn optimizer(&self) -> &Arc<ConnectionPoolOptimizer<T>> {
        &self.optimizer
    }

    /// Dequeues one item (subject to C8's circuit gate, rate pacing, and TTL
    /// filtering) and runs `work` against it under one unit of the worker
    /// pool's admission capacity. `work` receives a handle to the connection
    /// optimizer for any upstream HTTP calls it needs to make.
    ///
    /// On success the circuit breaker is told. On failure the item is
    /// re-enqueued (preserving `created_at`) if retries remain, or moved to
    /// the dead-letter queue on exhaustion; either way the circuit breaker is
    /// told about the failure.
    pub async fn process_one<F, Fut, R, E>(&self, work: F) -> Result<Option<R>, CoreError<E>>
    where
        F: FnOnce(QueueItem, Arc<ConnectionPoolOptimizer<T>>) -> Fut,
        Fut: Future<Output = Result<R, E>>,
        E: std::fmt::Display,
    {
        let item = self.registry.queue.dequeue().await.map_err(widen_queue_error)?;
        let Some(item) = item else { return Ok(None) };

        let _permit = self.registry.workers.acquire_capacity().await;

        match work(item.clone(), self.optimizer.clone()).await {
            Ok(value) => {
                self.registry.queue.circuit_breaker_handle().record_success();
                Ok(Some(value))
            }
            Err(err) => {
                self.registry.queue.report_processing_failure();
                if item.can_retry() {
                    let retried = item.incremented_for_retry();
                    if let Err(requeue_err) = self.registry.queue.enqueue(retried.clone()) {
                        tracing::warn!(error = %requeue_err, item_id = %retried.id, "failed to re-enqueue after processing failure");
                        self.registry.queue.move_to_dead_letter(retried, requeue_err.to_string());
                    }
                } else {
                    self.registry.queue.move_to_dead_letter(item, err.to_string());
                }
                Err(CoreError::Inner(err))
            }
        }
    }

    /// One tick of the adaptive scaling loop: samples resources + queue
    /// depth, asks the controller whether to scale, and if so commands the
    /// worker pool's new size. Scale-up is evaluated before scale-down,
    /// matching the source's precedence.
    pub fn tick_auto_adjust(&self) {
        let snapshot = self.registry.resource_monitor.lock().expect("resource monitor mutex poisoned").snapshot();
        let queue_metrics = self.registry.queue.get_metrics();
        let pool_metrics = self.registry.workers.get_metrics();

        let metrics = ConcurrencyMetrics {
            cpu_percent: snapshot.cpu_percent,
            memory_percent: snapshot.memory_percent,
            active_workers: self.registry.controller.current_workers(),
            queue_size: queue_metrics.size,
            avg_processing_time_secs: pool_metrics.avg_task_duration_secs,
        };

        let up = self.registry.controller.should_scale_up(metrics);
        if up.should_scale {
            self.registry.controller.apply_scaling_decision(&up, metrics);
            self.registry.workers.set_worker_count(up.new_worker_count);
            return;
        }

        let down = self.registry.controller.should_scale_down(metrics);
        if down.should_scale {
            self.registry.controller.apply_scaling_decision(&down, metrics);
            self.registry.workers.set_worker_count(down.new_worker_count);
        }
    }

    /// Runs [`Self::tick_auto_adjust`] every `controller.adjustment_interval()`
    /// until [`Self::stop_auto_adjust`] fires. Responds to the stop signal
    /// within one interval.
    pub async fn run_auto_adjust_loop(self: &Arc<Self>) {
        let interval = self.registry.controller.adjustment_interval();
        loop {
            let stop = std::pin::pin!(self.auto_adjust_stop.notified());
            let tick = tokio::time::sleep(interval);
            tokio::select! {
                _ = stop => break,
                _ = tick => self.tick_auto_adjust(),
            }
        }
    }

    pub fn stop_auto_adjust(&self) {
        self.auto_adjust_stop.notify_waiters();
    }
}
