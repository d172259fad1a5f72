//! Worker Pool (C11): warm pool, health checks, recycling, batch/timeout/retry.
//!
//! Each task runs on `tokio::task::spawn_blocking`, which gives CPU-bound user
//! code its own scheduling unit (a blocking-pool thread) without blocking the
//! cooperative event loop the queue manager and controller run on. A pleasant
//! side effect: `spawn_blocking`'s `JoinHandle` cannot be forced to stop
//! early, only detached from — exactly the "best effort, does not forcibly
//! kill the worker" semantics a timed-out submit requires.

use crate::error::CoreError;
use crate::retry_strategy::RetryStrategy;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::timeout::TimeoutPolicy;
use crate::worker_pool::health::{ProcessHealth, WorkerStatus};
use crate::worker_pool::shared::SharedRegistry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPoolConfigError {
    MinWorkersIsZero,
    MaxWorkersBelowMin,
    WarmPoolExceedsMax,
    ZeroMaxTasksPerWorker,
}

impl std::fmt::Display for WorkerPoolConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MinWorkersIsZero => write!(f, "min_workers must be at least 1"),
            Self::MaxWorkersBelowMin => write!(f, "max_workers must be >= min_workers"),
            Self::WarmPoolExceedsMax => write!(f, "warm_pool_size must be <= max_workers"),
            Self::ZeroMaxTasksPerWorker => write!(f, "max_tasks_per_worker must be at least 1"),
        }
    }
}
impl std::error::Error for WorkerPoolConfigError {}

#[derive(Debug, Clone, Copy, Default)]
pub struct PoolMetrics {
    pub total_tasks: u64,
    pub successful_tasks: u64,
    pub failed_tasks: u64,
    pub timeout_tasks: u64,
    pub retry_count: u64,
    pub avg_task_duration_secs: f64,
    pub worker_utilization: f64,
    pub active_workers: usize,
    pub warm_pool_size: usize,
}

struct MetricsInner {
    total_tasks: AtomicU64,
    successful_tasks: AtomicU64,
    failed_tasks: AtomicU64,
    timeout_tasks: AtomicU64,
    retry_count: AtomicU64,
    duration_total_millis: AtomicU64,
    duration_samples: AtomicU64,
}

impl Default for MetricsInner {
    fn default() -> Self {
        Self {
            total_tasks: AtomicU64::new(0),
            successful_tasks: AtomicU64::new(0),
            failed_tasks: AtomicU64::new(0),
            timeout_tasks: AtomicU64::new(0),
            retry_count: AtomicU64::new(0),
            duration_total_millis: AtomicU64::new(0),
            duration_samples: AtomicU64::new(0),
        }
    }
}

impl MetricsInner {
    fn record_duration(&self, elapsed: Duration) {
        self.duration_total_millis.fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
        self.duration_samples.fetch_add(1, Ordering::Relaxed);
    }

    fn avg_duration_secs(&self) -> f64 {
        let samples = self.duration_samples.load(Ordering::Relaxed);
        if samples == 0 {
            return 0.0;
        }
        let total_millis = self.duration_total_millis.load(Ordering::Relaxed);
        (total_millis as f64 / samples as f64) / 1000.0
    }
}

struct WorkerSlot {
    id: u64,
    task_count: AtomicU64,
    status: std::sync::Mutex<WorkerStatus>,
}

/// Tunables for [`WorkerPool`], set once via [`WorkerPoolBuilder`].
struct Config {
    min_workers: usize,
    max_workers: usize,
    warm_pool_size: usize,
    max_tasks_per_worker: u64,
    worker_timeout: Duration,
    health_check_interval: Duration,
    retry_enabled: bool,
    max_retries: usize,
    retry_strategy: RetryStrategy,
}

pub struct WorkerPoolBuilder {
    min_workers: usize,
    max_workers: usize,
    warm_pool_size: usize,
    max_tasks_per_worker: u64,
    worker_timeout: Duration,
    health_check_interval: Duration,
    retry_enabled: bool,
    max_retries: usize,
    retry_strategy: RetryStrategy,
}

impl WorkerPoolBuilder {
    pub fn new(min_workers: usize, max_workers: usize) -> Self {
        Self {
            min_workers,
            max_workers,
            warm_pool_size: min_workers,
            max_tasks_per_worker: 100,
            worker_timeout: Duration::from_secs(30),
            health_check_interval: Duration::from_secs(5),
            retry_enabled: false,
            max_retries: 3,
            retry_strategy: RetryStrategy::new(3, Duration::from_secs(1), 2.0, Duration::from_secs(10))
                .expect("default retry strategy is valid"),
        }
    }

    pub fn warm_pool_size(mut self, value: usize) -> Self {
        self.warm_pool_size = value;
        self
    }

    pub fn max_tasks_per_worker(mut self, value: u64) -> Self {
        self.max_tasks_per_worker = value;
        self
    }

    pub fn worker_timeout(mut self, value: Duration) -> Self {
        self.worker_timeout = value;
        self
    }

    pub fn health_check_interval(mut self, value: Duration) -> Self {
        self.health_check_interval = value;
        self
    }

    pub fn enable_retry(mut self, max_retries: usize) -> Self {
        self.retry_enabled = true;
        self.max_retries = max_retries;
        self
    }

    pub fn retry_strategy(mut self, value: RetryStrategy) -> Self {
        self.retry_strategy = value;
        self
    }

    pub fn build(self) -> Result<WorkerPool, WorkerPoolConfigError> {
        if self.min_workers == 0 {
            return Err(WorkerPoolConfigError::MinWorkersIsZero);
        }
        if self.max_workers < self.min_workers {
            return Err(WorkerPoolConfigError::MaxWorkersBelowMin);
        }
        if self.warm_pool_size > self.max_workers {
            return Err(WorkerPoolConfigError::WarmPoolExceedsMax);
        }
        if self.max_tasks_per_worker == 0 {
            return Err(WorkerPoolConfigError::ZeroMaxTasksPerWorker);
        }

        Ok(WorkerPool {
            config: Config {
                min_workers: self.min_workers,
                max_workers: self.max_workers,
                warm_pool_size: self.warm_pool_size,
                max_tasks_per_worker: self.max_tasks_per_worker,
                worker_timeout: self.worker_timeout,
                health_check_interval: self.health_check_interval,
                retry_enabled: self.retry_enabled,
                max_retries: self.max_retries,
                retry_strategy: self.retry_strategy,
            },
            semaphore: Arc::new(Semaphore::new(self.min_workers)),
            current_capacity: AtomicUsize::new(self.min_workers),
            next_worker_id: AtomicU64::new(0),
            workers: DashMap::new(),
            metrics: MetricsInner::default(),
            shared: SharedRegistry::new(),
            shutdown: AtomicBool::new(false),
            health_stop: Notify::new(),
            sleeper: Arc::new(TokioSleeper),
        })
    }
}

/// Warm pool of task slots fanning user work out onto `spawn_blocking` threads.
pub struct WorkerPool {
    config: Config,
    semaphore: Arc<Semaphore>,
    current_capacity: AtomicUsize,
    next_worker_id: AtomicU64,
    workers: DashMap<u64, WorkerSlot>,
    metrics: MetricsInner,
    shared: SharedRegistry,
    shutdown: AtomicBool,
    health_stop: Notify,
    sleeper: Arc<dyn Sleeper>,
}

impl WorkerPool {
    pub fn builder(min_workers: usize, max_workers: usize) -> WorkerPoolBuilder {
        WorkerPoolBuilder::new(min_workers, max_workers)
    }

    pub fn shared_registry(&self) -> &SharedRegistry {
        &self.shared
    }

    /// Eagerly creates `warm_pool_size` worker slots so the first submissions
    /// don't pay the cost of slot bookkeeping on the hot path.
    pub fn initialize_warm_pool(&self) {
        for _ in 0..self.config.warm_pool_size {
            self.spawn_slot();
        }
        tracing::info!(size = self.config.warm_pool_size, "worker pool warm pool initialized");
    }

    fn spawn_slot(&self) -> u64 {
        let id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        self.workers.insert(
            id,
            WorkerSlot { id, task_count: AtomicU64::new(0), status: std::sync::Mutex::new(WorkerStatus::Healthy) },
        );
        id
    }

    /// Picks a warm slot with spare capacity, recycling one whose task count
    /// hit `max_tasks_per_worker` and lazily spawning a replacement.
    fn acquire_slot(&self) -> u64 {
        if let Some(entry) = self.workers.iter().find(|e| e.task_count.load(Ordering::Relaxed) < self.config.max_tasks_per_worker) {
            return *entry.key();
        }
        self.spawn_slot()
    }

    fn record_task_on_slot(&self, slot_id: u64) {
        if let Some(slot) = self.workers.get(&slot_id) {
            let count = slot.task_count.fetch_add(1, Ordering::Relaxed) + 1;
            if count >= self.config.max_tasks_per_worker {
                *slot.status.lock().expect("worker slot status mutex poisoned") = WorkerStatus::Dead;
                drop(slot);
                self.workers.remove(&slot_id);
                tracing::debug!(slot_id, "worker slot recycled after reaching max_tasks_per_worker");
            }
        }
    }

    /// Acquires one admission permit without running anything, for callers
    /// (the orchestrator) that drive their own async work under the pool's
    /// capacity instead of a `spawn_blocking` closure — e.g. I/O-bound work
    /// that calls out through [`crate::connection::ConnectionPoolOptimizer`].
    pub async fn acquire_capacity(self: &Arc<Self>) -> tokio::sync::OwnedSemaphorePermit {
        self.semaphore.clone().acquire_owned().await.expect("worker pool semaphore never closed")
    }

    pub fn current_worker_count(&self) -> usize {
        self.current_capacity.load(Ordering::Acquire)
    }

    pub fn min_workers(&self) -> usize {
        self.config.min_workers
    }

    pub fn max_workers(&self) -> usize {
        self.config.max_workers
    }

    /// Commanded by the [`crate::concurrency::ConcurrencyController`] via its
    /// [`crate::concurrency::ScalingDecision`]. Grows or shrinks the admission
    /// semaphore; an in-flight task holding a permit is unaffected by a shrink,
    /// so the pool converges to the new size over one or more ticks — no
    /// guarantee of instant convergence.
    pub fn set_worker_count(&self, n: usize) {
        let n = n.clamp(self.config.min_workers, self.config.max_workers);
        let current = self.current_capacity.swap(n, Ordering::AcqRel);
        match n.cmp(&current) {
            std::cmp::Ordering::Greater => self.semaphore.add_permits(n - current),
            std::cmp::Ordering::Less => self.semaphore.forget_permits(current - n),
            std::cmp::Ordering::Equal => {}
        }
    }

    /// Runs `f` on a blocking-pool thread under an admission permit, retrying
    /// per the configured [`RetryStrategy`] if retry is enabled.
    pub async fn submit_sync<F, T, E>(&self, f: F) -> Result<T, CoreError<E>>
    where
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
        T: Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let _permit = self.semaphore.acquire().await.expect("worker pool semaphore never closed");
        let slot_id = self.acquire_slot();
        self.metrics.total_tasks.fetch_add(1, Ordering::Relaxed);

        let f = Arc::new(f);
        let mut attempt = 1usize;
        let max_attempts = if self.config.retry_enabled { self.config.max_retries + 1 } else { 1 };

        loop {
            let start = tokio::time::Instant::now();
            let task_fn = f.clone();
            let result = tokio::task::spawn_blocking(move || task_fn()).await;
            let elapsed = start.elapsed();

            match result {
                Ok(Ok(value)) => {
                    self.metrics.record_duration(elapsed);
                    self.metrics.successful_tasks.fetch_add(1, Ordering::Relaxed);
                    self.record_task_on_slot(slot_id);
                    return Ok(value);
                }
                Ok(Err(err)) => {
                    if attempt < max_attempts {
                        self.metrics.retry_count.fetch_add(1, Ordering::Relaxed);
                        let delay = self.config.retry_strategy.delay_for_attempt(attempt);
                        self.sleeper.sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    self.metrics.failed_tasks.fetch_add(1, Ordering::Relaxed);
                    self.record_task_on_slot(slot_id);
                    return Err(CoreError::Inner(err));
                }
                Err(join_err) => {
                    self.metrics.failed_tasks.fetch_add(1, Ordering::Relaxed);
                    self.record_task_on_slot(slot_id);
                    tracing::error!(error = %join_err, "worker task panicked");
                    return Err(CoreError::ValidationError { message: format!("worker task panicked: {join_err}") });
                }
            }
        }
    }

    /// Spawns `f` without awaiting it, returning a handle the caller can await later.
    pub fn submit_async<F, T, E>(self: &Arc<Self>, f: F) -> JoinHandle<Result<T, CoreError<E>>>
    where
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
        T: Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let pool = self.clone();
        tokio::spawn(async move { pool.submit_sync(f).await })
    }

    /// Awaits `f` with a deadline. On timeout the in-flight `spawn_blocking`
    /// thread is detached, not killed (best effort).
    pub async fn submit_with_timeout<F, T, E>(&self, f: F, timeout: Duration) -> Result<T, CoreError<E>>
    where
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
        T: Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let policy = TimeoutPolicy::new(timeout).unwrap_or_else(|_| {
            TimeoutPolicy::new_with_max(self.config.worker_timeout, self.config.worker_timeout)
                .expect("worker_timeout is a valid duration")
        });
        let result = policy.execute(|| self.submit_sync(f)).await;
        if let Err(CoreError::Timeout { .. }) = &result {
            self.metrics.timeout_tasks.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    /// Fan-out submission preserving input order in the output.
    pub async fn submit_batch<F, T, E>(self: &Arc<Self>, tasks: Vec<F>) -> Vec<Result<T, CoreError<E>>>
    where
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
        T: Send + 'static,
        E: std::error::Error + Send + Sync + 'static,
    {
        let handles: Vec<_> = tasks.into_iter().map(|f| self.submit_async(f)).collect();
        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(join_err) => results.push(Err(CoreError::ValidationError {
                    message: format!("batch task panicked: {join_err}"),
                })),
            }
        }
        results
    }

    pub fn get_worker_health(&self) -> HashMap<u64, ProcessHealth> {
        self.workers
            .iter()
            .map(|entry| {
                let status = *entry.status.lock().expect("worker slot status mutex poisoned");
                (
                    *entry.key(),
                    ProcessHealth {
                        worker_id: entry.id,
                        status,
                        cpu_percent: 0.0,
                        memory_mb: 0.0,
                        task_count: entry.task_count.load(Ordering::Relaxed),
                        last_health_check: chrono::Utc::now(),
                    },
                )
            })
            .collect()
    }

    /// Samples pool-wide resource usage into every live slot's health record
    /// at `health_check_interval`, until [`WorkerPool::stop_health_check`] fires.
    pub fn spawn_health_check_loop(self: &Arc<Self>, monitor: Arc<std::sync::Mutex<crate::resource_monitor::ResourceMonitor>>) -> JoinHandle<()> {
        let pool = self.clone();
        let interval = self.config.health_check_interval;
        tokio::spawn(async move {
            loop {
                let stop = std::pin::pin!(pool.health_stop.notified());
                let tick = tokio::time::sleep(interval);
                tokio::select! {
                    _ = stop => break,
                    _ = tick => {
                        let snapshot = monitor.lock().expect("resource monitor mutex poisoned").snapshot();
                        for entry in pool.workers.iter() {
                            let mut status = entry.status.lock().expect("worker slot status mutex poisoned");
                            if *status != WorkerStatus::Dead {
                                *status = WorkerStatus::Healthy;
                            }
                        }
                        tracing::trace!(cpu = snapshot.cpu_percent, mem = snapshot.memory_percent, "worker pool health check tick");
                    }
                }
            }
        })
    }

    pub fn stop_health_check(&self) {
        self.health_stop.notify_waiters();
    }

    pub fn get_metrics(&self) -> PoolMetrics {
        let active_workers = self.current_worker_count();
        let warm_pool_size = self.workers.len();
        PoolMetrics {
            total_tasks: self.metrics.total_tasks.load(Ordering::Relaxed),
            successful_tasks: self.metrics.successful_tasks.load(Ordering::Relaxed),
            failed_tasks: self.metrics.failed_tasks.load(Ordering::Relaxed),
            timeout_tasks: self.metrics.timeout_tasks.load(Ordering::Relaxed),
            retry_count: self.metrics.retry_count.load(Ordering::Relaxed),
            avg_task_duration_secs: self.metrics.avg_duration_secs(),
            worker_utilization: if self.config.max_workers == 0 {
                0.0
            } else {
                active_workers as f64 / self.config.max_workers as f64
            },
            active_workers,
            warm_pool_size,
        }
    }

    /// Waits up to `timeout` for currently admitted tasks to drain (all
    /// permits returned), then marks the pool shut down regardless. In-flight
    /// `spawn_blocking` threads that haven't finished are detached, never
    /// force-killed — Rust has no safe facility for that.
    pub async fn shutdown(&self, wait: bool, timeout: Duration) {
        self.shutdown.store(true, Ordering::Release);
        self.stop_health_check();

        if wait {
            let capacity = self.current_worker_count();
            let drain = self.semaphore.acquire_many(capacity as u32);
            if tokio::time::timeout(timeout, drain).await.is_err() {
                tracing::warn!("worker pool shutdown timed out waiting for in-flight tasks to drain");
            }
        }
        self.workers.clear();
        tracing::info!("worker pool shutdown complete");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }
}
