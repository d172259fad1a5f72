//! Adaptive Concurrency Controller (C12): the primary up/down scaling algorithm.
//!
//! The controller only *recommends* and *records* scaling moves; it never
//! touches the worker pool directly — [`super::super::orchestrator`] reads
//! [`ScalingDecision`] and calls into the pool.

use super::predictor::WorkloadPredictor;
use crate::clock::{Clock, MonotonicClock};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConcurrencyMetrics {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub active_workers: usize,
    pub queue_size: usize,
    pub avg_processing_time_secs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingStrategy {
    Aggressive,
    Balanced,
    Conservative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalingDirection {
    Up,
    Down,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingDecision {
    pub should_scale: bool,
    pub direction: ScalingDirection,
    pub new_worker_count: usize,
    pub reason: String,
}

impl ScalingDecision {
    fn stable(workers: usize, reason: &str) -> Self {
        Self { should_scale: false, direction: ScalingDirection::Stable, new_worker_count: workers, reason: reason.into() }
    }
}

#[derive(Debug, Clone)]
pub struct ScalingHistoryEntry {
    pub direction: ScalingDirection,
    pub new_count: usize,
    pub reason: String,
    pub at_millis: u64,
}

const DEFAULT_TARGET_CPU: f64 = 70.0;
const DEFAULT_TARGET_MEMORY: f64 = 80.0;
const DEFAULT_QUEUE_THRESHOLD: usize = 50;
const DEFAULT_TARGET_PROCESSING_TIME_SECS: f64 = 2.0;
const DEFAULT_COOLDOWN_SECS: u64 = 30;
const DEFAULT_ADJUSTMENT_INTERVAL_SECS: u64 = 10;
const SCALING_HISTORY_LEN: usize = 1000;

/// Tunables, set once at construction via [`ConcurrencyControllerBuilder`].
struct Config {
    min_workers: usize,
    max_workers: usize,
    target_cpu_percent: f64,
    target_memory_percent: f64,
    queue_threshold: usize,
    target_processing_time_secs: f64,
    cooldown: Duration,
    strategy: ScalingStrategy,
    adjustment_interval: Duration,
}

pub struct ConcurrencyController {
    config: Config,
    current_workers: AtomicUsize,
    last_scaling_millis: AtomicU64,
    has_scaled_once: AtomicBool,
    scaling_in_progress: Mutex<()>,
    scaling_history: Mutex<Vec<ScalingHistoryEntry>>,
    predictor: Mutex<WorkloadPredictor>,
    clock: Arc<dyn Clock>,
}

pub struct ConcurrencyControllerBuilder {
    min_workers: usize,
    max_workers: usize,
    target_cpu_percent: f64,
    target_memory_percent: f64,
    queue_threshold: usize,
    target_processing_time_secs: f64,
    cooldown: Duration,
    strategy: ScalingStrategy,
    adjustment_interval: Duration,
    clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerConfigError {
    MinWorkersIsZero,
    MaxWorkersBelowMin,
}

impl std::fmt::Display for ControllerConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MinWorkersIsZero => write!(f, "min_workers must be at least 1"),
            Self::MaxWorkersBelowMin => write!(f, "max_workers must be >= min_workers"),
        }
    }
}
impl std::error::Error for ControllerConfigError {}

impl ConcurrencyControllerBuilder {
    pub fn new(min_workers: usize, max_workers: usize) -> Self {
        Self {
            min_workers,
            max_workers,
            target_cpu_percent: DEFAULT_TARGET_CPU,
            target_memory_percent: DEFAULT_TARGET_MEMORY,
            queue_threshold: DEFAULT_QUEUE_THRESHOLD,
            target_processing_time_secs: DEFAULT_TARGET_PROCESSING_TIME_SECS,
            cooldown: Duration::from_secs(DEFAULT_COOLDOWN_SECS),
            strategy: ScalingStrategy::Balanced,
            adjustment_interval: Duration::from_secs(DEFAULT_ADJUSTMENT_INTERVAL_SECS),
            clock: Arc::new(MonotonicClock::default()),
        }
    }

    pub fn target_cpu_percent(mut self, value: f64) -> Self {
        self.target_cpu_percent = value;
        self
    }

    pub fn target_memory_percent(mut self, value: f64) -> Self {
        self.target_memory_percent = value;
        self
    }

    pub fn queue_threshold(mut self, value: usize) -> Self {
        self.queue_threshold = value;
        self
    }

    pub fn target_processing_time_secs(mut self, value: f64) -> Self {
        self.target_processing_time_secs = value;
        self
    }

    pub fn cooldown(mut self, value: Duration) -> Self {
        self.cooldown = value;
        self
    }

    pub fn strategy(mut self, value: ScalingStrategy) -> Self {
        self.strategy = value;
        self
    }

    pub fn adjustment_interval(mut self, value: Duration) -> Self {
        self.adjustment_interval = value;
        self
    }

    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn build(self) -> Result<ConcurrencyController, ControllerConfigError> {
        if self.min_workers == 0 {
            return Err(ControllerConfigError::MinWorkersIsZero);
        }
        if self.max_workers < self.min_workers {
            return Err(ControllerConfigError::MaxWorkersBelowMin);
        }
        Ok(ConcurrencyController {
            config: Config {
                min_workers: self.min_workers,
                max_workers: self.max_workers,
                target_cpu_percent: self.target_cpu_percent,
                target_memory_percent: self.target_memory_percent,
                queue_threshold: self.queue_threshold,
                target_processing_time_secs: self.target_processing_time_secs,
                cooldown: self.cooldown,
                strategy: self.strategy,
                adjustment_interval: self.adjustment_interval,
            },
            current_workers: AtomicUsize::new(self.min_workers),
            last_scaling_millis: AtomicU64::new(0),
            has_scaled_once: AtomicBool::new(false),
            scaling_in_progress: Mutex::new(()),
            scaling_history: Mutex::new(Vec::new()),
            predictor: Mutex::new(WorkloadPredictor::new()),
            clock: self.clock,
        })
    }
}

impl ConcurrencyController {
    pub fn current_workers(&self) -> usize {
        self.current_workers.load(Ordering::Acquire)
    }

    pub fn min_workers(&self) -> usize {
        self.config.min_workers
    }

    pub fn max_workers(&self) -> usize {
        self.config.max_workers
    }

    pub fn adjustment_interval(&self) -> Duration {
        self.config.adjustment_interval
    }

    fn in_cooldown(&self) -> bool {
        if !self.has_scaled_once.load(Ordering::Acquire) {
            return false;
        }
        let last = self.last_scaling_millis.load(Ordering::Acquire);
        let elapsed = self.clock.now_millis().saturating_sub(last);
        elapsed < self.config.cooldown.as_millis() as u64
    }

    /// Evaluates scale-up triggers: CPU, memory, queue depth, processing time.
    pub fn should_scale_up(&self, metrics: ConcurrencyMetrics) -> ScalingDecision {
        let current = self.current_workers();
        if current >= self.config.max_workers {
            return ScalingDecision::stable(current, "already at max workers");
        }
        if self.in_cooldown() {
            return ScalingDecision::stable(current, "in cooldown period");
        }

        let mut reasons = Vec::new();
        if metrics.cpu_percent > self.config.target_cpu_percent + 10.0 {
            reasons.push("high CPU usage");
        }
        if metrics.memory_percent > self.config.target_memory_percent + 5.0 {
            reasons.push("high memory usage");
        }
        if metrics.queue_size > self.config.queue_threshold {
            reasons.push("high queue size");
        }
        if metrics.avg_processing_time_secs > self.config.target_processing_time_secs {
            reasons.push("high processing time");
        }

        if reasons.is_empty() {
            return ScalingDecision::stable(current, "metrics within target");
        }

        let increment = match self.config.strategy {
            ScalingStrategy::Aggressive => 2.min(self.config.max_workers - current),
            ScalingStrategy::Conservative => 1,
            ScalingStrategy::Balanced => {
                if reasons.len() == 1 {
                    1
                } else {
                    2
                }
            }
        };

        let new_count = (current + increment).min(self.config.max_workers);
        ScalingDecision {
            should_scale: true,
            direction: ScalingDirection::Up,
            new_worker_count: new_count,
            reason: reasons.join(", "),
        }
    }

    /// Evaluates scale-down: requires CPU, memory, *and* queue depth all
    /// significantly under target simultaneously.
    pub fn should_scale_down(&self, metrics: ConcurrencyMetrics) -> ScalingDecision {
        let current = self.current_workers();
        if current <= self.config.min_workers {
            return ScalingDecision::stable(current, "already at min workers");
        }
        if self.in_cooldown() {
            return ScalingDecision::stable(current, "in cooldown period");
        }

        let underutilized = metrics.cpu_percent < self.config.target_cpu_percent - 20.0
            && metrics.memory_percent < self.config.target_memory_percent - 20.0
            && (metrics.queue_size as f64) < self.config.queue_threshold as f64 / 2.0;

        if underutilized {
            let new_count = current.saturating_sub(1).max(self.config.min_workers);
            return ScalingDecision {
                should_scale: true,
                direction: ScalingDirection::Down,
                new_worker_count: new_count,
                reason: "low resource utilization".into(),
            };
        }

        ScalingDecision::stable(current, "metrics within target")
    }

    /// Applies a scaling decision. Uses a non-blocking try-lock, matching the
    /// source's `threading.Lock.acquire(blocking=False)` — a scaling
    /// operation already in flight causes this call to return `false` rather
    /// than queue behind it.
    pub fn apply_scaling_decision(&self, decision: &ScalingDecision, metrics: ConcurrencyMetrics) -> bool {
        if !decision.should_scale {
            return false;
        }
        let Ok(_guard) = self.scaling_in_progress.try_lock() else {
            return false;
        };

        self.current_workers.store(decision.new_worker_count, Ordering::Release);
        let now = self.clock.now_millis();
        self.last_scaling_millis.store(now, Ordering::Release);
        self.has_scaled_once.store(true, Ordering::Release);

        let mut history = self.scaling_history.lock().expect("scaling history mutex poisoned");
        if history.len() >= SCALING_HISTORY_LEN {
            history.remove(0);
        }
        history.push(ScalingHistoryEntry {
            direction: decision.direction,
            new_count: decision.new_worker_count,
            reason: decision.reason.clone(),
            at_millis: now,
        });
        drop(history);

        let mut predictor = self.predictor.lock().expect("predictor mutex poisoned");
        let direction_label = match decision.direction {
            ScalingDirection::Up => "up",
            ScalingDirection::Down => "down",
            ScalingDirection::Stable => "stable",
        };
        predictor.add_observation(metrics, direction_label);

        tracing::info!(
            direction = ?decision.direction,
            workers = decision.new_worker_count,
            reason = %decision.reason,
            "scaled worker pool"
        );
        true
    }

    /// Advisory prediction; never drives scaling on its own.
    pub fn predict_optimal_workers(&self, metrics: ConcurrencyMetrics) -> usize {
        let predictor = self.predictor.lock().expect("predictor mutex poisoned");
        predictor.predict_optimal_workers(metrics, self.config.min_workers, self.config.max_workers)
    }

    /// Most recent scaling moves, newest first, capped at `limit`.
    pub fn scaling_history(&self, limit: usize) -> Vec<ScalingHistoryEntry> {
        let history = self.scaling_history.lock().expect("scaling history mutex poisoned");
        history.iter().rev().take(limit).cloned().collect()
    }

    pub fn reset(&self) {
        self.current_workers.store(self.config.min_workers, Ordering::Release);
        self.has_scaled_once.store(false, Ordering::Release);
        self.last_scaling_millis.store(0, Ordering::Release);
        self.scaling_history.lock().expect("scaling history mutex poisoned").clear();
        *self.predictor.lock().expect("predictor mutex poisoned") = WorkloadPredictor::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64 as TestAtomicU64;

    #[derive(Debug, Clone)]
    struct ManualClock {
        now: Arc<TestAtomicU64>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self { now: Arc::new(TestAtomicU64::new(0)) }
        }
        fn advance(&self, millis: u64) {
            self.now.fetch_add(millis, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_millis(&self) -> u64 {
            self.now.load(Ordering::SeqCst)
        }
    }

    fn metrics(cpu: f64, mem: f64, queue: usize, proc_time: f64) -> ConcurrencyMetrics {
        ConcurrencyMetrics {
            cpu_percent: cpu,
            memory_percent: mem,
            active_workers: 4,
            queue_size: queue,
            avg_processing_time_secs: proc_time,
        }
    }

    #[test]
    fn scales_up_on_high_cpu() {
        let controller = ConcurrencyControllerBuilder::new(1, 10).build().unwrap();
        let decision = controller.should_scale_up(metrics(85.0, 50.0, 0, 1.0));
        assert!(decision.should_scale);
        assert_eq!(decision.direction, ScalingDirection::Up);
    }

    #[test]
    fn balanced_strategy_scales_by_two_with_multiple_triggers() {
        let controller = ConcurrencyControllerBuilder::new(1, 10).build().unwrap();
        controller.current_workers.store(3, Ordering::Release);
        let decision = controller.should_scale_up(metrics(90.0, 90.0, 100, 5.0));
        assert_eq!(decision.new_worker_count, 5);
    }

    #[test]
    fn refuses_to_scale_up_past_max() {
        let controller = ConcurrencyControllerBuilder::new(1, 2).build().unwrap();
        controller.current_workers.store(2, Ordering::Release);
        let decision = controller.should_scale_up(metrics(99.0, 99.0, 1000, 10.0));
        assert!(!decision.should_scale);
    }

    #[test]
    fn cooldown_blocks_repeated_scaling() {
        let clock = ManualClock::new();
        let controller = ConcurrencyControllerBuilder::new(1, 10).with_clock(clock.clone()).build().unwrap();
        let up = controller.should_scale_up(metrics(90.0, 50.0, 0, 1.0));
        assert!(controller.apply_scaling_decision(&up, metrics(90.0, 50.0, 0, 1.0)));

        let blocked = controller.should_scale_up(metrics(95.0, 50.0, 0, 1.0));
        assert!(!blocked.should_scale);

        clock.advance(31_000);
        let allowed = controller.should_scale_up(metrics(95.0, 50.0, 0, 1.0));
        assert!(allowed.should_scale);
    }

    #[test]
    fn scale_down_requires_all_three_signals_low() {
        let controller = ConcurrencyControllerBuilder::new(1, 10).build().unwrap();
        controller.current_workers.store(5, Ordering::Release);
        let partial = controller.should_scale_down(metrics(20.0, 90.0, 5, 0.1));
        assert!(!partial.should_scale);

        let full = controller.should_scale_down(metrics(20.0, 30.0, 5, 0.1));
        assert!(full.should_scale);
        assert_eq!(full.new_worker_count, 4);
    }

    #[test]
    fn apply_scaling_decision_is_noop_for_stable_decision() {
        let controller = ConcurrencyControllerBuilder::new(1, 10).build().unwrap();
        let stable = ScalingDecision::stable(1, "metrics within target");
        assert!(!controller.apply_scaling_decision(&stable, metrics(50.0, 50.0, 0, 1.0)));
    }

    #[test]
    fn scaling_history_records_most_recent_first() {
        let controller = ConcurrencyControllerBuilder::new(1, 10).build().unwrap();
        let up = controller.should_scale_up(metrics(90.0, 50.0, 0, 1.0));
        controller.apply_scaling_decision(&up, metrics(90.0, 50.0, 0, 1.0));
        let history = controller.scaling_history(10);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].direction, ScalingDirection::Up);
    }

    #[test]
    fn reset_restores_initial_state() {
        let controller = ConcurrencyControllerBuilder::new(2, 10).build().unwrap();
        let up = controller.should_scale_up(metrics(90.0, 50.0, 0, 1.0));
        controller.apply_scaling_decision(&up, metrics(90.0, 50.0, 0, 1.0));
        controller.reset();
        assert_eq!(controller.current_workers(), 2);
        assert!(controller.scaling_history(10).is_empty());
    }

    #[test]
    fn rejects_invalid_bounds() {
        assert!(ConcurrencyControllerBuilder::new(0, 10).build().is_err());
        assert!(ConcurrencyControllerBuilder::new(5, 2).build().is_err());
    }
}
