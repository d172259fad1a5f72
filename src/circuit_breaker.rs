//! Two-state circuit breaker gating queue dequeue operations.
//!
//! Unlike a request-wrapping resilience circuit breaker, this one is a gate checked
//! before a privileged operation (`QueueManager::dequeue`) and fed failure/success
//! reports from the caller's own processing outcome — it never executes anything
//! itself. Only two states exist: `Closed` and `Open`. There is no half-open probing
//! state; the first `can_proceed()` call after `recovery_timeout` has elapsed closes
//! the breaker and resets the failure count in one step.

use crate::clock::{Clock, MonotonicClock};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
}

struct State {
    open: AtomicBool,
    failure_count: AtomicUsize,
    last_failure_millis: AtomicU64,
}

/// Gates dequeue on repeated processing failures reported via [`CircuitBreaker::record_failure`].
#[derive(Clone)]
pub struct CircuitBreaker {
    state: Arc<State>,
    failure_threshold: usize,
    recovery_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: usize, recovery_timeout: Duration) -> Self {
        Self {
            state: Arc::new(State {
                open: AtomicBool::new(false),
                failure_count: AtomicUsize::new(0),
                last_failure_millis: AtomicU64::new(0),
            }),
            failure_threshold,
            recovery_timeout,
            clock: Arc::new(MonotonicClock::default()),
        }
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Whether a dequeue may proceed. Auto-closes the breaker and resets the
    /// failure count once `recovery_timeout` has elapsed since the last failure.
    pub fn can_proceed(&self) -> bool {
        if !self.state.open.load(Ordering::Acquire) {
            return true;
        }

        let last_failure = self.state.last_failure_millis.load(Ordering::Acquire);
        let elapsed = self.clock.now_millis().saturating_sub(last_failure);

        if elapsed > self.recovery_timeout.as_millis() as u64 {
            self.state.open.store(false, Ordering::Release);
            self.state.failure_count.store(0, Ordering::Release);
            tracing::info!("circuit breaker recovered, closing");
            true
        } else {
            false
        }
    }

    /// Resets the failure count. Call after a successfully processed item.
    pub fn record_success(&self) {
        self.state.failure_count.store(0, Ordering::Release);
        self.state.open.store(false, Ordering::Release);
    }

    /// Records a processing failure, opening the breaker once `failure_threshold` is reached.
    pub fn record_failure(&self) {
        let failures = self.state.failure_count.fetch_add(1, Ordering::AcqRel) + 1;
        self.state.last_failure_millis.store(self.clock.now_millis(), Ordering::Release);

        if failures >= self.failure_threshold {
            self.state.open.store(true, Ordering::Release);
            tracing::warn!(failures, threshold = self.failure_threshold, "circuit breaker opening");
        }
    }

    pub fn state(&self) -> CircuitState {
        if self.state.open.load(Ordering::Acquire) {
            CircuitState::Open
        } else {
            CircuitState::Closed
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    pub fn failure_count(&self) -> usize {
        self.state.failure_count.load(Ordering::Acquire)
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

    #[test]
    fn starts_closed() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(30));
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.can_proceed());
    }

    #[test]
    fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(30));
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_proceed());
    }

    #[test]
    fn success_resets_failure_count_and_closes() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(30));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.failure_count(), 0);
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn recovers_after_timeout_elapses() {
        let clock = ManualClock::new();
        let breaker = CircuitBreaker::new(1, Duration::from_millis(100)).with_clock(clock.clone());

        breaker.record_failure();
        assert!(breaker.is_open());
        assert!(!breaker.can_proceed());

        clock.advance(50);
        assert!(!breaker.can_proceed(), "recovery_timeout not yet elapsed");

        clock.advance(60);
        assert!(breaker.can_proceed(), "recovery_timeout elapsed, should auto-close");
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }

    #[test]
    fn no_half_open_probe_state_exists() {
        // Unlike a three-state breaker, recovery closes fully on the first successful check.
        let clock = ManualClock::new();
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10)).with_clock(clock.clone());
        breaker.record_failure();
        clock.advance(20);
        assert!(breaker.can_proceed());
        // Immediately usable at full capacity, no limited "test call" concept.
        assert!(breaker.can_proceed());
        assert!(breaker.can_proceed());
    }
}
