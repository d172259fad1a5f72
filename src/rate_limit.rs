//! Sliding-window hourly rate limiter (C1).
//!
//! Tracks admission timestamps within the trailing hour and caps admissions at
//! `limit_per_hour`. No background eviction thread: `acquire()` evicts stale
//! timestamps inline, matching the source algorithm's pull-driven design.

use crate::clock::{Clock, MonotonicClock};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const WINDOW: Duration = Duration::from_secs(3600);

pub struct RateLimiter {
    limit_per_hour: usize,
    window: Mutex<VecDeque<u64>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(limit_per_hour: usize) -> Self {
        Self {
            limit_per_hour,
            window: Mutex::new(VecDeque::new()),
            clock: Arc::new(MonotonicClock::default()),
        }
    }

    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    fn evict_stale(&self, window: &mut VecDeque<u64>, now: u64) {
        let cutoff = now.saturating_sub(WINDOW.as_millis() as u64);
        while let Some(&front) = window.front() {
            if front < cutoff {
                window.pop_front();
            } else {
                break;
            }
        }
    }

    /// Evicts timestamps older than an hour, then admits iff under the cap.
    pub fn acquire(&self) -> bool {
        let now = self.clock.now_millis();
        let mut window = self.window.lock().expect("rate limiter mutex poisoned");
        self.evict_stale(&mut window, now);

        if window.len() < self.limit_per_hour {
            window.push_back(now);
            true
        } else {
            false
        }
    }

    /// Remaining admissions in the current window.
    pub fn remaining(&self) -> usize {
        let now = self.clock.now_millis();
        let mut window = self.window.lock().expect("rate limiter mutex poisoned");
        self.evict_stale(&mut window, now);
        self.limit_per_hour.saturating_sub(window.len())
    }

    /// Clock-relative millis at which the current window started, plus one hour.
    /// Returns `None` when the window is empty (nothing to reset).
    pub fn reset_time_millis(&self) -> Option<u64> {
        let now = self.clock.now_millis();
        let mut window = self.window.lock().expect("rate limiter mutex poisoned");
        self.evict_stale(&mut window, now);
        window.front().map(|&oldest| oldest + WINDOW.as_millis() as u64)
    }

    pub fn limit_per_hour(&self) -> usize {
        self.limit_per_hour
    }

    /// Convenience predicate used by the connection pool optimizer: true once
    /// remaining quota drops under 10% of the hourly limit.
    pub fn should_throttle(&self) -> bool {
        let remaining = self.remaining();
        (remaining as f64) < (self.limit_per_hour as f64 * 0.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Debug, Clone)]
    struct ManualClock {
        now: Arc<AtomicU64>,
    }

    impl ManualClock {
        fn new() -> Self {
            Self { now: Arc::new(AtomicU64::new(0)) }
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
    fn admits_up_to_limit_then_denies() {
        let limiter = RateLimiter::new(5);
        for _ in 0..5 {
            assert!(limiter.acquire());
        }
        assert!(!limiter.acquire());
        assert_eq!(limiter.remaining(), 0);
    }

    #[test]
    fn evicts_stale_timestamps_after_an_hour() {
        let clock = ManualClock::new();
        let limiter = RateLimiter::new(2).with_clock(clock.clone());

        assert!(limiter.acquire());
        assert!(limiter.acquire());
        assert!(!limiter.acquire());

        clock.advance(3_600_001);
        assert!(limiter.acquire(), "window should have fully rolled over");
        assert_eq!(limiter.remaining(), 1);
    }

    #[test]
    fn remaining_decreases_with_each_acquire() {
        let limiter = RateLimiter::new(3);
        assert_eq!(limiter.remaining(), 3);
        limiter.acquire();
        assert_eq!(limiter.remaining(), 2);
    }

    #[test]
    fn should_throttle_once_under_ten_percent_remaining() {
        // should_throttle is a strict `<`: remaining=1 on a limit of 10 gives
        // 1.0 < 1.0 == false, so throttling only kicks in once the window is
        // fully exhausted (remaining=0).
        let limiter = RateLimiter::new(10);
        for _ in 0..10 {
            limiter.acquire();
        }
        assert_eq!(limiter.remaining(), 0);
        assert!(limiter.should_throttle());
    }

    #[test]
    fn reset_time_is_none_when_window_empty() {
        let limiter = RateLimiter::new(5);
        assert!(limiter.reset_time_millis().is_none());
    }
}
