//! Shared exponential backoff schedule used by the worker pool's execution retries
//! and the connection pool optimizer's upstream request retries.
//!
//! A single concrete strategy (not a pluggable backoff/jitter stack) because every
//! caller in this crate needs the exact same formula and callers compare delays
//! exactly in tests: `delay(n) = min(initialDelay * backoffFactor^(n-1), maxDelay)`.

use std::time::Duration;

/// Errors returned when constructing a [`RetryStrategy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategyError {
    /// `max_attempts` must be at least 1.
    ZeroMaxAttempts,
    /// `backoff_factor` must be >= 1.0 so delays never shrink between attempts.
    BackoffFactorBelowOne,
    /// `max_delay` must be >= `initial_delay`.
    MaxDelayBelowInitialDelay,
}

impl std::fmt::Display for RetryStrategyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ZeroMaxAttempts => write!(f, "max_attempts must be at least 1"),
            Self::BackoffFactorBelowOne => write!(f, "backoff_factor must be >= 1.0"),
            Self::MaxDelayBelowInitialDelay => {
                write!(f, "max_delay must be >= initial_delay")
            }
        }
    }
}

impl std::error::Error for RetryStrategyError {}

/// `{ maxAttempts, initialDelay, backoffFactor, maxDelay }` from the data model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryStrategy {
    max_attempts: usize,
    initial_delay: Duration,
    backoff_factor: f64,
    max_delay: Duration,
}

impl RetryStrategy {
    pub fn new(
        max_attempts: usize,
        initial_delay: Duration,
        backoff_factor: f64,
        max_delay: Duration,
    ) -> Result<Self, RetryStrategyError> {
        if max_attempts == 0 {
            return Err(RetryStrategyError::ZeroMaxAttempts);
        }
        if backoff_factor < 1.0 {
            return Err(RetryStrategyError::BackoffFactorBelowOne);
        }
        if max_delay < initial_delay {
            return Err(RetryStrategyError::MaxDelayBelowInitialDelay);
        }
        Ok(Self { max_attempts, initial_delay, backoff_factor, max_delay })
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn backoff_factor(&self) -> f64 {
        self.backoff_factor
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Delay before retry attempt `n` (1-indexed): `min(initialDelay * backoffFactor^(n-1), maxDelay)`.
    pub fn delay_for_attempt(&self, n: usize) -> Duration {
        debug_assert!(n >= 1, "attempt numbers are 1-indexed");
        let exponent = (n.saturating_sub(1)) as i32;
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_schedule_matches_exact_sequence() {
        let strategy =
            RetryStrategy::new(3, Duration::from_secs(1), 2.0, Duration::from_secs(10)).unwrap();

        let delays: Vec<Duration> = (1..=4).map(|n| strategy.delay_for_attempt(n)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(10),
            ]
        );
    }

    #[test]
    fn rejects_zero_max_attempts() {
        assert_eq!(
            RetryStrategy::new(0, Duration::from_secs(1), 2.0, Duration::from_secs(10))
                .unwrap_err(),
            RetryStrategyError::ZeroMaxAttempts
        );
    }

    #[test]
    fn rejects_backoff_factor_below_one() {
        assert_eq!(
            RetryStrategy::new(3, Duration::from_secs(1), 0.5, Duration::from_secs(10))
                .unwrap_err(),
            RetryStrategyError::BackoffFactorBelowOne
        );
    }

    #[test]
    fn rejects_max_delay_below_initial_delay() {
        assert_eq!(
            RetryStrategy::new(3, Duration::from_secs(10), 2.0, Duration::from_secs(1))
                .unwrap_err(),
            RetryStrategyError::MaxDelayBelowInitialDelay
        );
    }

    #[test]
    fn constant_backoff_factor_of_one_never_grows() {
        let strategy =
            RetryStrategy::new(5, Duration::from_millis(500), 1.0, Duration::from_secs(10))
                .unwrap();
        for n in 1..=5 {
            assert_eq!(strategy.delay_for_attempt(n), Duration::from_millis(500));
        }
    }
}
