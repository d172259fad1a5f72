//! Error taxonomy for the job-processing core.
//!
//! [`CoreError`] is the single error type returned across component boundaries. It is
//! generic over the user work-function's error type `E` so a failure from inside the
//! caller-supplied closure threads back out without being downcast or stringified.
//! [`ErrorKind`] exposes the ten wire-stable names every caller can match on
//! regardless of `E`.

use std::fmt;
use std::time::Duration;

/// Cap the number of stored failures inside `MaxRetriesExceeded` to avoid unbounded growth.
pub const MAX_RETRY_FAILURES: usize = 10;

/// The ten wire-stable error kinds. Callers match on this enum, not on `Display` text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BackpressureActive,
    QueueFull,
    CircuitOpen,
    RateLimitExceeded,
    Timeout,
    MemoryLimit,
    ItemExpired,
    MaxRetriesExceeded,
    ValidationError,
    Unknown,
}

impl ErrorKind {
    /// The wire-stable name (e.g. for log fields or metrics labels).
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BackpressureActive => "BACKPRESSURE_ACTIVE",
            ErrorKind::QueueFull => "QUEUE_FULL",
            ErrorKind::CircuitOpen => "CIRCUIT_OPEN",
            ErrorKind::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::MemoryLimit => "MEMORY_LIMIT",
            ErrorKind::ItemExpired => "ITEM_EXPIRED",
            ErrorKind::MaxRetriesExceeded => "MAX_RETRIES_EXCEEDED",
            ErrorKind::ValidationError => "VALIDATION_ERROR",
            ErrorKind::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for the core. `E` is the user work function's error type.
#[derive(Debug)]
pub enum CoreError<E> {
    /// Admission rejected: backpressure is active.
    BackpressureActive,
    /// Admission rejected: the queue is at `max_size`.
    QueueFull { size: usize, max_size: usize },
    /// Dequeue rejected: the circuit breaker is open.
    CircuitOpen { failure_count: usize, open_for: Duration },
    /// Admission rejected: the sliding-window quota is exhausted.
    RateLimitExceeded { retry_after: Duration },
    /// An operation exceeded its deadline.
    Timeout { elapsed: Duration, timeout: Duration },
    /// A worker exceeded its configured memory cap.
    MemoryLimit { limit_mb: u64 },
    /// The item's TTL elapsed before it could be dequeued.
    ItemExpired { item_id: String },
    /// Every retry attempt was exhausted; `failures` holds up to
    /// [`MAX_RETRY_FAILURES`] of the most recent underlying errors.
    MaxRetriesExceeded { attempts: usize, failures: Vec<E> },
    /// The item failed precondition checks (empty id, invalid priority, ...).
    ValidationError { message: String },
    /// The user work function itself failed.
    Inner(E),
}

impl<E: Clone> Clone for CoreError<E> {
    fn clone(&self) -> Self {
        match self {
            Self::BackpressureActive => Self::BackpressureActive,
            Self::QueueFull { size, max_size } => {
                Self::QueueFull { size: *size, max_size: *max_size }
            }
            Self::CircuitOpen { failure_count, open_for } => {
                Self::CircuitOpen { failure_count: *failure_count, open_for: *open_for }
            }
            Self::RateLimitExceeded { retry_after } => {
                Self::RateLimitExceeded { retry_after: *retry_after }
            }
            Self::Timeout { elapsed, timeout } => {
                Self::Timeout { elapsed: *elapsed, timeout: *timeout }
            }
            Self::MemoryLimit { limit_mb } => Self::MemoryLimit { limit_mb: *limit_mb },
            Self::ItemExpired { item_id } => Self::ItemExpired { item_id: item_id.clone() },
            Self::MaxRetriesExceeded { attempts, failures } => {
                Self::MaxRetriesExceeded { attempts: *attempts, failures: failures.clone() }
            }
            Self::ValidationError { message } => {
                Self::ValidationError { message: message.clone() }
            }
            Self::Inner(e) => Self::Inner(e.clone()),
        }
    }
}

impl<E: PartialEq> PartialEq for CoreError<E> {
    fn eq(&self, other: &Self) -> bool {
        use CoreError::*;
        match (self, other) {
            (BackpressureActive, BackpressureActive) => true,
            (QueueFull { size: a1, max_size: b1 }, QueueFull { size: a2, max_size: b2 }) => {
                a1 == a2 && b1 == b2
            }
            (
                CircuitOpen { failure_count: f1, open_for: d1 },
                CircuitOpen { failure_count: f2, open_for: d2 },
            ) => f1 == f2 && d1 == d2,
            (RateLimitExceeded { retry_after: a }, RateLimitExceeded { retry_after: b }) => {
                a == b
            }
            (Timeout { elapsed: a1, timeout: b1 }, Timeout { elapsed: a2, timeout: b2 }) => {
                a1 == a2 && b1 == b2
            }
            (MemoryLimit { limit_mb: a }, MemoryLimit { limit_mb: b }) => a == b,
            (ItemExpired { item_id: a }, ItemExpired { item_id: b }) => a == b,
            (
                MaxRetriesExceeded { attempts: a1, failures: f1 },
                MaxRetriesExceeded { attempts: a2, failures: f2 },
            ) => a1 == a2 && f1 == f2,
            (ValidationError { message: a }, ValidationError { message: b }) => a == b,
            (Inner(e1), Inner(e2)) => e1 == e2,
            _ => false,
        }
    }
}

impl<E: Eq> Eq for CoreError<E> {}

impl<E: fmt::Display> fmt::Display for CoreError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BackpressureActive => write!(f, "backpressure active, enqueue rejected"),
            Self::QueueFull { size, max_size } => write!(f, "queue full ({size}/{max_size})"),
            Self::CircuitOpen { failure_count, open_for } => write!(
                f,
                "circuit breaker open ({failure_count} failures, open for {open_for:?})"
            ),
            Self::RateLimitExceeded { retry_after } => {
                write!(f, "rate limit exceeded, retry after {retry_after:?}")
            }
            Self::Timeout { elapsed, timeout } => {
                write!(f, "operation timed out after {elapsed:?} (limit: {timeout:?})")
            }
            Self::MemoryLimit { limit_mb } => {
                write!(f, "worker exceeded memory limit of {limit_mb} MB")
            }
            Self::ItemExpired { item_id } => write!(f, "item {item_id} expired before dequeue"),
            Self::MaxRetriesExceeded { attempts, failures } => {
                let last = failures.last().map(|e| e.to_string()).unwrap_or_default();
                write!(
                    f,
                    "max retries exceeded after {attempts} attempts ({} recorded failures), last error: {last}",
                    failures.len()
                )
            }
            Self::ValidationError { message } => write!(f, "validation error: {message}"),
            Self::Inner(e) => write!(f, "{e}"),
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for CoreError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Inner(e) => Some(e),
            Self::MaxRetriesExceeded { failures, .. } => {
                failures.last().map(|e| e as &dyn std::error::Error)
            }
            _ => None,
        }
    }
}

impl<E> CoreError<E> {
    /// The wire-stable kind for this error, for callers that don't want to match on `E`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BackpressureActive => ErrorKind::BackpressureActive,
            Self::QueueFull { .. } => ErrorKind::QueueFull,
            Self::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            Self::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::MemoryLimit { .. } => ErrorKind::MemoryLimit,
            Self::ItemExpired { .. } => ErrorKind::ItemExpired,
            Self::MaxRetriesExceeded { .. } => ErrorKind::MaxRetriesExceeded,
            Self::ValidationError { .. } => ErrorKind::ValidationError,
            Self::Inner(_) => ErrorKind::Unknown,
        }
    }

    pub fn is_backpressure(&self) -> bool {
        matches!(self, Self::BackpressureActive)
    }

    pub fn is_queue_full(&self) -> bool {
        matches!(self, Self::QueueFull { .. })
    }

    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimitExceeded { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_max_retries_exceeded(&self) -> bool {
        matches!(self, Self::MaxRetriesExceeded { .. })
    }

    /// Access all recorded failures for `MaxRetriesExceeded`, if present.
    pub fn failures(&self) -> Option<&[E]> {
        match self {
            Self::MaxRetriesExceeded { failures, .. } => Some(failures.as_slice()),
            _ => None,
        }
    }

    pub fn is_inner(&self) -> bool {
        matches!(self, Self::Inner(_))
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct DummyError(&'static str);

    impl fmt::Display for DummyError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }
    impl std::error::Error for DummyError {}

    #[test]
    fn kind_matches_wire_stable_name() {
        let err: CoreError<io::Error> = CoreError::QueueFull { size: 10, max_size: 10 };
        assert_eq!(err.kind().as_str(), "QUEUE_FULL");
        assert!(err.is_queue_full());
    }

    #[test]
    fn circuit_open_display_contains_failure_count() {
        let err: CoreError<io::Error> =
            CoreError::CircuitOpen { failure_count: 3, open_for: Duration::from_secs(5) };
        let msg = err.to_string();
        assert!(msg.contains("3 failures"));
        assert!(err.is_circuit_open());
    }

    #[test]
    fn max_retries_exceeded_keeps_last_failure() {
        let err: CoreError<DummyError> = CoreError::MaxRetriesExceeded {
            attempts: 3,
            failures: vec![DummyError("first"), DummyError("last")],
        };
        let msg = err.to_string();
        assert!(msg.contains("3 attempts"));
        assert!(msg.contains("last"));
        assert!(err.is_max_retries_exceeded());
    }

    #[test]
    fn inner_roundtrips() {
        let err = CoreError::<DummyError>::Inner(DummyError("boom"));
        assert!(err.is_inner());
        assert_eq!(err.as_inner().unwrap().0, "boom");
        assert_eq!(err.kind(), ErrorKind::Unknown);
    }

    #[test]
    fn unknown_never_surfaces_for_typed_variants() {
        let err: CoreError<io::Error> = CoreError::ValidationError { message: "bad id".into() };
        assert_ne!(err.kind(), ErrorKind::Unknown);
    }

    #[test]
    fn source_returns_last_failure_for_max_retries_exceeded() {
        let err: CoreError<DummyError> = CoreError::MaxRetriesExceeded {
            attempts: 3,
            failures: vec![DummyError("a"), DummyError("b")],
        };
        let src = err.source().unwrap();
        assert_eq!(src.to_string(), "b");
    }
}
