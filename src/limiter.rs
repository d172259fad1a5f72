//! Concurrency limiter used by the connection pool and worker pool to cap how many
//! operations run at once.
//!
//! Unlike a request-rejecting bulkhead, `ConcurrencyLimiter::acquire` blocks the
//! caller until a slot frees up rather than failing fast — this matches how the
//! connection pool and worker pool hand out a bounded number of slots (callers queue
//! for a connection/worker rather than being turned away), not how the queue manager's
//! own admission control works (that path uses explicit size/rate checks instead).

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl ConcurrencyLimiter {
    pub fn new(max_concurrent: usize) -> Self {
        Self { semaphore: Arc::new(Semaphore::new(max_concurrent)), max_concurrent }
    }

    /// Effectively unbounded: used where callers want the same API with no cap.
    pub fn unlimited() -> Self {
        Self::new(1_000_000_000)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn in_flight(&self) -> usize {
        self.max_concurrent.saturating_sub(self.semaphore.available_permits())
    }

    /// Waits for a free slot and returns a guard that releases it on drop.
    pub async fn acquire(&self) -> ConcurrencyPermit {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore is never closed");
        ConcurrencyPermit { _permit: permit }
    }

    /// Non-blocking variant: `None` when no slot is currently free.
    pub fn try_acquire(&self) -> Option<ConcurrencyPermit> {
        self.semaphore.clone().try_acquire_owned().ok().map(|permit| ConcurrencyPermit {
            _permit: permit,
        })
    }
}

/// Held while an operation occupies a concurrency slot; releases it on drop.
pub struct ConcurrencyPermit {
    _permit: OwnedSemaphorePermit,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn allows_operations_within_limit() {
        let limiter = ConcurrencyLimiter::new(3);
        let mut permits = vec![];
        for _ in 0..3 {
            permits.push(limiter.acquire().await);
        }
        assert_eq!(limiter.in_flight(), 3);
    }

    #[tokio::test]
    async fn try_acquire_fails_at_capacity() {
        let limiter = ConcurrencyLimiter::new(1);
        let _permit = limiter.try_acquire().expect("first acquire succeeds");
        assert!(limiter.try_acquire().is_none());
    }

    #[tokio::test]
    async fn acquire_blocks_until_a_slot_frees() {
        let limiter = ConcurrencyLimiter::new(1);
        let permit = limiter.acquire().await;

        let limiter_clone = limiter.clone();
        let handle = tokio::spawn(async move {
            let _second = limiter_clone.acquire().await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished(), "second acquire should still be waiting");

        drop(permit);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn releases_slot_after_permit_drop() {
        let limiter = ConcurrencyLimiter::new(2);
        {
            let _a = limiter.acquire().await;
            let _b = limiter.acquire().await;
            assert_eq!(limiter.in_flight(), 2);
        }
        assert_eq!(limiter.in_flight(), 0);
    }

    #[tokio::test]
    async fn unlimited_never_blocks() {
        let limiter = ConcurrencyLimiter::unlimited();
        let mut handles = vec![];
        for i in 0..200 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                let _permit = limiter.acquire().await;
                tokio::time::sleep(Duration::from_millis(5)).await;
                i
            }));
        }
        let results: Vec<_> = futures::future::join_all(handles).await;
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 200);
    }

    #[tokio::test]
    async fn tracks_max_concurrency_under_load() {
        let limiter = ConcurrencyLimiter::new(5);
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_observed = Arc::new(AtomicUsize::new(0));
        let mut handles = vec![];

        for _ in 0..20 {
            let limiter = limiter.clone();
            let concurrent = concurrent.clone();
            let max_observed = max_observed.clone();
            handles.push(tokio::spawn(async move {
                let _permit = limiter.acquire().await;
                let current = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                max_observed.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        futures::future::join_all(handles).await;
        assert!(max_observed.load(Ordering::SeqCst) <= 5);
    }
}
