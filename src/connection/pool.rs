//! Bounded pool of reusable connections (C3).
//!
//! Generic over the connection type so it composes with any
//! [`super::optimizer::Transport`] implementation (in particular
//! `reqwest::Client`, which is already internally reference-counted and keeps
//! its own keep-alive socket pool — a "connection" here is a logical checkout
//! slot on top of that, admission control rather than literal socket
//! ownership).

use std::collections::VecDeque;
use tokio::sync::Mutex;

/// Pool of up to `max_size` reusable connections of type `C`.
pub struct ConnectionPool<C: Clone + Send + Sync + 'static> {
    factory: Box<dyn Fn() -> C + Send + Sync>,
    inner: Mutex<Inner<C>>,
}

struct Inner<C> {
    max_size: usize,
    created: usize,
    available: VecDeque<C>,
    active_count: usize,
}

impl<C: Clone + Send + Sync + 'static> ConnectionPool<C> {
    pub fn new<F>(max_size: usize, factory: F) -> Self
    where
        F: Fn() -> C + Send + Sync + 'static,
    {
        Self { factory: Box::new(factory), inner: Mutex::new(Inner { max_size, created: 0, available: VecDeque::new(), active_count: 0 }) }
    }

    /// Returns an idle connection, creates a fresh one if under `max_size`,
    /// or `None` if the pool is exhausted.
    pub async fn acquire_connection(&self) -> Option<C> {
        let mut inner = self.inner.lock().await;
        if let Some(conn) = inner.available.pop_front() {
            inner.active_count += 1;
            return Some(conn);
        }
        if inner.created < inner.max_size {
            let conn = (self.factory)();
            inner.created += 1;
            inner.active_count += 1;
            return Some(conn);
        }
        None
    }

    /// Returns `conn` to the idle set.
    pub async fn release_connection(&self, conn: C) {
        let mut inner = self.inner.lock().await;
        inner.active_count = inner.active_count.saturating_sub(1);
        inner.available.push_back(conn);
    }

    pub async fn available_connections(&self) -> usize {
        self.inner.lock().await.available.len()
    }

    pub async fn active_connections(&self) -> usize {
        self.inner.lock().await.active_count
    }

    pub async fn max_size(&self) -> usize {
        self.inner.lock().await.max_size
    }

    /// Grows or shrinks the pool's ceiling. Shrinking drops idle connections
    /// down to the new size; active connections in flight are left alone and
    /// simply won't be re-admitted once the ceiling is reached.
    pub async fn resize(&self, new_size: usize) {
        let mut inner = self.inner.lock().await;
        if new_size > inner.max_size {
            inner.max_size = new_size;
            return;
        }
        let excess = inner.created.saturating_sub(new_size);
        for _ in 0..excess {
            if inner.available.pop_back().is_some() {
                inner.created -= 1;
            } else {
                break;
            }
        }
        inner.max_size = new_size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn acquire_creates_up_to_max_size_then_exhausts() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let pool: ConnectionPool<u32> = ConnectionPool::new(2, move || counter_clone.fetch_add(1, Ordering::SeqCst));

        let a = pool.acquire_connection().await;
        let b = pool.acquire_connection().await;
        let c = pool.acquire_connection().await;

        assert!(a.is_some());
        assert!(b.is_some());
        assert!(c.is_none(), "pool exhausted beyond max_size");
    }

    #[tokio::test]
    async fn released_connection_is_reused() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let pool: ConnectionPool<u32> = ConnectionPool::new(1, move || counter_clone.fetch_add(1, Ordering::SeqCst));

        let conn = pool.acquire_connection().await.unwrap();
        pool.release_connection(conn).await;
        let reused = pool.acquire_connection().await;
        assert!(reused.is_some());
        assert_eq!(counter.load(Ordering::SeqCst), 1, "no second connection was created");
    }

    #[tokio::test]
    async fn resize_grows_ceiling() {
        let pool: ConnectionPool<u32> = ConnectionPool::new(1, || 0);
        pool.resize(5).await;
        assert_eq!(pool.max_size().await, 5);
    }

    #[tokio::test]
    async fn active_and_available_counts_track_usage() {
        let pool: ConnectionPool<u32> = ConnectionPool::new(2, || 1);
        let conn = pool.acquire_connection().await.unwrap();
        assert_eq!(pool.active_connections().await, 1);
        pool.release_connection(conn).await;
        assert_eq!(pool.active_connections().await, 0);
        assert_eq!(pool.available_connections().await, 1);
    }
}
