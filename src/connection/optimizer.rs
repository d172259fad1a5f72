//! Connection Pool Optimizer (C4): composes the rate limiter, token cache and
//! connection pool with retry, failover, deduplication, and bandwidth throttling.
//!
//! A real HTTP layer sits behind the [`Transport`] trait so the optimizer's
//! policy (rate limiting, retry, failover, caching, dedup, throttling) is
//! independently testable from the transport that carries requests.

use crate::connection::cache::TokenCache;
use crate::connection::pool::ConnectionPool;
use crate::error::CoreError;
use crate::rate_limit::RateLimiter;
use crate::retry_strategy::RetryStrategy;
use crate::sleeper::{Sleeper, TokioSleeper};
use async_trait::async_trait;
use futures::future::{FutureExt, Shared};
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError(pub String);

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for TransportError {}

/// The HTTP layer the optimizer drives. Kept abstract so policy (retry,
/// failover, caching, dedup) can be tested without a network.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    type Connection: Clone + Send + Sync + 'static;

    fn new_connection(&self) -> Self::Connection;
    async fn request(&self, conn: &Self::Connection, url: &str) -> Result<Value, TransportError>;
}

/// Production [`Transport`] over `reqwest::Client`. A cloned client shares the
/// same internal connection pool and keep-alive settings, so "connection"
/// checkout here is a logical admission slot rather than a distinct socket.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self { client: reqwest::Client::builder().build()? })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    type Connection = reqwest::Client;

    fn new_connection(&self) -> Self::Connection {
        self.client.clone()
    }

    async fn request(&self, conn: &Self::Connection, url: &str) -> Result<Value, TransportError> {
        let response = conn.get(url).send().await.map_err(|e| TransportError(e.to_string()))?;
        response.json::<Value>().await.map_err(|e| TransportError(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub retry_count: u64,
    pub rate_limit_hits: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub concurrent_requests: u64,
    pub warmed_connections: u64,
    pub pool_reuse_count: u64,
    pub failover_count: u64,
    pub deduplicated_requests: u64,
}

#[derive(Default)]
struct MetricsInner {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    retry_count: AtomicU64,
    rate_limit_hits: AtomicU64,
    concurrent_requests: AtomicU64,
    warmed_connections: AtomicU64,
    pool_reuse_count: AtomicU64,
    failover_count: AtomicU64,
    deduplicated_requests: AtomicU64,
}

type DedupFuture = Shared<Pin<Box<dyn std::future::Future<Output = Result<Value, TransportError>> + Send>>>;

pub struct ConnectionPoolOptimizerBuilder<T: Transport> {
    transport: Arc<T>,
    max_connections: usize,
    rate_limit_per_hour: usize,
    retry_strategy: RetryStrategy,
    cache_ttl: Duration,
    bandwidth_limit_mbps: Option<f64>,
    failover_endpoints: Vec<String>,
}

impl<T: Transport> ConnectionPoolOptimizerBuilder<T> {
    pub fn new(transport: T, max_connections: usize, rate_limit_per_hour: usize) -> Self {
        Self {
            transport: Arc::new(transport),
            max_connections,
            rate_limit_per_hour,
            retry_strategy: RetryStrategy::new(3, Duration::from_secs(1), 2.0, Duration::from_secs(60))
                .expect("default retry strategy is valid"),
            cache_ttl: Duration::from_secs(300),
            bandwidth_limit_mbps: None,
            failover_endpoints: Vec::new(),
        }
    }

    pub fn retry_strategy(mut self, value: RetryStrategy) -> Self {
        self.retry_strategy = value;
        self
    }

    pub fn cache_ttl(mut self, value: Duration) -> Self {
        self.cache_ttl = value;
        self
    }

    pub fn bandwidth_limit_mbps(mut self, mbps: f64) -> Self {
        self.bandwidth_limit_mbps = Some(mbps);
        self
    }

    pub fn failover_endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.failover_endpoints = endpoints;
        self
    }

    pub fn build(self) -> ConnectionPoolOptimizer<T> {
        let transport = self.transport;
        let transport_for_pool = transport.clone();
        ConnectionPoolOptimizer {
            pool: ConnectionPool::new(self.max_connections, move || transport_for_pool.new_connection()),
            transport,
            rate_limiter: RateLimiter::new(self.rate_limit_per_hour),
            retry_strategy: self.retry_strategy,
            cache: TokenCache::new(self.cache_ttl),
            metrics: MetricsInner::default(),
            bandwidth_limit_mbps: Mutex::new(self.bandwidth_limit_mbps),
            bytes_sent: AtomicU64::new(0),
            failover_endpoints: Mutex::new(self.failover_endpoints),
            pending: Mutex::new(HashMap::new()),
            sleeper: Arc::new(TokioSleeper),
        }
    }
}

/// Composes C1 (rate limiter), C2 (token cache), and C3 (connection pool) with
/// retry, failover, deduplication, and bandwidth throttling (C4).
pub struct ConnectionPoolOptimizer<T: Transport> {
    pool: ConnectionPool<T::Connection>,
    transport: Arc<T>,
    rate_limiter: RateLimiter,
    retry_strategy: RetryStrategy,
    cache: TokenCache<Value>,
    metrics: MetricsInner,
    bandwidth_limit_mbps: Mutex<Option<f64>>,
    bytes_sent: AtomicU64,
    failover_endpoints: Mutex<Vec<String>>,
    pending: Mutex<HashMap<String, DedupFuture>>,
    sleeper: Arc<dyn Sleeper>,
}

impl<T: Transport> ConnectionPoolOptimizer<T> {
    pub fn builder(transport: T, max_connections: usize, rate_limit_per_hour: usize) -> ConnectionPoolOptimizerBuilder<T> {
        ConnectionPoolOptimizerBuilder::new(transport, max_connections, rate_limit_per_hour)
    }

    pub fn remaining_quota(&self) -> usize {
        self.rate_limiter.remaining()
    }

    /// Convenience predicate: true once remaining quota drops under 10%.
    pub fn should_throttle(&self) -> bool {
        self.rate_limiter.should_throttle()
    }

    pub async fn warm_connections(&self, count: usize) {
        for _ in 0..count {
            if let Some(conn) = self.pool.acquire_connection().await {
                self.metrics.warmed_connections.fetch_add(1, Ordering::Relaxed);
                self.pool.release_connection(conn).await;
            }
        }
    }

    pub async fn resize_pool(&self, new_size: usize) {
        self.pool.resize(new_size).await;
    }

    pub fn configure_failover(&self, endpoints: Vec<String>) {
        *self.failover_endpoints.lock().expect("failover endpoints mutex poisoned") = endpoints;
    }

    pub fn set_bandwidth_limit(&self, mbps: f64) {
        *self.bandwidth_limit_mbps.lock().expect("bandwidth mutex poisoned") = Some(mbps);
    }

    /// Delays proportionally to `data`'s size under the configured bandwidth cap.
    pub async fn send_data_with_throttling(&self, data: &str) {
        let limit = *self.bandwidth_limit_mbps.lock().expect("bandwidth mutex poisoned");
        let Some(mbps) = limit else { return };
        let data_size_mb = data.len() as f64 / (1024.0 * 1024.0);
        let max_rate_mb_per_sec = mbps / 8.0;
        if data_size_mb > 0.0 && max_rate_mb_per_sec > 0.0 {
            let required_secs = data_size_mb / max_rate_mb_per_sec;
            self.sleeper.sleep(Duration::from_secs_f64(required_secs)).await;
        }
        self.bytes_sent.fetch_add(data.len() as u64, Ordering::Relaxed);
    }

    /// Core request path: admission-gated by the rate limiter, retried per
    /// [`RetryStrategy`] on transport failure.
    /// Rate-limited, retried, pool-reusing request — the primitive every
    /// other request mode (cached, deduplicated, failover, concurrent) builds on.
    pub async fn make_request(&self, url: &str) -> Result<Value, CoreError<TransportError>> {
        if !self.rate_limiter.acquire() {
            self.metrics.rate_limit_hits.fetch_add(1, Ordering::Relaxed);
            return Err(CoreError::RateLimitExceeded { retry_after: Duration::from_secs(1) });
        }

        self.metrics.total_requests.fetch_add(1, Ordering::Relaxed);

        let conn = self.pool.acquire_connection().await;
        let result = self.request_with_retry(url).await;
        if let Some(conn) = conn {
            self.metrics.pool_reuse_count.fetch_add(1, Ordering::Relaxed);
            self.pool.release_connection(conn).await;
        }

        match result {
            Ok(value) => {
                self.metrics.successful_requests.fetch_add(1, Ordering::Relaxed);
                Ok(value)
            }
            Err(err) => {
                self.metrics.failed_requests.fetch_add(1, Ordering::Relaxed);
                Err(CoreError::Inner(err))
            }
        }
    }

    async fn request_with_retry(&self, url: &str) -> Result<Value, TransportError> {
        let conn = self.transport.new_connection();
        let mut attempt = 1usize;
        loop {
            match self.transport.request(&conn, url).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.retry_strategy.max_attempts() {
                        return Err(err);
                    }
                    self.metrics.retry_count.fetch_add(1, Ordering::Relaxed);
                    let delay = self.retry_strategy.delay_for_attempt(attempt);
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Returns the cached value on hit, otherwise makes the request and caches it.
    pub async fn make_cached_request(&self, url: &str) -> Result<Value, CoreError<TransportError>> {
        if let Some(cached) = self.cache.get(url) {
            return Ok(cached);
        }
        let value = self.make_request(url).await?;
        self.cache.put(url, value.clone());
        Ok(value)
    }

    pub fn cache_hit_ratio(&self) -> f64 {
        self.cache.hit_ratio()
    }

    /// If a request for `url` is already in flight, awaits its shared result
    /// instead of issuing a new one.
    pub async fn make_deduplicated_request(&self, url: &str) -> Result<Value, TransportError> {
        let existing = {
            let pending = self.pending.lock().expect("pending requests mutex poisoned");
            pending.get(url).cloned()
        };

        if let Some(shared) = existing {
            self.metrics.deduplicated_requests.fetch_add(1, Ordering::Relaxed);
            return shared.await;
        }

        let conn = self.transport.new_connection();
        let transport = self.transport.clone();
        let url_owned = url.to_string();
        let fut: Pin<Box<dyn std::future::Future<Output = Result<Value, TransportError>> + Send>> =
            Box::pin(async move { transport.request(&conn, &url_owned).await });
        let shared = fut.shared();

        self.pending.lock().expect("pending requests mutex poisoned").insert(url.to_string(), shared.clone());
        let result = shared.await;
        self.pending.lock().expect("pending requests mutex poisoned").remove(url);
        result
    }

    /// Tries each configured failover endpoint in order until one succeeds.
    pub async fn make_request_with_failover(&self, path: &str) -> Result<Value, CoreError<TransportError>> {
        let endpoints = self.failover_endpoints.lock().expect("failover endpoints mutex poisoned").clone();
        if endpoints.is_empty() {
            return Err(CoreError::ValidationError { message: "no failover endpoints configured".to_string() });
        }

        let mut last_err = None;
        for (i, endpoint) in endpoints.iter().enumerate() {
            let url = format!("{endpoint}{path}");
            match self.make_request(&url).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if i < endpoints.len() - 1 {
                        self.metrics.failover_count.fetch_add(1, Ordering::Relaxed);
                    }
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.expect("at least one endpoint was tried"))
    }

    /// Runs `urls` concurrently, bounded by the pool's `max_connections`.
    pub async fn execute_concurrent_requests(&self, urls: Vec<String>) -> Vec<Result<Value, CoreError<TransportError>>> {
        self.metrics.concurrent_requests.fetch_add(urls.len() as u64, Ordering::Relaxed);
        let futures = urls.iter().map(|url| self.make_request(url));
        futures::future::join_all(futures).await
    }

    pub fn get_metrics(&self) -> ConnectionMetrics {
        ConnectionMetrics {
            total_requests: self.metrics.total_requests.load(Ordering::Relaxed),
            successful_requests: self.metrics.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.metrics.failed_requests.load(Ordering::Relaxed),
            retry_count: self.metrics.retry_count.load(Ordering::Relaxed),
            rate_limit_hits: self.metrics.rate_limit_hits.load(Ordering::Relaxed),
            cache_hits: self.cache.hits(),
            cache_misses: self.cache.misses(),
            concurrent_requests: self.metrics.concurrent_requests.load(Ordering::Relaxed),
            warmed_connections: self.metrics.warmed_connections.load(Ordering::Relaxed),
            pool_reuse_count: self.metrics.pool_reuse_count.load(Ordering::Relaxed),
            failover_count: self.metrics.failover_count.load(Ordering::Relaxed),
            deduplicated_requests: self.metrics.deduplicated_requests.load(Ordering::Relaxed),
        }
    }
}
