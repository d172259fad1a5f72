#![forbid(unsafe_code)]

//! # Nine Lives 🐱
//!
//! An adaptive concurrent job-processing core: a priority queue with
//! backpressure and dead-lettering, an adaptively-sized worker pool, and a
//! rate-limited, pooled HTTP client, wired together by an [`orchestrator`].
//!
//! ## Components
//!
//! - [`queue`] — priority queue (C6–C9), persistence, dead-letter queue, and
//!   the [`queue::manager::QueueManager`] (C10) that fronts them with
//!   backpressure and a circuit breaker.
//! - [`concurrency`] — the adaptive [`concurrency::ConcurrencyController`]
//!   (C12) that observes resource pressure and queue depth and decides when
//!   to scale the worker pool up or down.
//! - [`worker_pool`] — [`worker_pool::WorkerPool`] (C11), a warm pool of
//!   `spawn_blocking` task slots with health checks, recycling, and retries.
//! - [`connection`] — [`connection::ConnectionPoolOptimizer`] (C4), composing
//!   a token cache (C2), connection pool (C3), and rate limiter over a
//!   pluggable [`connection::Transport`].
//! - [`orchestrator`] — wires the four together into the end-to-end flow.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use ninelives::concurrency::ConcurrencyControllerBuilder;
//! use ninelives::connection::{ConnectionPoolOptimizer, ReqwestTransport};
//! use ninelives::orchestrator::{Orchestrator, Registry};
//! use ninelives::queue::manager::QueueManager;
//! use ninelives::queue::{Priority, QueueItem};
//! use ninelives::worker_pool::WorkerPoolBuilder;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let queue = Arc::new(QueueManager::new(10_000));
//! let controller = Arc::new(ConcurrencyControllerBuilder::new(2, 32).build()?);
//! let workers = Arc::new(WorkerPoolBuilder::new(2, 32).build()?);
//! let registry = Registry::new(queue.clone(), controller, workers);
//!
//! let transport = ReqwestTransport::new()?;
//! let optimizer = Arc::new(ConnectionPoolOptimizer::builder(transport, 50, 3_600).build());
//! let orchestrator = Orchestrator::new(registry, optimizer);
//!
//! queue.enqueue(QueueItem::new("fetch", serde_json::json!({"url": "https://example.com"}), Priority::Normal, 3)?)?;
//!
//! orchestrator
//!     .process_one(|item, optimizer| async move {
//!         let url = item.data["url"].as_str().unwrap_or_default();
//!         optimizer.make_request(url).await
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod clock;
pub mod concurrency;
pub mod connection;
pub mod error;
pub mod limiter;
pub mod orchestrator;
pub mod queue;
pub mod rate_limit;
pub mod resource_monitor;
pub mod retry_strategy;
pub mod sleeper;
pub mod timeout;
pub mod worker_pool;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use clock::{Clock, MonotonicClock};
pub use error::CoreError;
pub use limiter::{ConcurrencyLimiter, ConcurrencyPermit};
pub use rate_limit::RateLimiter;
pub use retry_strategy::{RetryStrategy, RetryStrategyError};
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use timeout::{TimeoutError, TimeoutPolicy, MAX_TIMEOUT};

pub mod prelude;
