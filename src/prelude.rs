//! Convenient re-exports for common Nine Lives types.
pub use crate::{
    circuit_breaker::{CircuitBreaker, CircuitState},
    clock::{Clock, MonotonicClock},
    concurrency::{
        ConcurrencyController, ConcurrencyControllerBuilder, ConcurrencyMetrics,
        ControllerConfigError, ScalingDecision, ScalingDirection, ScalingStrategy,
    },
    connection::{
        ConnectionPool, ConnectionPoolOptimizer, ConnectionPoolOptimizerBuilder, ReqwestTransport,
        TokenCache, Transport, TransportError,
    },
    error::{CoreError, ErrorKind},
    limiter::{ConcurrencyLimiter, ConcurrencyPermit},
    orchestrator::{Orchestrator, Registry},
    queue::{
        manager::{QueueConfigError, QueueError, QueueManager, QueueMetrics},
        Priority, QueueItem, QueueItemError,
    },
    rate_limit::RateLimiter,
    resource_monitor::{ResourceMonitor, ResourceSnapshot, ResourceTrends, Trend},
    retry_strategy::{RetryStrategy, RetryStrategyError},
    sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper},
    timeout::{TimeoutError, TimeoutPolicy, MAX_TIMEOUT},
    worker_pool::{PoolMetrics, WorkerPool, WorkerPoolBuilder, WorkerPoolConfigError},
};
