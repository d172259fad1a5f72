//! HTTP connection layer: token cache (C2), connection pool (C3), and the
//! optimizer that composes them with the rate limiter (C4).

pub mod cache;
pub mod optimizer;
pub mod pool;

pub use cache::TokenCache;
pub use optimizer::{
    ConnectionMetrics, ConnectionPoolOptimizer, ConnectionPoolOptimizerBuilder, ReqwestTransport, Transport,
    TransportError,
};
pub use pool::ConnectionPool;
