//! Worker Pool (C11): a warm, adaptively-sized pool of `spawn_blocking` task
//! slots with health checks, recycling, retries, and named shared primitives.

mod health;
mod pool;
mod shared;

pub use health::{ProcessHealth, WorkerStatus};
pub use pool::{PoolMetrics, WorkerPool, WorkerPoolBuilder, WorkerPoolConfigError};
pub use shared::SharedRegistry;
