//! Per-worker health sampled by the pool's internal health-check loop (C11).
//!
//! Workers here are `spawn_blocking` task slots rather than OS processes, so
//! `cpu_percent`/`memory_mb` are sampled from the whole-process
//! [`crate::resource_monitor::ResourceMonitor`] rather than a per-PID lookup —
//! there is no per-worker OS handle to inspect once "process" becomes
//! "blocking task".

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Initializing,
    Healthy,
    Unhealthy,
    Dead,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessHealth {
    pub worker_id: u64,
    pub status: WorkerStatus,
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub task_count: u64,
    pub last_health_check: DateTime<Utc>,
}

impl ProcessHealth {
    pub fn initializing(worker_id: u64) -> Self {
        Self {
            worker_id,
            status: WorkerStatus::Initializing,
            cpu_percent: 0.0,
            memory_mb: 0.0,
            task_count: 0,
            last_health_check: Utc::now(),
        }
    }
}
