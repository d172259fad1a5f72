//! Resource sampling for the adaptive concurrency controller (C5).
//!
//! Pull-driven: `snapshot()` samples current CPU/memory/IO/network once per call
//! and appends to a bounded ring; there is no internal timer. `trends()` compares
//! the mean of the last 5 samples to the preceding 5.

use std::collections::VecDeque;
use sysinfo::{Networks, System};

const HISTORY_LEN: usize = 60;
const TREND_WINDOW: usize = 5;
const TREND_THRESHOLD: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResourceSnapshot {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_read_bytes: u64,
    pub disk_write_bytes: u64,
    pub network_bytes_sent: u64,
    pub network_bytes_recv: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceTrends {
    pub cpu_trend: Trend,
    pub memory_trend: Trend,
}

fn classify(delta: f64) -> Trend {
    if delta > TREND_THRESHOLD {
        Trend::Increasing
    } else if delta < -TREND_THRESHOLD {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}

fn mean(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let count = values.clone().count();
    if count == 0 {
        return 0.0;
    }
    values.sum::<f64>() / count as f64
}

/// Samples system resource usage and keeps a bounded history for trend analysis.
pub struct ResourceMonitor {
    system: System,
    networks: Networks,
    cpu_history: VecDeque<f64>,
    memory_history: VecDeque<f64>,
}

impl ResourceMonitor {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_usage();
        system.refresh_memory();
        Self {
            system,
            networks: Networks::new_with_refreshed_list(),
            cpu_history: VecDeque::with_capacity(HISTORY_LEN),
            memory_history: VecDeque::with_capacity(HISTORY_LEN),
        }
    }

    /// Sample current resource usage, pushing onto the bounded history ring.
    pub fn snapshot(&mut self) -> ResourceSnapshot {
        self.system.refresh_cpu_usage();
        self.system.refresh_memory();
        self.networks.refresh(true);

        let cpu_percent = self.system.global_cpu_usage() as f64;
        let memory_percent = if self.system.total_memory() == 0 {
            0.0
        } else {
            (self.system.used_memory() as f64 / self.system.total_memory() as f64) * 100.0
        };

        let (bytes_sent, bytes_recv) = self
            .networks
            .iter()
            .fold((0u64, 0u64), |(sent, recv), (_, data)| {
                (sent + data.total_transmitted(), recv + data.total_received())
            });

        push_bounded(&mut self.cpu_history, cpu_percent);
        push_bounded(&mut self.memory_history, memory_percent);

        ResourceSnapshot {
            cpu_percent,
            memory_percent,
            disk_read_bytes: 0,
            disk_write_bytes: 0,
            network_bytes_sent: bytes_sent,
            network_bytes_recv: bytes_recv,
        }
    }

    /// Compares the mean of the last 5 samples against the preceding 5.
    pub fn trends(&self) -> ResourceTrends {
        if self.cpu_history.len() < 2 {
            return ResourceTrends { cpu_trend: Trend::Stable, memory_trend: Trend::Stable };
        }

        let cpu_trend = classify(windowed_delta(&self.cpu_history));
        let memory_trend = classify(windowed_delta(&self.memory_history));

        ResourceTrends { cpu_trend, memory_trend }
    }
}

impl Default for ResourceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

fn push_bounded(history: &mut VecDeque<f64>, value: f64) {
    if history.len() == HISTORY_LEN {
        history.pop_front();
    }
    history.push_back(value);
}

fn windowed_delta(history: &VecDeque<f64>) -> f64 {
    let len = history.len();
    let recent_start = len.saturating_sub(TREND_WINDOW);
    let prior_start = len.saturating_sub(TREND_WINDOW * 2);

    let recent = mean(history.iter().skip(recent_start).copied());
    let prior = mean(history.iter().skip(prior_start).take(recent_start - prior_start).copied());

    recent - prior
}
