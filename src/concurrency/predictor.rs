//! An advisory, non-driving worker-count predictor.
//!
//! This is a k-nearest-like heuristic over recent `(metrics, decision)`
//! observations, not a trained model. It never drives scaling on its own;
//! [`super::controller::ConcurrencyController::should_scale_up`]/
//! `should_scale_down` remain the sole scaling authority. Callers that want a
//! second opinion call `predict_optimal_workers` explicitly.

use super::ConcurrencyMetrics;
use std::collections::VecDeque;

const HISTORY_LEN: usize = 1000;
const MIN_HISTORY_FOR_SIMILARITY: usize = 10;
const SIMILARITY_THRESHOLD: f64 = 10.0;

#[derive(Debug, Clone)]
struct Observation {
    metrics: ConcurrencyMetrics,
}

/// Nearest-neighbor-over-recent-observations advisory predictor.
pub struct WorkloadPredictor {
    history: VecDeque<Observation>,
}

impl WorkloadPredictor {
    pub fn new() -> Self {
        Self { history: VecDeque::with_capacity(HISTORY_LEN) }
    }

    /// Records a `(metrics, decision)` pair for future similarity lookups.
    /// `decision` is accepted for parity with the source algorithm's log but
    /// is not currently used in the similarity computation.
    pub fn add_observation(&mut self, metrics: ConcurrencyMetrics, _decision: &str) {
        if self.history.len() == HISTORY_LEN {
            self.history.pop_front();
        }
        self.history.push_back(Observation { metrics });
    }

    /// Predicts an optimal worker count given current metrics and bounds.
    ///
    /// With fewer than 10 observations, falls back to a simple CPU-threshold
    /// heuristic. Otherwise averages `active_workers` across historical
    /// observations whose cpu/memory were each within 10 points of `current`.
    pub fn predict_optimal_workers(
        &self,
        current: ConcurrencyMetrics,
        min_workers: usize,
        max_workers: usize,
    ) -> usize {
        if self.history.len() < MIN_HISTORY_FOR_SIMILARITY {
            if current.cpu_percent > 80.0 {
                return (current.active_workers + 2).min(max_workers);
            }
            if current.cpu_percent < 40.0 {
                return current.active_workers.saturating_sub(1).max(min_workers);
            }
            return current.active_workers;
        }

        let similar: Vec<&Observation> = self
            .history
            .iter()
            .filter(|obs| {
                (obs.metrics.cpu_percent - current.cpu_percent).abs() < SIMILARITY_THRESHOLD
                    && (obs.metrics.memory_percent - current.memory_percent).abs() < SIMILARITY_THRESHOLD
            })
            .collect();

        if similar.is_empty() {
            return current.active_workers;
        }

        let mean_workers = similar.iter().map(|o| o.metrics.active_workers as f64).sum::<f64>()
            / similar.len() as f64;
        (mean_workers.round() as usize).clamp(min_workers, max_workers)
    }
}

impl Default for WorkloadPredictor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(cpu: f64, mem: f64, workers: usize) -> ConcurrencyMetrics {
        ConcurrencyMetrics {
            cpu_percent: cpu,
            memory_percent: mem,
            active_workers: workers,
            queue_size: 0,
            avg_processing_time_secs: 1.0,
        }
    }

    #[test]
    fn falls_back_to_cpu_heuristic_with_sparse_history() {
        let predictor = WorkloadPredictor::new();
        let busy = metrics(90.0, 50.0, 4);
        assert_eq!(predictor.predict_optimal_workers(busy, 1, 10), 6);

        let idle = metrics(10.0, 50.0, 4);
        assert_eq!(predictor.predict_optimal_workers(idle, 1, 10), 3);
    }

    #[test]
    fn averages_similar_historical_situations() {
        let mut predictor = WorkloadPredictor::new();
        for _ in 0..MIN_HISTORY_FOR_SIMILARITY {
            predictor.add_observation(metrics(50.0, 50.0, 5), "stable");
        }
        let current = metrics(52.0, 48.0, 1);
        assert_eq!(predictor.predict_optimal_workers(current, 1, 10), 5);
    }

    #[test]
    fn falls_back_to_current_when_no_similar_situations_found() {
        let mut predictor = WorkloadPredictor::new();
        for _ in 0..MIN_HISTORY_FOR_SIMILARITY {
            predictor.add_observation(metrics(10.0, 10.0, 2), "stable");
        }
        let current = metrics(90.0, 90.0, 7);
        assert_eq!(predictor.predict_optimal_workers(current, 1, 10), 7);
    }

    #[test]
    fn clamps_prediction_to_bounds() {
        let mut predictor = WorkloadPredictor::new();
        for _ in 0..MIN_HISTORY_FOR_SIMILARITY {
            predictor.add_observation(metrics(50.0, 50.0, 20), "stable");
        }
        let current = metrics(50.0, 50.0, 20);
        assert_eq!(predictor.predict_optimal_workers(current, 1, 10), 10);
    }
}
