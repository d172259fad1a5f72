//! Queue alert thresholds for `size` and `wait_time`.
//!
//! Re-evaluated after every enqueue and dequeue; the active list is recomputed
//! from scratch each time (no deduplication across evaluations — a consumer that
//! wants debouncing does it on its own side).

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Alert {
    SizeExceeded { size: usize, threshold: usize },
    WaitTimeExceeded { wait_time_secs: f64, threshold_secs: f64 },
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlertThresholds {
    size: Option<usize>,
    wait_time_secs: Option<f64>,
}

impl AlertThresholds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_size_threshold(&mut self, value: usize) {
        self.size = Some(value);
    }

    pub fn set_wait_time_threshold(&mut self, value_secs: f64) {
        self.wait_time_secs = Some(value_secs);
    }

    /// Recomputes the full set of currently active alerts from live metrics.
    pub fn evaluate(&self, size: usize, avg_wait_time_secs: f64) -> Vec<Alert> {
        let mut alerts = Vec::new();

        if let Some(threshold) = self.size {
            if size >= threshold {
                alerts.push(Alert::SizeExceeded { size, threshold });
            }
        }

        if let Some(threshold) = self.wait_time_secs {
            if avg_wait_time_secs >= threshold {
                alerts.push(Alert::WaitTimeExceeded {
                    wait_time_secs: avg_wait_time_secs,
                    threshold_secs: threshold,
                });
            }
        }

        alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_alerts_when_no_thresholds_set() {
        let thresholds = AlertThresholds::new();
        assert!(thresholds.evaluate(1000, 999.0).is_empty());
    }

    #[test]
    fn size_alert_fires_at_or_above_threshold() {
        let mut thresholds = AlertThresholds::new();
        thresholds.set_size_threshold(50);
        assert!(thresholds.evaluate(49, 0.0).is_empty());
        assert_eq!(thresholds.evaluate(50, 0.0), vec![Alert::SizeExceeded { size: 50, threshold: 50 }]);
    }

    #[test]
    fn both_alerts_can_fire_together() {
        let mut thresholds = AlertThresholds::new();
        thresholds.set_size_threshold(10);
        thresholds.set_wait_time_threshold(2.0);
        let alerts = thresholds.evaluate(20, 5.0);
        assert_eq!(alerts.len(), 2);
    }
}
