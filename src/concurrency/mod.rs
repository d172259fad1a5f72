//! Adaptive Concurrency Controller (C12): resource-driven worker pool sizing.

pub mod controller;
pub mod predictor;

pub use controller::{
    ConcurrencyController, ConcurrencyControllerBuilder, ConcurrencyMetrics, ControllerConfigError,
    ScalingDecision, ScalingDirection, ScalingHistoryEntry, ScalingStrategy,
};
pub use predictor::WorkloadPredictor;
