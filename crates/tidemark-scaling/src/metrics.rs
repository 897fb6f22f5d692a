//! Observability metrics for the adaptive allocations scaler.

use metrics::{counter, gauge};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: scaler ticks by outcome.
    pub const TICKS_TOTAL: &str = "tidemark_scaling_ticks_total";
    /// Counter: allocation update dispatches by result.
    pub const UPDATES_TOTAL: &str = "tidemark_scaling_updates_total";
    /// Gauge: deployments currently managed by a scaler.
    pub const ACTIVE_SCALERS: &str = "tidemark_scaling_active_scalers";
}

/// Label keys used across metrics.
pub mod labels {
    /// Tick outcome (success, `stats_failed`).
    pub const STATUS: &str = "status";
    /// Update result (success, failure).
    pub const RESULT: &str = "result";
}

/// Records one scaler tick with its outcome.
pub fn record_tick(status: &str) {
    counter!(
        names::TICKS_TOTAL,
        labels::STATUS => status.to_string(),
    )
    .increment(1);
}

/// Records one allocation update dispatch.
pub fn record_update(result: &str) {
    counter!(
        names::UPDATES_TOTAL,
        labels::RESULT => result.to_string(),
    )
    .increment(1);
}

/// Updates the active-scalers gauge.
#[allow(clippy::cast_precision_loss)] // Gauge values are small
pub fn set_active_scalers(count: usize) {
    gauge!(names::ACTIVE_SCALERS).set(count as f64);
}
