//! Observability metrics for the lifecycle controller.
//!
//! Metrics are exposed via the `metrics` crate facade. Recording is a no-op
//! until a recorder (e.g. a Prometheus exporter) is installed by the
//! embedding process.

use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: lifecycle runs executed on this node.
    pub const RUNS_TOTAL: &str = "tidemark_lifecycle_runs_total";
    /// Counter: outbound lifecycle actions by kind.
    pub const ACTIONS_TOTAL: &str = "tidemark_lifecycle_actions_total";
    /// Histogram: duration of one lifecycle run in seconds.
    pub const RUN_DURATION_SECONDS: &str = "tidemark_lifecycle_run_duration_seconds";
    /// Gauge: indices with a recorded transient error.
    pub const ERROR_STORE_ENTRIES: &str = "tidemark_lifecycle_error_store_entries";
}

/// Label keys used across metrics.
pub mod labels {
    /// Action kind (rollover, delete, `update_settings`, `force_merge`).
    pub const ACTION: &str = "action";
}

/// Records one lifecycle run.
pub fn record_run() {
    counter!(names::RUNS_TOTAL).increment(1);
}

/// Records one outbound action of the given kind.
pub fn record_action(action: &str) {
    counter!(
        names::ACTIONS_TOTAL,
        labels::ACTION => action.to_string(),
    )
    .increment(1);
}

/// Updates the error-store size gauge.
#[allow(clippy::cast_precision_loss)] // Gauge values are small
pub fn set_error_store_entries(entries: usize) {
    gauge!(names::ERROR_STORE_ENTRIES).set(entries as f64);
}

/// RAII guard recording the duration of one lifecycle run on drop.
pub struct RunTimer {
    start: Instant,
}

impl RunTimer {
    /// Starts timing a run.
    #[must_use]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed time since the timer started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Default for RunTimer {
    fn default() -> Self {
        Self::start()
    }
}

impl Drop for RunTimer {
    fn drop(&mut self) {
        histogram!(names::RUN_DURATION_SECONDS).record(self.start.elapsed().as_secs_f64());
    }
}
