//! Per-deployment allocation estimator.
//!
//! The estimator is deterministic given its inputs and prior state. Each
//! poll interval it derives a concurrent-demand measurement from the recent
//! stats delta — Little's law (`request rate × average inference time`),
//! falling back to the pending backlog when no timing signal exists — and
//! smooths it with a fixed-factor exponential moving average. `scale`
//! proposes the ceiling of the smoothed load, clamped to the configured
//! bounds, and proposes nothing when the last interval carried no requests
//! or the proposal equals the current allocation count.

use crate::stats::Stats;

/// Weight of the newest measurement in the moving average.
const LOAD_SMOOTHING_FACTOR: f64 = 0.5;

/// Stateful estimator deciding the target allocation count of one
/// deployment.
#[derive(Debug, Clone)]
pub struct AdaptiveAllocationsScaler {
    deployment_id: String,
    current_allocations: u32,
    min_allocations: Option<u32>,
    max_allocations: Option<u32>,
    load_estimate: Option<f64>,
    proposal_ready: bool,
}

impl AdaptiveAllocationsScaler {
    /// Creates a scaler starting from the deployment's current target.
    #[must_use]
    pub fn new(deployment_id: impl Into<String>, initial_allocations: u32) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            current_allocations: initial_allocations,
            min_allocations: None,
            max_allocations: None,
            load_estimate: None,
            proposal_ready: false,
        }
    }

    /// The deployment this scaler decides for.
    #[must_use]
    pub fn deployment_id(&self) -> &str {
        &self.deployment_id
    }

    /// Allocation count the scaler currently assumes.
    #[must_use]
    pub fn current_allocations(&self) -> u32 {
        self.current_allocations
    }

    /// Updates the allocation bounds from the assignment.
    pub fn set_min_max_allocations(&mut self, min: Option<u32>, max: Option<u32>) {
        if self.min_allocations != min || self.max_allocations != max {
            tracing::debug!(
                deployment = %self.deployment_id,
                ?min,
                ?max,
                "allocation bounds updated"
            );
        }
        self.min_allocations = min;
        self.max_allocations = max;
    }

    /// Feeds one interval's recent stats into the estimator.
    ///
    /// `observed_allocations` is the allocation count reported by the stats
    /// response; when present it replaces the scaler's assumption so a
    /// scale request is never proposed against stale state.
    #[allow(clippy::cast_precision_loss)]
    pub fn process(&mut self, stats: &Stats, interval_seconds: f64, observed_allocations: Option<u32>) {
        if let Some(observed) = observed_allocations {
            self.current_allocations = observed;
        }

        if stats.request_count() <= 0 || interval_seconds <= 0.0 {
            self.proposal_ready = false;
            return;
        }

        let avg_inference_time = if stats.avg_inference_time.is_finite() {
            stats.avg_inference_time.max(0.0)
        } else {
            0.0
        };
        let request_rate = stats.request_count() as f64 / interval_seconds;
        let mut measured = request_rate * avg_inference_time;
        if measured <= 0.0 {
            measured = stats.pending_count.max(0) as f64;
        }
        if measured <= 0.0 {
            self.proposal_ready = false;
            return;
        }

        let smoothed = match self.load_estimate {
            None => measured,
            Some(previous) => {
                LOAD_SMOOTHING_FACTOR * measured + (1.0 - LOAD_SMOOTHING_FACTOR) * previous
            }
        };
        self.load_estimate = Some(smoothed);
        self.proposal_ready = true;

        tracing::debug!(
            deployment = %self.deployment_id,
            load = smoothed,
            rate = request_rate,
            avg_inference_time,
            "processed inference stats"
        );
    }

    /// Returns the new allocation count to request, or `None` for no
    /// change. The output always satisfies `min <= output <= max` for
    /// whichever bounds are set.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn scale(&mut self) -> Option<u32> {
        if !self.proposal_ready {
            return None;
        }
        self.proposal_ready = false;

        let load = self.load_estimate?;
        let mut desired = load.ceil().max(1.0) as u32;
        if let Some(min) = self.min_allocations {
            desired = desired.max(min);
        }
        if let Some(max) = self.max_allocations {
            desired = desired.min(max);
        }

        if desired == self.current_allocations {
            return None;
        }
        self.current_allocations = desired;
        Some(desired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_signal_proposes_nothing() {
        let mut scaler = AdaptiveAllocationsScaler::new("deploy-a", 2);
        scaler.process(&Stats::zero(), 10.0, Some(2));
        assert_eq!(scaler.scale(), None);
    }

    #[test]
    fn scale_without_process_proposes_nothing() {
        let mut scaler = AdaptiveAllocationsScaler::new("deploy-a", 2);
        assert_eq!(scaler.scale(), None);
    }

    #[test]
    fn demand_above_current_scales_up() {
        let mut scaler = AdaptiveAllocationsScaler::new("deploy-a", 1);
        // 70 requests over 10 s at 1 s each: load 7.
        scaler.process(&Stats::new(70, 0, 0, 1.0), 10.0, Some(1));
        assert_eq!(scaler.scale(), Some(7));
        assert_eq!(scaler.current_allocations(), 7);
    }

    #[test]
    fn output_is_clamped_to_bounds() {
        let mut scaler = AdaptiveAllocationsScaler::new("deploy-a", 2);
        scaler.set_min_max_allocations(Some(1), Some(4));
        // Load 7, bounds [1, 4]: proposal is 4.
        scaler.process(&Stats::new(70, 0, 0, 1.0), 10.0, Some(2));
        assert_eq!(scaler.scale(), Some(4));
    }

    #[test]
    fn minimum_bound_applies() {
        let mut scaler = AdaptiveAllocationsScaler::new("deploy-a", 5);
        scaler.set_min_max_allocations(Some(3), Some(10));
        // Load well below one allocation.
        scaler.process(&Stats::new(1, 0, 0, 0.01), 10.0, Some(5));
        assert_eq!(scaler.scale(), Some(3));
    }

    #[test]
    fn no_op_proposal_is_suppressed() {
        let mut scaler = AdaptiveAllocationsScaler::new("deploy-a", 2);
        // Load 1.6 rounds up to 2, which matches the current count.
        scaler.process(&Stats::new(16, 0, 0, 1.0), 10.0, Some(2));
        assert_eq!(scaler.scale(), None);
    }

    #[test]
    fn proposal_is_consumed_by_scale() {
        let mut scaler = AdaptiveAllocationsScaler::new("deploy-a", 1);
        scaler.process(&Stats::new(70, 0, 0, 1.0), 10.0, Some(1));
        assert_eq!(scaler.scale(), Some(7));
        // Without a new measurement the scaler stays silent.
        assert_eq!(scaler.scale(), None);
    }

    #[test]
    fn pending_backlog_substitutes_for_missing_timing() {
        let mut scaler = AdaptiveAllocationsScaler::new("deploy-a", 1);
        // No successes, so the average is NaN; 5 pending requests stand in.
        scaler.process(&Stats::new(0, 5, 0, f64::NAN), 10.0, Some(1));
        assert_eq!(scaler.scale(), Some(5));
    }

    #[test]
    fn observed_allocations_reset_the_assumption() {
        let mut scaler = AdaptiveAllocationsScaler::new("deploy-a", 1);
        scaler.process(&Stats::new(70, 0, 0, 1.0), 10.0, Some(7));
        // Load 7 equals the observed count: no request.
        assert_eq!(scaler.scale(), None);
    }

    #[test]
    fn smoothing_damps_load_swings() {
        let mut scaler = AdaptiveAllocationsScaler::new("deploy-a", 1);
        scaler.process(&Stats::new(80, 0, 0, 1.0), 10.0, Some(1));
        assert_eq!(scaler.scale(), Some(8));
        // Demand collapses to 1; the average of 8 and 1 keeps the proposal
        // above the raw measurement.
        scaler.process(&Stats::new(10, 0, 0, 1.0), 10.0, None);
        assert_eq!(scaler.scale(), Some(5));
    }
}
