//! Inference statistics arithmetic.
//!
//! A [`Stats`] snapshot aggregates one node's counters for one deployment:
//! successes, pending requests, failures (errors + timeouts + rejections)
//! and the average inference time in *seconds*. Counters are signed because
//! pending counts are gauges whose deltas may legitimately go negative.
//!
//! `add` and `sub` maintain the invariant
//! `total_inference_time = success_count × avg_inference_time`; the
//! recomputed average is NaN whenever the resulting success count is not
//! positive. Subtracting across a counter reset (the prior snapshot's
//! success count exceeding the newer one) yields the newer snapshot
//! unchanged, treating the prior as absent.

/// Point-in-time inference counters of one `(deployment, node)` pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    /// Completed inferences.
    pub success_count: i64,
    /// Requests currently queued or running.
    pub pending_count: i64,
    /// Failed inferences: errors + timeouts + rejected executions.
    pub failed_count: i64,
    /// Average inference time in seconds, NaN when unknown.
    pub avg_inference_time: f64,
}

impl Stats {
    /// Creates a snapshot.
    #[must_use]
    pub fn new(
        success_count: i64,
        pending_count: i64,
        failed_count: i64,
        avg_inference_time: f64,
    ) -> Self {
        Self {
            success_count,
            pending_count,
            failed_count,
            avg_inference_time,
        }
    }

    /// A snapshot with all counters at zero.
    #[must_use]
    pub fn zero() -> Self {
        Self::new(0, 0, 0, 0.0)
    }

    /// Total requests observed: successes + pending + failures.
    #[must_use]
    pub fn request_count(&self) -> i64 {
        self.success_count + self.pending_count + self.failed_count
    }

    /// Total time spent on successful inferences, in seconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn total_inference_time(&self) -> f64 {
        if self.success_count > 0 {
            self.success_count as f64 * self.avg_inference_time
        } else {
            0.0
        }
    }

    /// Component-wise sum, with the average recomputed from total times.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn add(&self, other: &Stats) -> Stats {
        let success_count = self.success_count + other.success_count;
        let avg_inference_time = if success_count > 0 {
            (self.total_inference_time() + other.total_inference_time()) / success_count as f64
        } else {
            f64::NAN
        };
        Stats {
            success_count,
            pending_count: self.pending_count + other.pending_count,
            failed_count: self.failed_count + other.failed_count,
            avg_inference_time,
        }
    }

    /// Component-wise difference against an earlier snapshot, with the
    /// average recomputed from total times.
    ///
    /// When `prior.success_count` exceeds this snapshot's, the counters
    /// have been reset in between; the prior is treated as absent and this
    /// snapshot is returned unchanged.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn sub(&self, prior: &Stats) -> Stats {
        if prior.success_count > self.success_count {
            return *self;
        }
        let success_count = self.success_count - prior.success_count;
        let avg_inference_time = if success_count > 0 {
            (self.total_inference_time() - prior.total_inference_time()) / success_count as f64
        } else {
            f64::NAN
        };
        Stats {
            success_count,
            pending_count: self.pending_count - prior.pending_count,
            failed_count: self.failed_count - prior.failed_count,
            avg_inference_time,
        }
    }
}
