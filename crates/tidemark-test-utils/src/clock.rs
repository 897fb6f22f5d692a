//! Deterministic simulated clock.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tidemark_core::Clock;

/// Simulated clock for deterministic time control.
///
/// The clock starts at a base time and only moves when advanced manually.
#[derive(Debug)]
pub struct SimulatedClock {
    base_ms: i64,
    elapsed_ms: AtomicI64,
}

impl SimulatedClock {
    /// Creates a clock starting at the given time.
    pub fn new(base: DateTime<Utc>) -> Self {
        Self::at_millis(base.timestamp_millis())
    }

    /// Creates a clock starting at the given epoch-millisecond timestamp.
    pub fn at_millis(base_ms: i64) -> Self {
        Self {
            base_ms,
            elapsed_ms: AtomicI64::new(0),
        }
    }

    /// Advances the clock by the given duration.
    pub fn advance(&self, duration: Duration) {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        self.advance_millis(millis);
    }

    /// Advances the clock by the given number of milliseconds.
    pub fn advance_millis(&self, millis: i64) {
        self.elapsed_ms.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for SimulatedClock {
    fn now_millis(&self) -> i64 {
        self.base_ms + self.elapsed_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_moves_when_advanced() {
        let clock = SimulatedClock::at_millis(1_000);
        assert_eq!(clock.now_millis(), 1_000);
        assert_eq!(clock.now_millis(), 1_000);

        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.now_millis(), 3_000);

        clock.advance_millis(500);
        assert_eq!(clock.now_millis(), 3_500);
    }
}
