//! Rollover conditions and their automatic resolution.
//!
//! A [`RolloverConfiguration`] couples concrete, operator-supplied
//! conditions with a set of *automatic* condition names the controller
//! fills in itself. The only automatic condition today is `max_age`: it
//! defaults to 30 days, and a shorter stream retention takes its place so
//! an index never outlives the data it holds just because it was the write
//! index.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::requests::RolloverRequest;

/// Default automatic max-age rollover condition: 30 days.
pub const DEFAULT_AUTOMATIC_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Name of the max-age condition in the automatic set.
pub const MAX_AGE_CONDITION: &str = "max_age";

/// Conditions under which a rollover fires.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloverConditions {
    /// Maximum age of the write index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<Duration>,
    /// Maximum document count of the write index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_docs: Option<u64>,
    /// Maximum size of the write index, in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size_bytes: Option<u64>,
    /// Minimum document count gating any rollover.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_docs: Option<u64>,
}

impl RolloverConditions {
    /// Creates empty conditions.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the max-age condition.
    #[must_use]
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Sets the max-docs condition.
    #[must_use]
    pub fn with_max_docs(mut self, max_docs: u64) -> Self {
        self.max_docs = Some(max_docs);
        self
    }

    /// Sets the max-size condition.
    #[must_use]
    pub fn with_max_size_bytes(mut self, max_size_bytes: u64) -> Self {
        self.max_size_bytes = Some(max_size_bytes);
        self
    }

    /// Sets the min-docs condition.
    #[must_use]
    pub fn with_min_docs(mut self, min_docs: u64) -> Self {
        self.min_docs = Some(min_docs);
        self
    }
}

/// Concrete rollover conditions plus the names of automatic ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolloverConfiguration {
    /// Operator-supplied conditions, used as-is.
    pub concrete: RolloverConditions,
    /// Condition names the controller resolves itself.
    pub automatic: BTreeSet<String>,
}

impl RolloverConfiguration {
    /// Creates a configuration with the given concrete conditions and no
    /// automatic ones.
    #[must_use]
    pub fn new(concrete: RolloverConditions) -> Self {
        Self {
            concrete,
            automatic: BTreeSet::new(),
        }
    }

    /// Marks `max_age` as automatically resolved.
    #[must_use]
    pub fn with_automatic_max_age(mut self) -> Self {
        self.automatic.insert(MAX_AGE_CONDITION.to_string());
        self
    }

    /// Resolves the effective conditions for a stream with the given
    /// retention.
    ///
    /// When `max_age` is in the automatic set, the resolved max-age is the
    /// default (30 days), or the retention when the retention is shorter.
    /// Without automatic conditions the concrete conditions are returned
    /// unchanged.
    #[must_use]
    pub fn resolve(&self, retention: Option<Duration>) -> RolloverConditions {
        let mut conditions = self.concrete.clone();
        if self.automatic.contains(MAX_AGE_CONDITION) {
            let max_age = match retention {
                Some(retention) if retention < DEFAULT_AUTOMATIC_MAX_AGE => retention,
                _ => DEFAULT_AUTOMATIC_MAX_AGE,
            };
            conditions.max_age = Some(max_age);
        }
        conditions
    }
}

/// Builds the rollover request the controller issues for a data stream.
#[must_use]
pub fn default_rollover_request(
    configuration: &RolloverConfiguration,
    target: &str,
    retention: Option<Duration>,
) -> RolloverRequest {
    RolloverRequest {
        target: target.to_string(),
        conditions: configuration.resolve(retention),
    }
}
