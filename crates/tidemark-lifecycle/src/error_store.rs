//! Per-index transient error memory.
//!
//! The store remembers the most recent failure per backing index together
//! with an occurrence count. Entries are cleared when the action later
//! succeeds, and [`ErrorStore::reconcile`] lazily drops entries for indices
//! that were deleted (confirmed via the graveyard) or left lifecycle
//! management.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tidemark_core::ClusterState;

/// The latest recorded failure of one index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorRecord {
    /// Message of the most recent failure.
    pub message: String,
    /// How many times a failure has been recorded since the last clear.
    pub occurrences: u32,
}

/// Thread-safe per-index error memory.
#[derive(Debug, Default)]
pub struct ErrorStore {
    entries: Mutex<HashMap<String, ErrorRecord>>,
}

impl ErrorStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ErrorRecord>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the latest failure of `index`, bumping its occurrence count.
    pub fn record(&self, index: &str, message: impl Into<String>) {
        let message = message.into();
        let mut entries = self.lock();
        entries
            .entry(index.to_string())
            .and_modify(|record| {
                record.message.clone_from(&message);
                record.occurrences += 1;
            })
            .or_insert(ErrorRecord {
                message,
                occurrences: 1,
            });
    }

    /// Removes the entry of `index`, if any.
    pub fn clear(&self, index: &str) {
        self.lock().remove(index);
    }

    /// Returns the latest recorded failure of `index`, if any.
    #[must_use]
    pub fn get(&self, index: &str) -> Option<ErrorRecord> {
        self.lock().get(index).cloned()
    }

    /// Number of indices with a recorded failure.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no failures are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drops entries for indices that left lifecycle management.
    ///
    /// An entry is dropped when its index is absent from the cluster and
    /// tombstoned in the graveyard, or when the index exists but is not in
    /// `managed_indices`. Entries for indices that are absent without a
    /// tombstone are kept: the snapshot may be partial.
    pub fn reconcile(&self, state: &ClusterState, managed_indices: &HashSet<String>) {
        let mut entries = self.lock();
        entries.retain(|index, _| {
            if state.metadata.index(index).is_some() {
                managed_indices.contains(index)
            } else {
                !state.metadata.graveyard.contains(index)
            }
        });
    }
}
