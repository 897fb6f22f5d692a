//! Cluster-state update task stamping force-merge completion.

use std::sync::{Arc, Mutex, PoisonError};

use tidemark_core::{Clock, ClusterState, ClusterStateUpdateTask};

/// Custom-metadata namespace owned by the lifecycle controller.
pub const LIFECYCLE_CUSTOM_INDEX_METADATA_KEY: &str = "data_stream_lifecycle";

/// Key of the force-merge completion timestamp within the namespace.
pub const FORCE_MERGE_COMPLETED_TIMESTAMP_METADATA_KEY: &str = "force_merge_completed_timestamp";

type CompletionListener = Box<dyn FnOnce(tidemark_core::Result<()>) + Send>;

/// Stamps `force_merge_completed_timestamp` into the target index's
/// `data_stream_lifecycle` custom metadata.
///
/// `execute` is a pure transform and never invokes the listener; only the
/// publication acknowledgment (or its failure) does, exactly once. Entries
/// already present in the namespace are preserved.
pub struct UpdateForceMergeCompleteTask {
    target_index: String,
    clock: Arc<dyn Clock>,
    listener: Mutex<Option<CompletionListener>>,
}

impl UpdateForceMergeCompleteTask {
    /// Creates a task stamping `target_index` at the clock's current time.
    pub fn new(
        target_index: impl Into<String>,
        clock: Arc<dyn Clock>,
        listener: impl FnOnce(tidemark_core::Result<()>) + Send + 'static,
    ) -> Self {
        Self {
            target_index: target_index.into(),
            clock,
            listener: Mutex::new(Some(Box::new(listener))),
        }
    }

    fn take_listener(&self) -> Option<CompletionListener> {
        self.listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl ClusterStateUpdateTask for UpdateForceMergeCompleteTask {
    fn execute(&self, state: &ClusterState) -> tidemark_core::Result<ClusterState> {
        let mut next = state.clone();
        let Some(index) = next.metadata.indices.get_mut(&self.target_index) else {
            // Index deleted while the merge was in flight; nothing to stamp.
            return Ok(next);
        };

        index
            .custom_metadata
            .entry(LIFECYCLE_CUSTOM_INDEX_METADATA_KEY.to_string())
            .or_default()
            .insert(
                FORCE_MERGE_COMPLETED_TIMESTAMP_METADATA_KEY.to_string(),
                self.clock.now_millis().to_string(),
            );
        Ok(next)
    }

    fn cluster_state_published(&self) {
        if let Some(listener) = self.take_listener() {
            listener(Ok(()));
        }
    }

    fn on_failure(&self, error: tidemark_core::Error) {
        if let Some(listener) = self.take_listener() {
            listener(Err(error));
        }
    }
}
