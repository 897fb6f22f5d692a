//! Client seam for dispatching administrative actions.

use async_trait::async_trait;

use crate::error::Result;
use crate::requests::{
    DeleteIndexRequest, ForceMergeRequest, ForceMergeResponse, RolloverRequest, RolloverResponse,
    UpdateSettingsRequest,
};

/// Dispatches typed administrative actions against the cluster.
///
/// The lifecycle controller spawns these calls and never awaits them inside
/// `run`; completions update only the error store and the deduplicator.
///
/// ## Thread Safety
///
/// All methods are `Send + Sync` to support dispatch from the applier
/// thread and completion on executor threads.
#[async_trait]
pub trait LifecycleClient: Send + Sync {
    /// Rolls a data stream over to a new write index.
    async fn rollover(&self, request: RolloverRequest) -> Result<RolloverResponse>;

    /// Deletes a single index.
    async fn delete_index(&self, request: DeleteIndexRequest) -> Result<()>;

    /// Applies settings to a single index.
    async fn update_settings(&self, request: UpdateSettingsRequest) -> Result<()>;

    /// Force merges one or more indices.
    async fn force_merge(&self, request: ForceMergeRequest) -> Result<ForceMergeResponse>;
}
