//! Error types for lifecycle operations.
//!
//! Errors are cloneable so the deduplicator can fan one failure out to every
//! attached waiter.

use thiserror::Error;

/// Result type alias for lifecycle operations.
pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Errors that can occur while driving a data stream's lifecycle.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    /// A downstream administrative request was rejected or failed in
    /// transport.
    #[error("request failed: {message}")]
    Request {
        /// Description of the failure.
        message: String,
    },

    /// A force merge completed on fewer shards than it targeted, or
    /// reported shard failures.
    #[error(
        "force merge of [{index}] incomplete: {successful_shards}/{total_shards} shards successful, {failed_shards} failed"
    )]
    ForceMergeIncomplete {
        /// Index that was force merged.
        index: String,
        /// Shards the merge targeted.
        total_shards: u32,
        /// Shards that completed the merge.
        successful_shards: u32,
        /// Shards that reported failures.
        failed_shards: u32,
    },

    /// Publishing the force-merge completion marker failed.
    #[error("cluster state update failed: {message}")]
    StateUpdate {
        /// Description of the failure.
        message: String,
    },

    /// The service configuration was rejected at construction.
    #[error("invalid lifecycle configuration: {message}")]
    InvalidConfig {
        /// Description of the rejected value.
        message: String,
    },
}
