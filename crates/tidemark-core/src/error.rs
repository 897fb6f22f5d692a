//! Error types shared across Tidemark components.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in core cluster operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// An index referenced by an operation is not part of the cluster state.
    #[error("index not found: {name}")]
    IndexNotFound {
        /// Name of the missing index.
        name: String,
    },

    /// A configuration value was rejected during validation.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the rejected value.
        message: String,
    },

    /// A cluster-state update task could not be applied or published.
    #[error("cluster state update failed: {message}")]
    StateUpdate {
        /// Description of the failure.
        message: String,
    },
}
