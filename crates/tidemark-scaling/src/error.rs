//! Error types for scaling operations.

use thiserror::Error;

/// Result type alias for scaling operations.
pub type Result<T> = std::result::Result<T, ScalingError>;

/// Errors that can occur in the adaptive allocations scaler.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScalingError {
    /// The deployment stats request failed.
    #[error("stats request failed: {message}")]
    Stats {
        /// Description of the failure.
        message: String,
    },

    /// Dispatching an allocation update failed.
    #[error("deployment update failed: {message}")]
    Update {
        /// Description of the failure.
        message: String,
    },

    /// The service configuration was rejected at construction.
    #[error("invalid scaling configuration: {message}")]
    InvalidConfig {
        /// Description of the rejected value.
        message: String,
    },

    /// The periodic tick could not be scheduled for a reason other than
    /// executor shutdown.
    #[error("scheduling rejected: {message}")]
    Schedule {
        /// Description of the rejection.
        message: String,
    },
}
