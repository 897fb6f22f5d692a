//! # tidemark-scaling
//!
//! Adaptive allocation scaler for inference model deployments.
//!
//! A periodic control loop polls per-deployment inference statistics across
//! nodes, computes the recent delta against the previous poll, feeds each
//! deployment's [`AdaptiveAllocationsScaler`], and dispatches allocation
//! count updates subject to the assignment's min/max bounds. Scalers are
//! reconciled against the cluster state on every change: assignments with
//! adaptive allocations enabled get a scaler, everything else loses it.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod error;
pub mod metrics;
pub mod scaler;
pub mod service;
pub mod stats;

pub use error::{Result, ScalingError};
pub use scaler::AdaptiveAllocationsScaler;
pub use service::{
    AdaptiveAllocationsScalerService, AssignmentStats, DeploymentStatsResponse, InferenceClient,
    NodeInferenceStats, ScalingServiceConfig, UpdateDeploymentRequest, DEFAULT_POLL_INTERVAL,
};
pub use stats::Stats;
