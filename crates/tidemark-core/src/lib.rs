//! # tidemark-core
//!
//! Core abstractions for the Tidemark cluster control loops.
//!
//! This crate provides the foundational types and traits used across all
//! Tidemark components:
//!
//! - **Cluster Model**: Immutable cluster-state snapshots (data streams,
//!   backing indices, graveyard tombstones, deployment assignments)
//! - **Cluster Service**: Current-state holder with listener fan-out and
//!   publication-driven state-update tasks
//! - **Clock**: Epoch-millisecond time source behind a trait
//! - **Scheduler**: Fixed-delay scheduling with a cancellable handle
//! - **Error Types**: Shared error definitions and result types
//!
//! ## Crate Boundary
//!
//! `tidemark-core` is the **only** crate allowed to define shared primitives.
//! The lifecycle and scaling controllers depend on this crate and never on
//! each other.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod clock;
pub mod cluster;
pub mod cluster_service;
pub mod error;
pub mod scheduler;

pub use clock::{Clock, SystemClock};
pub use cluster::{
    AdaptiveAllocationsSettings, ClusterMetadata, ClusterNodes, ClusterState, DataStream,
    DeploymentAssignment, DownsamplingRound, IndexGraveyard, IndexMetadata, IndexTombstone,
    LifecycleSpec, RolloverInfo, Settings, LIFECYCLE_POLICY_NAME_SETTING,
};
pub use cluster_service::{
    ClusterChangedEvent, ClusterService, ClusterStateListener, ClusterStateUpdateTask,
};
pub use error::{Error, Result};
pub use scheduler::{ScheduleError, ScheduleHandle, Scheduler, TokioScheduler};
