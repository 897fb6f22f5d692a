//! Shared test utilities for Tidemark integration tests.
//!
//! This crate provides:
//! - [`SimulatedClock`]: deterministic, manually advanced time
//! - [`RecordingLifecycleClient`] / [`RecordingInferenceClient`]: request
//!   recorders with scripted per-action behavior
//! - Factory functions for building cluster-state fixtures
//! - [`assert_eventually`]: bounded polling for work done by spawned tasks

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
// Test utilities use expect/unwrap for cleaner test code - panics are acceptable here
#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::missing_panics_doc)]

pub mod assertions;
pub mod clients;
pub mod clock;
pub mod fixtures;

pub use assertions::assert_eventually;
pub use clients::{
    ForceMergeBehavior, RecordingInferenceClient, RecordingLifecycleClient, RolloverBehavior,
    SeenRequest, UnitBehavior,
};
pub use clock::SimulatedClock;
pub use fixtures::{
    backing_index_name, data_stream_state, deployment_state, merge_policy_settings,
    retention_days,
};
