//! # tidemark-lifecycle
//!
//! Master-side lifecycle controller for append-only data streams.
//!
//! On every published cluster state the controller drives each managed
//! backing index through the sequence *rollover → merge-policy adjustment →
//! force-merge → retention-delete*:
//!
//! - the stream's write index is rolled over (one rollover per stream per
//!   run, with an automatic max-age condition),
//! - non-write indices past retention are deleted,
//! - younger indices first get the target merge policy applied, then a
//!   one-shot force merge whose completion is stamped into the index's
//!   custom metadata so it is never repeated.
//!
//! All outbound requests flow through an [`ActionDeduplicator`] so repeated
//! runs over an unchanged state issue nothing new, and per-index failures
//! are remembered in an [`ErrorStore`] until the next run retries them.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod client;
pub mod dedup;
pub mod error;
pub mod error_store;
pub mod merge_task;
pub mod metrics;
pub mod requests;
pub mod rollover;
pub mod service;

pub use client::LifecycleClient;
pub use dedup::ActionDeduplicator;
pub use error::{LifecycleError, Result};
pub use error_store::{ErrorRecord, ErrorStore};
pub use merge_task::{
    UpdateForceMergeCompleteTask, FORCE_MERGE_COMPLETED_TIMESTAMP_METADATA_KEY,
    LIFECYCLE_CUSTOM_INDEX_METADATA_KEY,
};
pub use requests::{
    DeleteIndexRequest, ForceMergeRequest, ForceMergeRequestKey, ForceMergeResponse,
    RolloverRequest, RolloverResponse, UpdateSettingsRequest,
};
pub use rollover::{
    default_rollover_request, RolloverConditions, RolloverConfiguration,
    DEFAULT_AUTOMATIC_MAX_AGE, MAX_AGE_CONDITION,
};
pub use service::{
    ActionKey, DataStreamLifecycleService, LifecycleServiceConfig,
    MERGE_POLICY_FLOOR_SEGMENT_SETTING, MERGE_POLICY_MERGE_FACTOR_SETTING, ONE_HUNDRED_MB,
    TARGET_MERGE_FACTOR_VALUE,
};
