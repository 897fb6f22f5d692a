//! Typed administrative requests and responses.
//!
//! These are the outbound actions the lifecycle controller dispatches
//! through its client: rollover, delete-index, update-settings and
//! force-merge. [`ForceMergeRequestKey`] is the explicit value-equality
//! record used to deduplicate force merges; supervisory fields that vary
//! between retries (`parent_task`, `store_result`) are deliberately left
//! out of it.

use tidemark_core::Settings;

use crate::rollover::RolloverConditions;

/// Request to roll a data stream over to a new write index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolloverRequest {
    /// Data stream to roll over.
    pub target: String,
    /// Conditions under which the rollover fires.
    pub conditions: RolloverConditions,
}

/// Outcome of a rollover request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolloverResponse {
    /// Previous write index.
    pub old_index: String,
    /// Newly allocated write index.
    pub new_index: String,
    /// Whether the rollover actually happened.
    pub rolled_over: bool,
}

/// Request to delete a single index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteIndexRequest {
    /// Index to delete.
    pub index: String,
}

/// Request to update the settings of a single index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSettingsRequest {
    /// Index to update.
    pub index: String,
    /// Settings to apply.
    pub settings: Settings,
}

/// Request to force merge one or more indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForceMergeRequest {
    /// Indices to merge.
    pub indices: Vec<String>,
    /// Target segment count; `None` uses the engine default.
    pub max_num_segments: Option<u32>,
    /// Only expunge deleted documents instead of a full merge.
    pub only_expunge_deletes: bool,
    /// Flush after the merge.
    pub flush: bool,
    /// Caller-supplied request identity.
    pub request_id: Option<i64>,
    /// Supervising task, if any. Not part of request identity.
    pub parent_task: Option<String>,
    /// Whether the task result should be stored. Not part of request
    /// identity.
    pub store_result: bool,
}

impl ForceMergeRequest {
    /// Creates a default-parameter force merge of a single index.
    #[must_use]
    pub fn for_index(index: impl Into<String>) -> Self {
        Self {
            indices: vec![index.into()],
            max_num_segments: None,
            only_expunge_deletes: false,
            flush: true,
            request_id: None,
            parent_task: None,
            store_result: false,
        }
    }
}

/// Value-equality key of a force merge request.
///
/// Two keys are equal iff their `(indices multiset, only_expunge_deletes,
/// flush, max_num_segments, request_id)` tuples are equal. `parent_task`
/// and `store_result` are excluded so retries triggered by different
/// supervisory tasks collapse to one in-flight merge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForceMergeRequestKey {
    indices: Vec<String>,
    max_num_segments: Option<u32>,
    only_expunge_deletes: bool,
    flush: bool,
    request_id: Option<i64>,
}

impl From<&ForceMergeRequest> for ForceMergeRequestKey {
    fn from(request: &ForceMergeRequest) -> Self {
        let mut indices = request.indices.clone();
        indices.sort_unstable();
        Self {
            indices,
            max_num_segments: request.max_num_segments,
            only_expunge_deletes: request.only_expunge_deletes,
            flush: request.flush,
            request_id: request.request_id,
        }
    }
}

/// Outcome of a force merge request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForceMergeResponse {
    /// Shards the merge targeted.
    pub total_shards: u32,
    /// Shards that completed the merge.
    pub successful_shards: u32,
    /// Shards that reported failures.
    pub failed_shards: u32,
    /// Per-shard failure descriptions.
    pub shard_failures: Vec<String>,
}

impl ForceMergeResponse {
    /// Creates a fully successful response over `total_shards` shards.
    #[must_use]
    pub fn success(total_shards: u32) -> Self {
        Self {
            total_shards,
            successful_shards: total_shards,
            failed_shards: 0,
            shard_failures: Vec::new(),
        }
    }

    /// Returns true when every targeted shard merged and no shard reported
    /// a failure. Anything less is treated as a transient failure and the
    /// merge is retried on the next run.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.successful_shards == self.total_shards
            && self.failed_shards == 0
            && self.shard_failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    use super::*;

    fn hash_of(key: &ForceMergeRequestKey) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    fn base_request() -> ForceMergeRequest {
        ForceMergeRequest {
            indices: vec!["i2".to_string(), "i1".to_string()],
            max_num_segments: Some(1),
            only_expunge_deletes: false,
            flush: true,
            request_id: Some(42),
            parent_task: Some("task-a".to_string()),
            store_result: false,
        }
    }

    #[test]
    fn key_ignores_supervisory_fields() {
        let original = base_request();
        let mut retried = base_request();
        retried.parent_task = Some("task-b".to_string());
        retried.store_result = true;

        let key_a = ForceMergeRequestKey::from(&original);
        let key_b = ForceMergeRequestKey::from(&retried);
        assert_eq!(key_a, key_b);
        assert_eq!(hash_of(&key_a), hash_of(&key_b));
    }

    #[test]
    fn key_is_order_insensitive_over_indices() {
        let forward = base_request();
        let mut reversed = base_request();
        reversed.indices.reverse();
        assert_eq!(
            ForceMergeRequestKey::from(&forward),
            ForceMergeRequestKey::from(&reversed)
        );
    }

    #[test]
    fn key_distinguishes_identity_fields() {
        let original = base_request();
        let key = ForceMergeRequestKey::from(&original);

        let mut other_index = base_request();
        other_index.indices = vec!["i3".to_string()];
        assert_ne!(key, ForceMergeRequestKey::from(&other_index));

        let mut other_expunge = base_request();
        other_expunge.only_expunge_deletes = true;
        assert_ne!(key, ForceMergeRequestKey::from(&other_expunge));

        let mut other_flush = base_request();
        other_flush.flush = false;
        assert_ne!(key, ForceMergeRequestKey::from(&other_flush));

        let mut other_segments = base_request();
        other_segments.max_num_segments = Some(2);
        assert_ne!(key, ForceMergeRequestKey::from(&other_segments));

        let mut other_request_id = base_request();
        other_request_id.request_id = Some(43);
        assert_ne!(key, ForceMergeRequestKey::from(&other_request_id));
    }

    #[test]
    fn duplicate_indices_are_a_multiset() {
        let mut doubled = base_request();
        doubled.indices = vec!["i1".to_string(), "i1".to_string()];
        let mut single = base_request();
        single.indices = vec!["i1".to_string()];
        assert_ne!(
            ForceMergeRequestKey::from(&doubled),
            ForceMergeRequestKey::from(&single)
        );
    }

    #[test]
    fn force_merge_completion_criterion() {
        assert!(ForceMergeResponse::success(5).is_complete());

        let partial = ForceMergeResponse {
            total_shards: 5,
            successful_shards: 4,
            failed_shards: 0,
            shard_failures: Vec::new(),
        };
        assert!(!partial.is_complete());

        let failed_shards = ForceMergeResponse {
            total_shards: 5,
            successful_shards: 5,
            failed_shards: 1,
            shard_failures: vec!["shard 3: merge aborted".to_string()],
        };
        assert!(!failed_shards.is_complete());
    }
}
