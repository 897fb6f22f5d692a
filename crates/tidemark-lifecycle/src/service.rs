//! The data stream lifecycle controller.
//!
//! [`DataStreamLifecycleService::run`] is invoked with a cluster-state
//! snapshot on every published change (and only acts on the elected
//! master). For each stream with a lifecycle spec it issues at most one
//! rollover, and walks the non-write backing indices through the phase
//! ladder *retention-delete ≻ merge-policy settings ≻ force-merge*,
//! emitting at most one action per index per run. Every outbound request
//! goes through the [`ActionDeduplicator`], so re-running over an unchanged
//! state issues nothing new.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tidemark_core::{
    Clock, ClusterChangedEvent, ClusterService, ClusterState, ClusterStateListener, DataStream,
    IndexMetadata, Settings, LIFECYCLE_POLICY_NAME_SETTING,
};

use crate::client::LifecycleClient;
use crate::dedup::ActionDeduplicator;
use crate::error::{LifecycleError, Result};
use crate::error_store::ErrorStore;
use crate::merge_task::{
    UpdateForceMergeCompleteTask, FORCE_MERGE_COMPLETED_TIMESTAMP_METADATA_KEY,
    LIFECYCLE_CUSTOM_INDEX_METADATA_KEY,
};
use crate::metrics;
use crate::requests::{
    DeleteIndexRequest, ForceMergeRequest, ForceMergeRequestKey, RolloverRequest,
    UpdateSettingsRequest,
};
use crate::rollover::{default_rollover_request, RolloverConditions, RolloverConfiguration};

/// Target floor-segment size of the merge policy applied before force
/// merging: 100 MB.
pub const ONE_HUNDRED_MB: u64 = 100 * 1024 * 1024;

/// Target merge factor of the merge policy applied before force merging.
pub const TARGET_MERGE_FACTOR_VALUE: u32 = 16;

/// Index setting holding the merge-policy floor segment size in bytes.
pub const MERGE_POLICY_FLOOR_SEGMENT_SETTING: &str = "index.merge.policy.floor_segment";

/// Index setting holding the merge-policy merge factor.
pub const MERGE_POLICY_MERGE_FACTOR_SETTING: &str = "index.merge.policy.merge_factor";

/// Configuration of the lifecycle controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleServiceConfig {
    /// Merge-policy floor segment target, in bytes.
    pub merge_policy_floor_segment_bytes: u64,
    /// Merge-policy merge factor target.
    pub merge_policy_merge_factor: u32,
    /// Rollover conditions and their automatic set.
    pub rollover: RolloverConfiguration,
}

impl Default for LifecycleServiceConfig {
    fn default() -> Self {
        Self {
            merge_policy_floor_segment_bytes: ONE_HUNDRED_MB,
            merge_policy_merge_factor: TARGET_MERGE_FACTOR_VALUE,
            rollover: RolloverConfiguration::new(RolloverConditions::new())
                .with_automatic_max_age(),
        }
    }
}

impl LifecycleServiceConfig {
    /// Validates the configuration.
    ///
    /// Returns an error message if validation fails.
    #[must_use]
    pub fn validate(&self) -> Option<String> {
        if self.merge_policy_floor_segment_bytes == 0 {
            return Some("merge_policy_floor_segment_bytes must be at least 1".to_string());
        }
        if self.merge_policy_merge_factor < 2 {
            return Some("merge_policy_merge_factor must be at least 2".to_string());
        }
        None
    }
}

/// Logical identity of an outbound action, used to deduplicate dispatches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionKey {
    /// Rollover of a data stream, keyed by stream name.
    Rollover(String),
    /// Deletion of a single index.
    Delete(String),
    /// Settings update of a single index.
    UpdateSettings(String),
    /// Force merge, keyed by the request's value-equality record.
    ForceMerge(ForceMergeRequestKey),
}

/// Master-side controller driving data streams through their lifecycle.
pub struct DataStreamLifecycleService {
    client: Arc<dyn LifecycleClient>,
    cluster: Arc<ClusterService>,
    clock: Arc<dyn Clock>,
    config: LifecycleServiceConfig,
    error_store: Arc<ErrorStore>,
    deduplicator: ActionDeduplicator<ActionKey>,
}

impl DataStreamLifecycleService {
    /// Creates a lifecycle controller.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::InvalidConfig`] when the configuration is
    /// rejected by [`LifecycleServiceConfig::validate`].
    pub fn new(
        client: Arc<dyn LifecycleClient>,
        cluster: Arc<ClusterService>,
        clock: Arc<dyn Clock>,
        config: LifecycleServiceConfig,
        error_store: Arc<ErrorStore>,
    ) -> Result<Self> {
        if let Some(message) = config.validate() {
            return Err(LifecycleError::InvalidConfig { message });
        }
        Ok(Self {
            client,
            cluster,
            clock,
            config,
            error_store,
            deduplicator: ActionDeduplicator::new(),
        })
    }

    /// Registers the service as a cluster-state listener so every published
    /// state drives a run.
    pub fn init(self: &Arc<Self>) {
        let listener: Arc<dyn ClusterStateListener> = Arc::clone(self) as Arc<dyn ClusterStateListener>;
        self.cluster.add_listener(listener);
    }

    /// The per-index transient error memory, visible for inspection.
    #[must_use]
    pub fn error_store(&self) -> &Arc<ErrorStore> {
        &self.error_store
    }

    /// Number of distinct actions currently in flight, visible for testing.
    #[must_use]
    pub fn in_flight_actions(&self) -> usize {
        self.deduplicator.len()
    }

    /// Runs one lifecycle pass over `state`.
    ///
    /// Non-blocking: outbound actions are enqueued through the deduplicator
    /// and their completions update only the error store. Invoked off the
    /// elected master this returns without side effects. Idempotent: a
    /// second invocation over an unchanged state issues no new requests.
    pub fn run(&self, state: &ClusterState) {
        if !state.nodes.is_local_node_master() {
            return;
        }

        let _timer = metrics::RunTimer::start();
        metrics::record_run();

        let managed = managed_indices(state);
        self.error_store.reconcile(state, &managed);
        metrics::set_error_store_entries(self.error_store.len());

        for stream in state.metadata.streams.values() {
            let Some(lifecycle) = &stream.lifecycle else {
                continue;
            };
            let retention = lifecycle.data_retention;

            if let Some(write_index) = stream.write_index() {
                if let Some(index) = state.metadata.index(write_index) {
                    if is_managed_index(stream, index) {
                        self.issue_rollover(stream, retention, write_index);
                    }
                }
            }

            let backing_count = stream.indices.len().saturating_sub(1);
            for index_name in &stream.indices[..backing_count] {
                let Some(index) = state.metadata.index(index_name) else {
                    continue;
                };
                if !is_managed_index(stream, index) {
                    continue;
                }

                if let Some(retention) = retention {
                    let retention_ms =
                        i64::try_from(retention.as_millis()).unwrap_or(i64::MAX);
                    if index.age_millis(self.clock.now_millis()) >= retention_ms {
                        self.issue_delete(index_name);
                        continue;
                    }
                }

                if !self.merge_policy_applied(&index.settings) {
                    self.issue_update_settings(index_name);
                    continue;
                }

                if !force_merge_completed(index) {
                    self.issue_force_merge(index_name);
                }
            }
        }
    }

    fn merge_policy_applied(&self, settings: &Settings) -> bool {
        settings.get_u64(MERGE_POLICY_FLOOR_SEGMENT_SETTING)
            == Some(self.config.merge_policy_floor_segment_bytes)
            && settings.get_u32(MERGE_POLICY_MERGE_FACTOR_SETTING)
                == Some(self.config.merge_policy_merge_factor)
    }

    fn issue_rollover(&self, stream: &DataStream, retention: Option<Duration>, write_index: &str) {
        let request: RolloverRequest =
            default_rollover_request(&self.config.rollover, &stream.name, retention);
        let key = ActionKey::Rollover(stream.name.clone());

        let client = Arc::clone(&self.client);
        let stream_name = stream.name.clone();
        let store = Arc::clone(&self.error_store);
        let index = write_index.to_string();

        self.deduplicator.execute(
            key,
            async move {
                let response = client.rollover(request).await?;
                if response.rolled_over {
                    tracing::info!(
                        stream = %stream_name,
                        old_index = %response.old_index,
                        new_index = %response.new_index,
                        "rolled over data stream"
                    );
                }
                Ok(())
            },
            move |result| match result {
                Ok(()) => store.clear(&index),
                Err(error) => {
                    tracing::error!(index = %index, error = %error, "rollover failed");
                    store.record(&index, error.to_string());
                }
            },
        );
        metrics::record_action("rollover");
    }

    fn issue_delete(&self, index_name: &str) {
        let request = DeleteIndexRequest {
            index: index_name.to_string(),
        };
        let key = ActionKey::Delete(index_name.to_string());

        let client = Arc::clone(&self.client);
        let store = Arc::clone(&self.error_store);
        let index = index_name.to_string();

        self.deduplicator.execute(
            key,
            async move { client.delete_index(request).await },
            move |result| match result {
                Ok(()) => {
                    tracing::info!(index = %index, "deleted index past retention");
                    store.clear(&index);
                }
                Err(error) => {
                    tracing::error!(index = %index, error = %error, "delete failed");
                    store.record(&index, error.to_string());
                }
            },
        );
        metrics::record_action("delete");
    }

    fn issue_update_settings(&self, index_name: &str) {
        let settings = Settings::new()
            .with(
                MERGE_POLICY_FLOOR_SEGMENT_SETTING,
                self.config.merge_policy_floor_segment_bytes.to_string(),
            )
            .with(
                MERGE_POLICY_MERGE_FACTOR_SETTING,
                self.config.merge_policy_merge_factor.to_string(),
            );
        let request = UpdateSettingsRequest {
            index: index_name.to_string(),
            settings,
        };
        let key = ActionKey::UpdateSettings(index_name.to_string());

        let client = Arc::clone(&self.client);
        let store = Arc::clone(&self.error_store);
        let index = index_name.to_string();

        self.deduplicator.execute(
            key,
            async move { client.update_settings(request).await },
            move |result| match result {
                Ok(()) => store.clear(&index),
                Err(error) => {
                    tracing::error!(index = %index, error = %error, "settings update failed");
                    store.record(&index, error.to_string());
                }
            },
        );
        metrics::record_action("update_settings");
    }

    fn issue_force_merge(&self, index_name: &str) {
        let request = ForceMergeRequest::for_index(index_name);
        let key = ActionKey::ForceMerge(ForceMergeRequestKey::from(&request));

        let client = Arc::clone(&self.client);
        let store = Arc::clone(&self.error_store);
        let cluster = Arc::clone(&self.cluster);
        let clock = Arc::clone(&self.clock);
        let merged_index = index_name.to_string();
        let index = index_name.to_string();

        self.deduplicator.execute(
            key,
            async move {
                let response = client.force_merge(request).await?;
                if response.is_complete() {
                    Ok(())
                } else {
                    Err(LifecycleError::ForceMergeIncomplete {
                        index: merged_index,
                        total_shards: response.total_shards,
                        successful_shards: response.successful_shards,
                        failed_shards: response.failed_shards,
                    })
                }
            },
            move |result| match result {
                Ok(()) => {
                    store.clear(&index);
                    let task_index = index.clone();
                    let task_store = Arc::clone(&store);
                    let task = UpdateForceMergeCompleteTask::new(
                        index.clone(),
                        clock,
                        move |ack| {
                            if let Err(error) = ack {
                                tracing::error!(
                                    index = %task_index,
                                    error = %error,
                                    "failed to record force merge completion"
                                );
                                task_store.record(&task_index, error.to_string());
                            }
                        },
                    );
                    cluster.submit_state_update(Arc::new(task));
                }
                Err(error) => {
                    tracing::error!(index = %index, error = %error, "force merge failed");
                    store.record(&index, error.to_string());
                }
            },
        );
        metrics::record_action("force_merge");
    }
}

impl ClusterStateListener for DataStreamLifecycleService {
    fn cluster_changed(&self, event: &ClusterChangedEvent) {
        self.run(&event.state);
    }
}

/// Returns true if `index` is managed by the lifecycle controller: its
/// stream carries a lifecycle spec and its settings do not name a foreign
/// lifecycle policy.
fn is_managed_index(stream: &DataStream, index: &IndexMetadata) -> bool {
    stream.lifecycle.is_some() && !index.settings.contains(LIFECYCLE_POLICY_NAME_SETTING)
}

/// Collects the managed backing indices across every stream in `state`.
fn managed_indices(state: &ClusterState) -> HashSet<String> {
    let mut managed = HashSet::new();
    for stream in state.metadata.streams.values() {
        if stream.lifecycle.is_none() {
            continue;
        }
        for index_name in &stream.indices {
            if let Some(index) = state.metadata.index(index_name) {
                if is_managed_index(stream, index) {
                    managed.insert(index_name.clone());
                }
            }
        }
    }
    managed
}

/// Returns true if the index carries the force-merge completion stamp.
fn force_merge_completed(index: &IndexMetadata) -> bool {
    index
        .custom_data(LIFECYCLE_CUSTOM_INDEX_METADATA_KEY)
        .is_some_and(|namespace| {
            namespace.contains_key(FORCE_MERGE_COMPLETED_TIMESTAMP_METADATA_KEY)
        })
}

#[cfg(test)]
mod tests {
    use tidemark_core::LifecycleSpec;

    use super::*;

    #[test]
    fn config_serde_roundtrip() {
        let config = LifecycleServiceConfig::default();
        let json = serde_json::to_string(&config).expect("serialize");
        let parsed: LifecycleServiceConfig = serde_json::from_str(&json).expect("parse");
        assert_eq!(config, parsed);
    }

    #[test]
    fn config_validation() {
        assert_eq!(LifecycleServiceConfig::default().validate(), None);

        let zero_floor = LifecycleServiceConfig {
            merge_policy_floor_segment_bytes: 0,
            ..Default::default()
        };
        assert!(zero_floor.validate().is_some());

        let tiny_factor = LifecycleServiceConfig {
            merge_policy_merge_factor: 1,
            ..Default::default()
        };
        assert!(tiny_factor.validate().is_some());
    }

    #[test]
    fn managed_requires_lifecycle_and_no_foreign_policy() {
        let managed_stream = DataStream::new(
            "logs",
            vec!["i1".to_string()],
            Some(LifecycleSpec::default()),
        );
        let unmanaged_stream = DataStream::new("logs", vec!["i1".to_string()], None);

        let plain = IndexMetadata::new("i1", 0);
        let foreign = IndexMetadata::new("i1", 0).with_settings(
            Settings::new().with(LIFECYCLE_POLICY_NAME_SETTING, "legacy-policy"),
        );

        assert!(is_managed_index(&managed_stream, &plain));
        assert!(!is_managed_index(&managed_stream, &foreign));
        assert!(!is_managed_index(&unmanaged_stream, &plain));
    }

    #[test]
    fn completion_stamp_detection() {
        let unstamped = IndexMetadata::new("i1", 0);
        assert!(!force_merge_completed(&unstamped));

        let mut namespace = std::collections::BTreeMap::new();
        namespace.insert(
            FORCE_MERGE_COMPLETED_TIMESTAMP_METADATA_KEY.to_string(),
            "1700000000000".to_string(),
        );
        let stamped = IndexMetadata::new("i1", 0)
            .with_custom_metadata(LIFECYCLE_CUSTOM_INDEX_METADATA_KEY, namespace);
        assert!(force_merge_completed(&stamped));
    }
}
