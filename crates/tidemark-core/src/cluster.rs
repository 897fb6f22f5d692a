//! Immutable cluster-state model.
//!
//! A [`ClusterState`] is a point-in-time snapshot of everything the control
//! loops observe: data streams and their ordered backing indices, per-index
//! settings and custom metadata, the graveyard of recently deleted indices,
//! and inference deployment assignments. Snapshots are cheap to clone and
//! freely shared across threads; controllers must never mutate one in place.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Index setting carrying the name of a foreign lifecycle policy.
///
/// An index whose settings contain this key is owned by the legacy lifecycle
/// manager and must not be touched by the data stream lifecycle controller.
pub const LIFECYCLE_POLICY_NAME_SETTING: &str = "index.lifecycle.policy_name";

/// Ordered string-to-string index settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings(BTreeMap<String, String>);

impl Settings {
    /// Creates an empty settings map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a setting, consuming and returning `self` for chaining.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Returns the raw value for `key`, if present.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Returns the value for `key` parsed as `u64`, if present and parseable.
    #[must_use]
    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|value| value.parse().ok())
    }

    /// Returns the value for `key` parsed as `u32`, if present and parseable.
    #[must_use]
    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get(key).and_then(|value| value.parse().ok())
    }

    /// Returns true if `key` is present.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }
}

/// Record of a satisfied rollover, attached to the index that rolled over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolloverInfo {
    /// Names of the conditions that were met (e.g. `max_age`).
    pub met_conditions: Vec<String>,
    /// When the rollover happened, epoch milliseconds.
    pub time_ms: i64,
}

/// Metadata of a single backing index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMetadata {
    /// Index name.
    pub name: String,
    /// Creation timestamp, epoch milliseconds.
    pub creation_date_ms: i64,
    /// Index settings.
    pub settings: Settings,
    /// Rollover records keyed by the rollover target (stream name).
    pub rollover_info: BTreeMap<String, RolloverInfo>,
    /// Free-form string maps attached to the index, namespaced by key.
    pub custom_metadata: BTreeMap<String, BTreeMap<String, String>>,
}

impl IndexMetadata {
    /// Creates index metadata with empty settings and no custom data.
    #[must_use]
    pub fn new(name: impl Into<String>, creation_date_ms: i64) -> Self {
        Self {
            name: name.into(),
            creation_date_ms,
            settings: Settings::new(),
            rollover_info: BTreeMap::new(),
            custom_metadata: BTreeMap::new(),
        }
    }

    /// Replaces the settings, consuming and returning `self` for chaining.
    #[must_use]
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Attaches a rollover record for `target`.
    #[must_use]
    pub fn with_rollover_info(mut self, target: impl Into<String>, info: RolloverInfo) -> Self {
        self.rollover_info.insert(target.into(), info);
        self
    }

    /// Attaches a custom metadata map under `namespace`.
    #[must_use]
    pub fn with_custom_metadata(
        mut self,
        namespace: impl Into<String>,
        entries: BTreeMap<String, String>,
    ) -> Self {
        self.custom_metadata.insert(namespace.into(), entries);
        self
    }

    /// Returns the custom metadata map under `namespace`, if present.
    #[must_use]
    pub fn custom_data(&self, namespace: &str) -> Option<&BTreeMap<String, String>> {
        self.custom_metadata.get(namespace)
    }

    /// Age of the index relative to `now_ms`, in milliseconds.
    #[must_use]
    pub fn age_millis(&self, now_ms: i64) -> i64 {
        now_ms - self.creation_date_ms
    }
}

/// One downsampling round of a lifecycle spec.
///
/// Carried in the model for completeness; the lifecycle controller does not
/// act on downsampling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownsamplingRound {
    /// Age after which the round applies.
    pub after: Duration,
    /// Target fixed interval of the downsampled series.
    pub fixed_interval: Duration,
}

/// Lifecycle spec attached to a data stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleSpec {
    /// How long backing indices are retained after creation. `None` means
    /// indefinite retention.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_retention: Option<Duration>,
    /// Downsampling rounds, ignored by the lifecycle controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downsampling: Option<Vec<DownsamplingRound>>,
}

impl LifecycleSpec {
    /// Creates a lifecycle spec with the given retention.
    #[must_use]
    pub fn with_retention(data_retention: Duration) -> Self {
        Self {
            data_retention: Some(data_retention),
            downsampling: None,
        }
    }
}

/// A named, append-only collection of backing indices.
///
/// The last entry of `indices` is the write index.
#[derive(Debug, Clone, PartialEq)]
pub struct DataStream {
    /// Stream name.
    pub name: String,
    /// Ordered backing index names; the last one is the write index.
    pub indices: Vec<String>,
    /// Lifecycle spec; `None` means the stream is not lifecycle-managed.
    pub lifecycle: Option<LifecycleSpec>,
}

impl DataStream {
    /// Creates a data stream.
    #[must_use]
    pub fn new(name: impl Into<String>, indices: Vec<String>, lifecycle: Option<LifecycleSpec>) -> Self {
        Self {
            name: name.into(),
            indices,
            lifecycle,
        }
    }

    /// Returns the write index name, if the stream has any backing index.
    #[must_use]
    pub fn write_index(&self) -> Option<&str> {
        self.indices.last().map(String::as_str)
    }
}

/// Tombstone of a recently deleted index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexTombstone {
    /// Name of the deleted index.
    pub index: String,
    /// When the index was deleted, epoch milliseconds.
    pub delete_date_ms: i64,
}

/// Cluster-level record of recently deleted index names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexGraveyard {
    /// Tombstones in deletion order.
    pub tombstones: Vec<IndexTombstone>,
}

impl IndexGraveyard {
    /// Adds a tombstone for `index`.
    pub fn add_tombstone(&mut self, index: impl Into<String>, delete_date_ms: i64) {
        self.tombstones.push(IndexTombstone {
            index: index.into(),
            delete_date_ms,
        });
    }

    /// Returns true if a tombstone exists for `index`.
    #[must_use]
    pub fn contains(&self, index: &str) -> bool {
        self.tombstones.iter().any(|tombstone| tombstone.index == index)
    }
}

/// Adaptive allocation bounds of a deployment assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptiveAllocationsSettings {
    /// Whether adaptive allocations are enabled for this deployment.
    pub enabled: bool,
    /// Lower bound on the allocation count, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_number_of_allocations: Option<u32>,
    /// Upper bound on the allocation count, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_number_of_allocations: Option<u32>,
}

/// Assignment of an inference model deployment across the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentAssignment {
    /// Deployment identifier.
    pub deployment_id: String,
    /// Total allocations currently targeted across all nodes.
    pub total_target_allocations: u32,
    /// Adaptive allocation settings; absent means fixed allocations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adaptive_allocations: Option<AdaptiveAllocationsSettings>,
}

/// Identity of the local and elected master nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterNodes {
    /// Identifier of the local node, if known.
    pub local_node_id: Option<String>,
    /// Identifier of the elected master node, if any.
    pub master_node_id: Option<String>,
}

impl ClusterNodes {
    /// Creates nodes where the local node is the elected master.
    #[must_use]
    pub fn local_master(node_id: impl Into<String>) -> Self {
        let node_id = node_id.into();
        Self {
            local_node_id: Some(node_id.clone()),
            master_node_id: Some(node_id),
        }
    }

    /// Returns true if the local node is the elected master.
    #[must_use]
    pub fn is_local_node_master(&self) -> bool {
        match (&self.local_node_id, &self.master_node_id) {
            (Some(local), Some(master)) => local == master,
            _ => false,
        }
    }
}

/// Cluster metadata: streams, indices, graveyard, deployments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterMetadata {
    /// Data streams keyed by name.
    pub streams: BTreeMap<String, DataStream>,
    /// Index metadata keyed by index name.
    pub indices: BTreeMap<String, IndexMetadata>,
    /// Recently deleted indices.
    pub graveyard: IndexGraveyard,
    /// Inference deployment assignments keyed by deployment id.
    pub deployments: BTreeMap<String, DeploymentAssignment>,
}

impl ClusterMetadata {
    /// Inserts or replaces a data stream.
    pub fn put_stream(&mut self, stream: DataStream) {
        self.streams.insert(stream.name.clone(), stream);
    }

    /// Inserts or replaces index metadata.
    pub fn put_index(&mut self, index: IndexMetadata) {
        self.indices.insert(index.name.clone(), index);
    }

    /// Removes index metadata, returning it if present.
    pub fn remove_index(&mut self, name: &str) -> Option<IndexMetadata> {
        self.indices.remove(name)
    }

    /// Inserts or replaces a deployment assignment.
    pub fn put_deployment(&mut self, assignment: DeploymentAssignment) {
        self.deployments
            .insert(assignment.deployment_id.clone(), assignment);
    }

    /// Returns the metadata of `name`, if present.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&IndexMetadata> {
        self.indices.get(name)
    }

    /// Returns the data stream `name`, if present.
    #[must_use]
    pub fn stream(&self, name: &str) -> Option<&DataStream> {
        self.streams.get(name)
    }
}

/// Point-in-time snapshot of the cluster.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterState {
    /// Monotonically increasing state version.
    pub version: u64,
    /// Local/master node identity.
    pub nodes: ClusterNodes,
    /// Cluster metadata.
    pub metadata: ClusterMetadata,
}
