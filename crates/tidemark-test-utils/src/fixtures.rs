//! Factory functions for cluster-state fixtures.

use std::time::Duration;

use tidemark_core::{
    AdaptiveAllocationsSettings, ClusterMetadata, ClusterNodes, ClusterState, DataStream,
    DeploymentAssignment, IndexMetadata, LifecycleSpec, RolloverInfo, Settings,
};
use tidemark_lifecycle::{
    MERGE_POLICY_FLOOR_SEGMENT_SETTING, MERGE_POLICY_MERGE_FACTOR_SETTING, ONE_HUNDRED_MB,
    TARGET_MERGE_FACTOR_VALUE,
};

/// Name of the `generation`-th backing index of `stream`.
pub fn backing_index_name(stream: &str, generation: usize) -> String {
    format!(".ds-{stream}-{generation:06}")
}

/// Settings carrying the controller's target merge policy.
pub fn merge_policy_settings() -> Settings {
    Settings::new()
        .with(
            MERGE_POLICY_FLOOR_SEGMENT_SETTING,
            ONE_HUNDRED_MB.to_string(),
        )
        .with(
            MERGE_POLICY_MERGE_FACTOR_SETTING,
            TARGET_MERGE_FACTOR_VALUE.to_string(),
        )
}

/// Builds a cluster state with one data stream of `backing_indices` indices.
///
/// Index `g` (1-based) is created `(backing_indices - g + 1)` seconds before
/// `now_ms`; every non-write index carries a rollover record stamped two
/// seconds before `now_ms`. The local node is the elected master.
pub fn data_stream_state(
    name: &str,
    backing_indices: usize,
    settings: &Settings,
    lifecycle: Option<LifecycleSpec>,
    now_ms: i64,
) -> ClusterState {
    let mut metadata = ClusterMetadata::default();
    let mut index_names = Vec::with_capacity(backing_indices);

    for generation in 1..=backing_indices {
        let index_name = backing_index_name(name, generation);
        let age_seconds = i64::try_from(backing_indices - generation + 1).unwrap_or(i64::MAX);
        let mut index =
            IndexMetadata::new(&index_name, now_ms - age_seconds * 1_000).with_settings(settings.clone());
        if generation < backing_indices {
            index = index.with_rollover_info(
                name,
                RolloverInfo {
                    met_conditions: vec!["max_age".to_string()],
                    time_ms: now_ms - 2_000,
                },
            );
        }
        metadata.put_index(index);
        index_names.push(index_name);
    }

    metadata.put_stream(DataStream::new(name, index_names, lifecycle));

    ClusterState {
        version: 1,
        nodes: ClusterNodes::local_master("node-0"),
        metadata,
    }
}

/// Builds a cluster state with one adaptive deployment assignment.
pub fn deployment_state(
    deployment_id: &str,
    total_target_allocations: u32,
    enabled: bool,
    min: Option<u32>,
    max: Option<u32>,
) -> ClusterState {
    let mut metadata = ClusterMetadata::default();
    metadata.put_deployment(DeploymentAssignment {
        deployment_id: deployment_id.to_string(),
        total_target_allocations,
        adaptive_allocations: Some(AdaptiveAllocationsSettings {
            enabled,
            min_number_of_allocations: min,
            max_number_of_allocations: max,
        }),
    });

    ClusterState {
        version: 1,
        nodes: ClusterNodes::local_master("node-0"),
        metadata,
    }
}

/// A retention lasting the given number of days.
pub fn retention_days(days: u64) -> Duration {
    Duration::from_secs(days * 24 * 60 * 60)
}
