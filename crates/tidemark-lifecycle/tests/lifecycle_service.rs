//! End-to-end tests of the data stream lifecycle controller against an
//! in-memory cluster service and a request-recording client.

use std::sync::Arc;
use std::time::Duration;

use tidemark_core::{
    Clock, ClusterNodes, ClusterService, IndexMetadata, LifecycleSpec, RolloverInfo, Settings,
    LIFECYCLE_POLICY_NAME_SETTING,
};
use tidemark_lifecycle::{
    DataStreamLifecycleService, DeleteIndexRequest, ErrorStore, ForceMergeResponse,
    LifecycleClient, LifecycleServiceConfig, FORCE_MERGE_COMPLETED_TIMESTAMP_METADATA_KEY,
    LIFECYCLE_CUSTOM_INDEX_METADATA_KEY, MERGE_POLICY_FLOOR_SEGMENT_SETTING,
    MERGE_POLICY_MERGE_FACTOR_SETTING, ONE_HUNDRED_MB, TARGET_MERGE_FACTOR_VALUE,
};
use tidemark_test_utils::{
    assert_eventually, backing_index_name, data_stream_state, merge_policy_settings,
    retention_days, ForceMergeBehavior, RecordingLifecycleClient, RolloverBehavior, SeenRequest,
    SimulatedClock, UnitBehavior,
};

const NOW_MS: i64 = 1_700_000_000_000;
const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    client: Arc<RecordingLifecycleClient>,
    cluster: Arc<ClusterService>,
    clock: Arc<SimulatedClock>,
    service: Arc<DataStreamLifecycleService>,
}

impl Harness {
    fn new(initial: tidemark_core::ClusterState) -> Self {
        let client = Arc::new(RecordingLifecycleClient::new());
        let cluster = Arc::new(ClusterService::new(initial));
        let clock = Arc::new(SimulatedClock::at_millis(NOW_MS));
        let service = Arc::new(
            DataStreamLifecycleService::new(
                Arc::clone(&client) as Arc<dyn LifecycleClient>,
                Arc::clone(&cluster),
                Arc::clone(&clock) as Arc<dyn Clock>,
                LifecycleServiceConfig::default(),
                Arc::new(ErrorStore::new()),
            )
            .expect("valid config"),
        );
        Self {
            client,
            cluster,
            clock,
            service,
        }
    }

    fn run(&self) {
        self.service.run(&self.cluster.state());
    }

    fn stamped(&self, index: &str) -> bool {
        self.cluster
            .state()
            .metadata
            .index(index)
            .and_then(|meta| meta.custom_data(LIFECYCLE_CUSTOM_INDEX_METADATA_KEY))
            .is_some_and(|namespace| {
                namespace.contains_key(FORCE_MERGE_COMPLETED_TIMESTAMP_METADATA_KEY)
            })
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn operations_are_executed_once() {
    let state = data_stream_state(
        "logs",
        3,
        &Settings::new(),
        Some(LifecycleSpec::with_retention(Duration::ZERO)),
        NOW_MS,
    );
    let harness = Harness::new(state);

    harness.run();
    let client = Arc::clone(&harness.client);
    assert_eventually(WAIT, move || client.seen_len() == 3).await;

    let seen = harness.client.seen();
    match &seen[0] {
        SeenRequest::Rollover(request) => assert_eq!(request.target, "logs"),
        other => panic!("expected rollover first, got {other:?}"),
    }
    assert_eq!(
        seen[1],
        SeenRequest::DeleteIndex(DeleteIndexRequest {
            index: backing_index_name("logs", 1),
        })
    );
    assert_eq!(
        seen[2],
        SeenRequest::DeleteIndex(DeleteIndexRequest {
            index: backing_index_name("logs", 2),
        })
    );

    // A second run over the unchanged state issues nothing new.
    harness.run();
    settle().await;
    assert_eq!(harness.client.seen_len(), 3);
}

#[tokio::test]
async fn young_indices_are_not_deleted() {
    let state = data_stream_state(
        "logs",
        3,
        &Settings::new(),
        Some(LifecycleSpec::with_retention(retention_days(700))),
        NOW_MS,
    );
    let harness = Harness::new(state);

    harness.run();
    let client = Arc::clone(&harness.client);
    assert_eventually(WAIT, move || client.seen_len() == 3).await;

    let seen = harness.client.seen();
    assert!(matches!(seen[0], SeenRequest::Rollover(_)));
    // Indices are seconds old: nothing is deleted, the merge policy is
    // applied instead.
    assert!(matches!(seen[1], SeenRequest::UpdateSettings(_)));
    assert!(matches!(seen[2], SeenRequest::UpdateSettings(_)));
}

#[tokio::test]
async fn merge_policy_is_configured_before_force_merge() {
    let state = data_stream_state(
        "logs",
        3,
        &Settings::new(),
        Some(LifecycleSpec::with_retention(retention_days(700))),
        NOW_MS,
    );
    let harness = Harness::new(state);
    harness
        .client
        .set_force_merge_behavior(ForceMergeBehavior::Respond(ForceMergeResponse::success(5)));

    harness.run();
    let client = Arc::clone(&harness.client);
    assert_eventually(WAIT, move || client.seen_len() == 3).await;

    for request in &harness.client.seen()[1..] {
        let SeenRequest::UpdateSettings(request) = request else {
            panic!("expected update-settings, got {request:?}");
        };
        assert_eq!(
            request.settings.get_u64(MERGE_POLICY_FLOOR_SEGMENT_SETTING),
            Some(ONE_HUNDRED_MB)
        );
        assert_eq!(
            request.settings.get_u32(MERGE_POLICY_MERGE_FACTOR_SETTING),
            Some(TARGET_MERGE_FACTOR_VALUE)
        );
    }

    // No changes, so running again creates no more requests.
    harness.run();
    settle().await;
    assert_eq!(harness.client.seen_len(), 3);

    // Once the merge policy lands on the indices, the next run force merges
    // them and the completion stamps appear in the published state.
    let mut next = (*harness.cluster.state()).clone();
    for generation in 1..=2 {
        let name = backing_index_name("logs", generation);
        next.metadata
            .indices
            .get_mut(&name)
            .expect("index")
            .settings = merge_policy_settings();
    }
    harness.cluster.apply_state(next);

    harness.run();
    let client = Arc::clone(&harness.client);
    assert_eventually(WAIT, move || client.seen_len() == 5).await;
    let seen = harness.client.seen();
    assert!(matches!(seen[3], SeenRequest::ForceMerge(_)));
    assert!(matches!(seen[4], SeenRequest::ForceMerge(_)));

    let stamped = |harness: &Harness| {
        harness.stamped(&backing_index_name("logs", 1))
            && harness.stamped(&backing_index_name("logs", 2))
    };
    assert_eventually(WAIT, || stamped(&harness)).await;

    // With both completion stamps published, a further run is a no-op.
    harness.run();
    settle().await;
    assert_eq!(harness.client.seen_len(), 5);
}

#[tokio::test]
async fn force_merge_stamps_completion_for_added_backing_index() {
    let state = data_stream_state(
        "logs",
        3,
        &merge_policy_settings(),
        Some(LifecycleSpec::default()),
        NOW_MS,
    );
    let harness = Harness::new(state);
    harness
        .client
        .set_force_merge_behavior(ForceMergeBehavior::Respond(ForceMergeResponse::success(5)));

    harness.run();
    let client = Arc::clone(&harness.client);
    assert_eventually(WAIT, move || client.seen_len() == 3).await;
    assert_eventually(WAIT, || {
        harness.stamped(&backing_index_name("logs", 1))
            && harness.stamped(&backing_index_name("logs", 2))
    })
    .await;

    harness.run();
    settle().await;
    assert_eq!(harness.client.seen_len(), 3);

    // A fourth backing index shows up; the only new action is one force
    // merge of the previous write index.
    let mut next = (*harness.cluster.state()).clone();
    let added = backing_index_name("logs", 4);
    next.metadata.put_index(
        IndexMetadata::new(&added, NOW_MS - 3_000)
            .with_settings(merge_policy_settings())
            .with_rollover_info(
                "logs",
                RolloverInfo {
                    met_conditions: vec!["max_age".to_string()],
                    time_ms: NOW_MS - 2_000,
                },
            ),
    );
    next.metadata
        .streams
        .get_mut("logs")
        .expect("stream")
        .indices
        .push(added);
    harness.cluster.apply_state(next);

    harness.run();
    let client = Arc::clone(&harness.client);
    assert_eventually(WAIT, move || client.seen_len() == 4).await;
    let seen = harness.client.seen();
    let SeenRequest::ForceMerge(request) = &seen[3] else {
        panic!("expected force merge, got {:?}", seen[3]);
    };
    assert_eq!(request.indices, vec![backing_index_name("logs", 3)]);
    assert_eventually(WAIT, || harness.stamped(&backing_index_name("logs", 3))).await;
}

#[tokio::test]
async fn force_merge_failures_are_retried_until_success() {
    let state = data_stream_state(
        "logs",
        3,
        &merge_policy_settings(),
        Some(LifecycleSpec::default()),
        NOW_MS,
    );
    let harness = Harness::new(state);
    let index_1 = backing_index_name("logs", 1);
    let index_2 = backing_index_name("logs", 2);

    // Run 1: the transport rejects the merge outright.
    harness
        .client
        .set_force_merge_behavior(ForceMergeBehavior::Fail("merge rejected".to_string()));
    harness.run();
    let store = Arc::clone(harness.service.error_store());
    let (i1, i2) = (index_1.clone(), index_2.clone());
    assert_eventually(WAIT, move || {
        store.get(&i1).is_some_and(|record| record.occurrences == 1)
            && store.get(&i2).is_some_and(|record| record.occurrences == 1)
    })
    .await;
    assert!(!harness.stamped(&index_1));

    // Run 2: the merge responds, but reports a failed shard.
    harness
        .client
        .set_force_merge_behavior(ForceMergeBehavior::Respond(ForceMergeResponse {
            total_shards: 5,
            successful_shards: 5,
            failed_shards: 1,
            shard_failures: vec!["shard 3: merge aborted".to_string()],
        }));
    harness.run();
    let store = Arc::clone(harness.service.error_store());
    let (i1, i2) = (index_1.clone(), index_2.clone());
    assert_eventually(WAIT, move || {
        store.get(&i1).is_some_and(|record| record.occurrences == 2)
            && store.get(&i2).is_some_and(|record| record.occurrences == 2)
    })
    .await;
    assert!(!harness.stamped(&index_1));

    // Run 3: fewer shards succeeded than were targeted.
    harness
        .client
        .set_force_merge_behavior(ForceMergeBehavior::Respond(ForceMergeResponse {
            total_shards: 5,
            successful_shards: 4,
            failed_shards: 0,
            shard_failures: Vec::new(),
        }));
    harness.run();
    let store = Arc::clone(harness.service.error_store());
    let (i1, i2) = (index_1.clone(), index_2.clone());
    assert_eventually(WAIT, move || {
        store.get(&i1).is_some_and(|record| record.occurrences == 3)
            && store.get(&i2).is_some_and(|record| record.occurrences == 3)
    })
    .await;
    assert!(!harness.stamped(&index_1));

    // Run 4: the merge finally completes; stamps land and the errors clear.
    harness
        .client
        .set_force_merge_behavior(ForceMergeBehavior::Respond(ForceMergeResponse::success(5)));
    harness.run();
    assert_eventually(WAIT, || {
        harness.stamped(&index_1) && harness.stamped(&index_2)
    })
    .await;
    let store = Arc::clone(harness.service.error_store());
    let (i1, i2) = (index_1.clone(), index_2.clone());
    assert_eventually(WAIT, move || {
        store.get(&i1).is_none() && store.get(&i2).is_none()
    })
    .await;

    // One rollover plus three failed rounds and one successful round of two
    // merges each.
    assert_eq!(harness.client.seen_len(), 9);
    let merges = harness
        .client
        .seen()
        .into_iter()
        .filter(|request| matches!(request, SeenRequest::ForceMerge(_)))
        .count();
    assert_eq!(merges, 8);

    // Only the never-answered rollover remains in flight.
    assert_eq!(harness.service.in_flight_actions(), 1);
}

#[tokio::test]
async fn foreign_policy_indices_are_skipped() {
    let foreign = Settings::new().with(LIFECYCLE_POLICY_NAME_SETTING, "legacy-policy");
    let state = data_stream_state(
        "logs",
        3,
        &foreign,
        Some(LifecycleSpec::with_retention(Duration::ZERO)),
        NOW_MS,
    );
    let harness = Harness::new(state);

    harness.run();
    settle().await;
    assert_eq!(harness.client.seen_len(), 0);
}

#[tokio::test]
async fn streams_without_lifecycle_are_skipped() {
    let state = data_stream_state("logs", 3, &Settings::new(), None, NOW_MS);
    let harness = Harness::new(state);

    harness.run();
    settle().await;
    assert_eq!(harness.client.seen_len(), 0);
}

#[tokio::test]
async fn non_master_run_has_no_side_effects() {
    let mut state = data_stream_state(
        "logs",
        3,
        &Settings::new(),
        Some(LifecycleSpec::with_retention(Duration::ZERO)),
        NOW_MS,
    );
    state.nodes = ClusterNodes::default();
    let harness = Harness::new(state);

    harness.run();
    settle().await;
    assert_eq!(harness.client.seen_len(), 0);
}

#[tokio::test]
async fn deleted_indices_are_removed_from_the_error_store() {
    let state = data_stream_state(
        "logs",
        3,
        &Settings::new(),
        Some(LifecycleSpec::default()),
        NOW_MS,
    );
    let harness = Harness::new(state);
    let write_index = backing_index_name("logs", 3);

    for generation in 1..=3 {
        harness
            .service
            .error_store()
            .record(&backing_index_name("logs", generation), "bad");
    }

    // The two non-write indices get deleted and tombstoned.
    let mut next = (*harness.cluster.state()).clone();
    for generation in 1..=2 {
        let name = backing_index_name("logs", generation);
        next.metadata.remove_index(&name);
        next.metadata.graveyard.add_tombstone(&name, NOW_MS);
    }
    harness.cluster.apply_state(next);

    harness.run();

    assert!(harness
        .service
        .error_store()
        .get(&backing_index_name("logs", 1))
        .is_none());
    assert!(harness
        .service
        .error_store()
        .get(&backing_index_name("logs", 2))
        .is_none());
    // The write index still exists and stays managed, so its entry is kept.
    assert!(harness.service.error_store().get(&write_index).is_some());
}

#[tokio::test]
async fn error_store_is_cleared_when_indices_become_unmanaged() {
    let state = data_stream_state(
        "logs",
        3,
        &Settings::new(),
        Some(LifecycleSpec::with_retention(retention_days(700))),
        NOW_MS,
    );
    let harness = Harness::new(state);

    for generation in 1..=3 {
        harness
            .service
            .error_store()
            .record(&backing_index_name("logs", generation), "bad");
    }

    let mut next = (*harness.cluster.state()).clone();
    for index in next.metadata.indices.values_mut() {
        index.settings = index
            .settings
            .clone()
            .with(LIFECYCLE_POLICY_NAME_SETTING, "legacy-policy");
    }
    harness.cluster.apply_state(next);

    harness.run();

    assert!(harness.service.error_store().is_empty());
}

#[tokio::test]
async fn deduplicator_stays_bounded_and_drains() {
    let state = data_stream_state(
        "logs",
        4,
        &merge_policy_settings(),
        Some(LifecycleSpec::default()),
        NOW_MS,
    );
    let harness = Harness::new(state);
    harness
        .client
        .set_rollover_behavior(RolloverBehavior::Respond(tidemark_lifecycle::RolloverResponse {
            old_index: backing_index_name("logs", 4),
            new_index: backing_index_name("logs", 5),
            rolled_over: false,
        }));
    harness
        .client
        .set_update_settings_behavior(UnitBehavior::Respond);
    harness
        .client
        .set_force_merge_behavior(ForceMergeBehavior::Respond(ForceMergeResponse::success(5)));

    for _ in 0..10 {
        harness.run();
        // One rollover plus at most one action per non-write index.
        assert!(harness.service.in_flight_actions() <= 4);
        assert_eventually(WAIT, || harness.service.in_flight_actions() == 0).await;
    }
}

#[tokio::test]
async fn init_registers_the_service_as_listener() {
    let state = data_stream_state(
        "logs",
        3,
        &Settings::new(),
        Some(LifecycleSpec::with_retention(Duration::ZERO)),
        NOW_MS,
    );
    let harness = Harness::new(state);
    harness.service.init();

    // Publishing a state drives a run without an explicit call.
    harness.cluster.apply_state((*harness.cluster.state()).clone());
    let client = Arc::clone(&harness.client);
    assert_eventually(WAIT, move || client.seen_len() == 3).await;
}

#[tokio::test]
async fn retention_uses_the_simulated_clock() {
    let retention = Duration::from_secs(60);
    let state = data_stream_state(
        "logs",
        3,
        &merge_policy_settings(),
        Some(LifecycleSpec::with_retention(retention)),
        NOW_MS,
    );
    let harness = Harness::new(state);

    // Indices are a few seconds old: nothing to delete yet.
    harness.run();
    let client = Arc::clone(&harness.client);
    assert_eventually(WAIT, move || client.seen_len() == 3).await;
    let deletes = |harness: &Harness| {
        harness
            .client
            .seen()
            .into_iter()
            .filter(|request| matches!(request, SeenRequest::DeleteIndex(_)))
            .count()
    };
    assert_eq!(deletes(&harness), 0);

    // Two minutes later both non-write indices are past retention.
    harness.clock.advance(Duration::from_secs(120));
    harness.run();
    let client = Arc::clone(&harness.client);
    assert_eventually(WAIT, move || client.seen_len() == 5).await;
    assert_eq!(deletes(&harness), 2);
}
