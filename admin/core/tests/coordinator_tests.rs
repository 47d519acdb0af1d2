// Copyright (c) Venice Contributors
// SPDX-License-Identifier: Apache-2.0

//! End-to-end scenarios for the admin consumption pipeline, driven through
//! the public API with in-memory collaborators.

use std::sync::Arc;
use std::time::Duration;

use admin_config::{ClusterRole, Parameters};
use admin_core::testing::{BackendCall, RecordingBackend};
use admin_core::{
    timestamp_utc_ms, AdminOperation, AdminPayload, Coordinator, CoordinatorHandle,
    KillOfflinePushJob, MemLogStream, MemWatermarkStore, OperationCodec, SetStoreOwner,
    StaticLeaderOracle, StoreCreation, StoreTarget, ValueSchemaCreation, WatermarkStore,
};
use bytes::Bytes;
use prometheus::Registry;

const CLUSTER: &str = "venice-0";

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn test_parameters() -> Parameters {
    Parameters {
        worker_pool_size: 4,
        schedule_interval: Duration::from_millis(5),
        checkpoint_interval: Duration::from_millis(25),
        retry_backoff_base: Duration::from_millis(10),
        retry_backoff_max: Duration::from_millis(100),
        ..Parameters::default()
    }
}

fn op(execution_id: u64, payload: AdminPayload) -> AdminOperation {
    AdminOperation {
        execution_id,
        payload,
        producer_timestamp_ms: timestamp_utc_ms(),
        broker_timestamp_ms: timestamp_utc_ms(),
    }
}

fn creation(store: &str, owner: &str) -> AdminPayload {
    AdminPayload::StoreCreation(StoreCreation {
        store_name: store.to_string(),
        owner: owner.to_string(),
        key_schema: "\"string\"".to_string(),
        value_schema: "\"bytes\"".to_string(),
        is_system_store: false,
    })
}

fn enable_write(store: &str) -> AdminPayload {
    AdminPayload::EnableStoreWrite(StoreTarget {
        store_name: store.to_string(),
    })
}

fn enable_read(store: &str) -> AdminPayload {
    AdminPayload::EnableStoreRead(StoreTarget {
        store_name: store.to_string(),
    })
}

fn set_owner(store: &str, owner: &str) -> AdminPayload {
    AdminPayload::SetStoreOwner(SetStoreOwner {
        store_name: store.to_string(),
        owner: owner.to_string(),
    })
}

fn append(log: &MemLogStream, operation: &AdminOperation) {
    log.append(OperationCodec::encode(operation).unwrap());
}

async fn start_with(
    role: ClusterRole,
    parameters: Parameters,
    registry: &Registry,
    log: &Arc<MemLogStream>,
    backend: &Arc<RecordingBackend>,
    watermark: &Arc<MemWatermarkStore>,
    oracle: &StaticLeaderOracle,
) -> CoordinatorHandle {
    Coordinator::start(
        CLUSTER,
        role,
        parameters,
        registry,
        log.clone(),
        backend.clone(),
        watermark.clone(),
        oracle,
    )
    .await
    .unwrap()
}

async fn start(
    role: ClusterRole,
    registry: &Registry,
    log: &Arc<MemLogStream>,
    backend: &Arc<RecordingBackend>,
    watermark: &Arc<MemWatermarkStore>,
    oracle: &StaticLeaderOracle,
) -> CoordinatorHandle {
    start_with(role, test_parameters(), registry, log, backend, watermark, oracle).await
}

async fn checkpoint(watermark: &MemWatermarkStore) -> Option<u64> {
    watermark.read_offset(CLUSTER).await.unwrap()
}

async fn exec_id(watermark: &MemWatermarkStore, store: &str) -> Option<u64> {
    watermark
        .read_exec_ids(CLUSTER)
        .await
        .unwrap()
        .get(store)
        .copied()
}

async fn wait_for_exec_id(watermark: &MemWatermarkStore, store: &str, id: u64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if exec_id(watermark, store).await == Some(id) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "execution id of {store} never reached {id}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn wait_for_checkpoint(watermark: &MemWatermarkStore, offset: u64) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if checkpoint(watermark).await >= Some(offset) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "checkpoint never reached {offset}"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn wait_for_calls(backend: &RecordingBackend, count: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if backend.call_count() >= count {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "backend never saw {count} calls"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn counter_value(registry: &Registry, name: &str) -> f64 {
    registry
        .gather()
        .iter()
        .find(|family| family.get_name() == name)
        .map(|family| family.get_metric()[0].get_counter().get_value())
        .unwrap_or_default()
}

#[tokio::test]
async fn happy_path_executes_per_store_in_order() {
    init_tracing();
    let log = Arc::new(MemLogStream::new());
    let backend = Arc::new(RecordingBackend::new());
    let watermark = Arc::new(MemWatermarkStore::new());
    let oracle = StaticLeaderOracle::leader();
    let registry = Registry::new();

    append(&log, &op(1, creation("store-a", "owner-x")));
    append(&log, &op(2, enable_write("store-a")));
    append(&log, &op(3, creation("store-b", "owner-y")));

    let handle = start(
        ClusterRole::Child,
        &registry,
        &log,
        &backend,
        &watermark,
        &oracle,
    )
    .await;
    wait_for_exec_id(&watermark, "store-a", 2).await;
    wait_for_exec_id(&watermark, "store-b", 3).await;
    handle.stop().await.unwrap();

    let calls = backend.calls();
    let store_a: Vec<_> = calls
        .iter()
        .filter(|c| c.store() == Some("store-a"))
        .cloned()
        .collect();
    assert_eq!(
        store_a,
        vec![
            BackendCall::CreateStore {
                store: "store-a".to_string(),
                owner: "owner-x".to_string(),
            },
            BackendCall::SetWriteability {
                store: "store-a".to_string(),
                writeable: true,
            },
        ]
    );
    let store_b: Vec<_> = calls
        .iter()
        .filter(|c| c.store() == Some("store-b"))
        .cloned()
        .collect();
    assert_eq!(
        store_b,
        vec![BackendCall::CreateStore {
            store: "store-b".to_string(),
            owner: "owner-y".to_string(),
        }]
    );

    // All three records (offsets 0..=2) are terminal.
    assert_eq!(checkpoint(&watermark).await, Some(2));
}

#[tokio::test]
async fn duplicate_execution_id_is_suppressed() {
    init_tracing();
    let log = Arc::new(MemLogStream::new());
    let backend = Arc::new(RecordingBackend::new());
    let watermark = Arc::new(MemWatermarkStore::new());
    let oracle = StaticLeaderOracle::leader();
    let registry = Registry::new();

    watermark.bump_exec_id(CLUSTER, "store-a", 5).await.unwrap();
    append(&log, &op(5, set_owner("store-a", "owner-z")));

    let handle = start(
        ClusterRole::Child,
        &registry,
        &log,
        &backend,
        &watermark,
        &oracle,
    )
    .await;
    // The checkpoint still advances past the suppressed record.
    wait_for_checkpoint(&watermark, 0).await;
    handle.stop().await.unwrap();

    assert!(backend.calls().is_empty());
    assert_eq!(exec_id(&watermark, "store-a").await, Some(5));
}

#[tokio::test]
async fn retriable_failure_retries_in_place() {
    init_tracing();
    let log = Arc::new(MemLogStream::new());
    let backend = Arc::new(RecordingBackend::new());
    let watermark = Arc::new(MemWatermarkStore::new());
    let oracle = StaticLeaderOracle::leader();
    let registry = Registry::new();

    backend.fail_transient("create_store", 1);
    append(&log, &op(1, creation("store-a", "owner-x")));

    // A backoff comfortably longer than the assertion window below, so the
    // retry cannot land between observing the failure and checking state.
    let parameters = Parameters {
        retry_backoff_base: Duration::from_millis(50),
        retry_backoff_max: Duration::from_millis(200),
        ..test_parameters()
    };
    let handle = start_with(
        ClusterRole::Child,
        parameters,
        &registry,
        &log,
        &backend,
        &watermark,
        &oracle,
    )
    .await;

    // The failed attempt must not advance the checkpoint past the head.
    wait_for_calls(&backend, 1).await;
    assert_eq!(checkpoint(&watermark).await, None);
    assert_eq!(exec_id(&watermark, "store-a").await, None);

    wait_for_exec_id(&watermark, "store-a", 1).await;
    handle.stop().await.unwrap();

    // Both attempts hit the backend; the state committed exactly once.
    assert_eq!(
        backend
            .calls()
            .iter()
            .filter(|c| matches!(c, BackendCall::CreateStore { .. }))
            .count(),
        2
    );
    assert_eq!(checkpoint(&watermark).await, Some(0));
    assert!(counter_value(&registry, "failed_retriable_admin_consumption") >= 1.0);
}

#[tokio::test]
async fn unsupported_kind_is_ignored_and_committed() {
    init_tracing();
    let log = Arc::new(MemLogStream::new());
    let backend = Arc::new(RecordingBackend::new());
    let watermark = Arc::new(MemWatermarkStore::new());
    let oracle = StaticLeaderOracle::leader();
    let registry = Registry::new();

    append(
        &log,
        &op(
            7,
            AdminPayload::KillOfflinePushJob(KillOfflinePushJob {
                topic: "store-a_v3".to_string(),
            }),
        ),
    );

    let handle = start(
        ClusterRole::Parent,
        &registry,
        &log,
        &backend,
        &watermark,
        &oracle,
    )
    .await;
    wait_for_exec_id(&watermark, "store-a", 7).await;
    handle.stop().await.unwrap();

    assert!(backend.calls().is_empty());
    assert_eq!(checkpoint(&watermark).await, Some(0));
}

#[tokio::test]
async fn stores_progress_independently_and_in_order() {
    init_tracing();
    let log = Arc::new(MemLogStream::new());
    let backend = Arc::new(RecordingBackend::new());
    let watermark = Arc::new(MemWatermarkStore::new());
    let oracle = StaticLeaderOracle::leader();
    let registry = Registry::new();

    for id in 1..=100u64 {
        let store = if id % 2 == 1 { "store-a" } else { "store-b" };
        append(&log, &op(id, set_owner(store, &format!("owner-{id}"))));
    }

    let handle = start(
        ClusterRole::Child,
        &registry,
        &log,
        &backend,
        &watermark,
        &oracle,
    )
    .await;
    wait_for_exec_id(&watermark, "store-a", 99).await;
    wait_for_exec_id(&watermark, "store-b", 100).await;
    handle.stop().await.unwrap();

    let calls = backend.calls();
    assert_eq!(calls.len(), 100);
    for store in ["store-a", "store-b"] {
        let ids: Vec<u64> = calls
            .iter()
            .filter_map(|c| match c {
                BackendCall::SetOwner { store: s, owner } if s == store => {
                    Some(owner.strip_prefix("owner-").unwrap().parse().unwrap())
                }
                _ => None,
            })
            .collect();
        assert_eq!(ids.len(), 50, "{store}");
        assert!(
            ids.windows(2).all(|pair| pair[0] < pair[1]),
            "{store} executed out of order: {ids:?}"
        );
    }
    assert_eq!(checkpoint(&watermark).await, Some(99));
}

#[tokio::test]
async fn malformed_record_is_skipped() {
    init_tracing();
    let log = Arc::new(MemLogStream::new());
    let backend = Arc::new(RecordingBackend::new());
    let watermark = Arc::new(MemWatermarkStore::new());
    let oracle = StaticLeaderOracle::leader();
    let registry = Registry::new();

    append(&log, &op(1, enable_read("store-a")));
    log.append(Bytes::from_static(b"\xde\xad not an admin record"));
    append(&log, &op(2, enable_read("store-b")));

    let handle = start(
        ClusterRole::Child,
        &registry,
        &log,
        &backend,
        &watermark,
        &oracle,
    )
    .await;
    wait_for_checkpoint(&watermark, 2).await;
    handle.stop().await.unwrap();

    assert_eq!(backend.call_count(), 2);
    assert_eq!(counter_value(&registry, "malformed_admin_records"), 1.0);
}

#[tokio::test]
async fn nothing_runs_without_leadership() {
    init_tracing();
    let log = Arc::new(MemLogStream::new());
    let backend = Arc::new(RecordingBackend::new());
    let watermark = Arc::new(MemWatermarkStore::new());
    let oracle = StaticLeaderOracle::follower();
    let registry = Registry::new();

    append(&log, &op(1, creation("store-a", "owner-x")));

    let handle = start(
        ClusterRole::Child,
        &registry,
        &log,
        &backend,
        &watermark,
        &oracle,
    )
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(backend.calls().is_empty());
    assert_eq!(checkpoint(&watermark).await, None);

    oracle.set_leader(true);
    wait_for_exec_id(&watermark, "store-a", 1).await;

    // Losing leadership stalls consumption again.
    oracle.set_leader(false);
    append(&log, &op(2, enable_write("store-a")));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(backend.call_count(), 1);

    oracle.set_leader(true);
    wait_for_exec_id(&watermark, "store-a", 2).await;
    handle.stop().await.unwrap();
    assert_eq!(backend.call_count(), 2);
}

#[tokio::test]
async fn restart_resumes_from_checkpoint_without_replaying_effects() {
    init_tracing();
    let log = Arc::new(MemLogStream::new());
    let backend = Arc::new(RecordingBackend::new());
    let watermark = Arc::new(MemWatermarkStore::new());
    let oracle = StaticLeaderOracle::leader();

    append(&log, &op(1, creation("store-a", "owner-x")));
    append(&log, &op(2, enable_write("store-a")));

    let handle = start(
        ClusterRole::Child,
        &Registry::new(),
        &log,
        &backend,
        &watermark,
        &oracle,
    )
    .await;
    wait_for_exec_id(&watermark, "store-a", 2).await;
    handle.stop().await.unwrap();
    assert_eq!(checkpoint(&watermark).await, Some(1));
    assert_eq!(backend.call_count(), 2);

    // Restart against the same log and watermark: consumption resumes after
    // the checkpoint and the earlier effects are not repeated.
    let handle = start(
        ClusterRole::Child,
        &Registry::new(),
        &log,
        &backend,
        &watermark,
        &oracle,
    )
    .await;
    append(&log, &op(3, set_owner("store-a", "owner-z")));
    wait_for_exec_id(&watermark, "store-a", 3).await;
    handle.stop().await.unwrap();

    assert_eq!(backend.call_count(), 3);
    assert_eq!(checkpoint(&watermark).await, Some(2));
}

#[tokio::test]
async fn log_rewind_is_absorbed_by_execution_id_dedup() {
    init_tracing();
    let log = Arc::new(MemLogStream::new());
    let backend = Arc::new(RecordingBackend::new());
    let watermark = Arc::new(MemWatermarkStore::new());
    let oracle = StaticLeaderOracle::leader();

    append(&log, &op(1, creation("store-a", "owner-x")));
    append(&log, &op(2, enable_write("store-a")));

    let handle = start(
        ClusterRole::Child,
        &Registry::new(),
        &log,
        &backend,
        &watermark,
        &oracle,
    )
    .await;
    wait_for_exec_id(&watermark, "store-a", 2).await;
    handle.stop().await.unwrap();
    let calls_after_first_run = backend.call_count();

    // A watermark store that kept the execution ids but lost the offset makes
    // the tailer re-read the log from the start, as a log rewind would.
    let rewound = Arc::new(MemWatermarkStore::new());
    rewound.bump_exec_id(CLUSTER, "store-a", 2).await.unwrap();

    let handle = start(
        ClusterRole::Child,
        &Registry::new(),
        &log,
        &backend,
        &rewound,
        &oracle,
    )
    .await;
    wait_for_checkpoint(&rewound, 1).await;
    handle.stop().await.unwrap();

    assert_eq!(backend.call_count(), calls_after_first_run);
}

#[tokio::test]
async fn fatal_failure_halts_consumption() {
    init_tracing();
    let log = Arc::new(MemLogStream::new());
    let backend = Arc::new(RecordingBackend::new());
    let watermark = Arc::new(MemWatermarkStore::new());
    let oracle = StaticLeaderOracle::leader();
    let registry = Registry::new();

    backend.fail_rejected("add_value_schema", 1);
    append(
        &log,
        &op(
            1,
            AdminPayload::ValueSchemaCreation(ValueSchemaCreation {
                store_name: "store-a".to_string(),
                schema_id: 4,
                schema: "\"long\"".to_string(),
            }),
        ),
    );
    append(&log, &op(2, enable_write("store-a")));

    let handle = start(
        ClusterRole::Child,
        &registry,
        &log,
        &backend,
        &watermark,
        &oracle,
    )
    .await;
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !handle.is_finished() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "coordinator never halted"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let err = handle.stop().await.unwrap_err();
    assert!(matches!(err, admin_core::AdminError::Rejected(_)), "{err}");

    // The head stays uncommitted and nothing after it runs.
    assert_eq!(exec_id(&watermark, "store-a").await, None);
    assert_eq!(checkpoint(&watermark).await, None);
    assert_eq!(backend.call_count(), 1);
    assert!(counter_value(&registry, "failed_admin_consumption") >= 1.0);
}
