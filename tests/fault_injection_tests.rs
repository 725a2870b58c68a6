use std::sync::{Mutex, MutexGuard, OnceLock};

use contentgraph::{
    ChunkConfig, ColumnMatch, ContentGraphError, GraphStore, LoadOptions, Row, Table,
    bench_utils::generate_batch,
    chunked_update,
    fault_injection::{FaultPoint, configure_fault, configure_fault_after, reset_faults},
    load_with_hash,
};

fn test_lock() -> MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let guard = LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    reset_faults();
    guard
}

#[test]
fn test_failed_chunk_keeps_earlier_commits_and_rerun_completes() {
    let _guard = test_lock();
    let batch = generate_batch(10, 0, 21);
    let store = GraphStore::open_in_memory().unwrap();
    let options = LoadOptions::insert_only(ChunkConfig::with_chunk_size(4));

    configure_fault_after(FaultPoint::ChunkInsertBeforeCommit, 1, 1);
    let err = load_with_hash(&store, &batch.nodes, Table::Node, &options).unwrap_err();
    assert!(matches!(err, ContentGraphError::FaultInjected(_)));
    assert_eq!(store.count(Table::Node).unwrap(), 4);
    assert_eq!(store.metrics_snapshot().tx_rollback_count, 1);

    let lookup = load_with_hash(&store, &batch.nodes, Table::Node, &options).unwrap();
    assert_eq!(lookup.existing, 4);
    assert_eq!(lookup.inserted, 6);
    assert_eq!(store.count(Table::Node).unwrap(), 10);
}

#[test]
fn test_fault_fires_only_the_configured_number_of_times() {
    let _guard = test_lock();
    let batch = generate_batch(4, 0, 22);
    let store = GraphStore::open_in_memory().unwrap();
    let options = LoadOptions::insert_only(ChunkConfig::with_chunk_size(2));

    configure_fault(FaultPoint::ChunkInsertBeforeCommit, 1);
    assert!(load_with_hash(&store, &batch.nodes, Table::Node, &options).is_err());
    assert_eq!(store.count(Table::Node).unwrap(), 0);

    load_with_hash(&store, &batch.nodes, Table::Node, &options).unwrap();
    assert_eq!(store.count(Table::Node).unwrap(), 4);
}

#[test]
fn test_failed_update_chunk_rolls_back_only_that_chunk() {
    let _guard = test_lock();
    let batch = generate_batch(4, 0, 23);
    let store = GraphStore::open_in_memory().unwrap();
    load_with_hash(
        &store,
        &batch.nodes,
        Table::Node,
        &LoadOptions::insert_only(ChunkConfig::default()),
    )
    .unwrap();

    let updates: Vec<Row> = batch
        .nodes
        .iter()
        .map(|n| {
            Row::new()
                .with("hash", n.hash.clone())
                .with("data", r#"{"updated":true}"#.to_string())
        })
        .collect();
    configure_fault_after(FaultPoint::ChunkUpdateBeforeCommit, 1, 1);
    let err = chunked_update(
        &store,
        &updates,
        Table::Node,
        &ColumnMatch::same("hash"),
        &["data"],
        &ChunkConfig::with_chunk_size(2),
    )
    .unwrap_err();
    assert!(matches!(err, ContentGraphError::FaultInjected(_)));

    let updated: Vec<bool> = batch
        .nodes
        .iter()
        .map(|n| {
            let node = store.node_by_hash(&n.hash).unwrap().unwrap();
            node.data.get("updated").is_some()
        })
        .collect();
    assert_eq!(updated, vec![true, true, false, false]);
}

#[test]
fn test_reset_clears_pending_faults() {
    let _guard = test_lock();
    configure_fault(FaultPoint::ChunkInsertBeforeCommit, 5);
    reset_faults();
    let batch = generate_batch(3, 0, 24);
    let store = GraphStore::open_in_memory().unwrap();
    load_with_hash(
        &store,
        &batch.nodes,
        Table::Node,
        &LoadOptions::insert_only(ChunkConfig::default()),
    )
    .unwrap();
    assert_eq!(store.count(Table::Node).unwrap(), 3);
}
