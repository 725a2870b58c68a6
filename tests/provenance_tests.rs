use chrono::{TimeZone, Utc};
use contentgraph::{
    ChangeType, ChunkConfig, ConflictPolicy, GraphStore, LoadOptions, Provenance, Table,
    bench_utils::generate_batch, chunked_insert, load_with_hash, model::HistoryRecord,
    record_creations,
};

fn loaded_ids(store: &GraphStore, count: usize) -> Vec<i64> {
    let batch = generate_batch(count, 0, 17);
    let lookup = load_with_hash(
        store,
        &batch.nodes,
        Table::Node,
        &LoadOptions::insert_only(ChunkConfig::default()),
    )
    .unwrap();
    lookup.rows().into_iter().map(|r| r.id).collect()
}

#[test]
fn test_reruns_write_exactly_one_create_row() {
    let store = GraphStore::open_in_memory().unwrap();
    let ids = loaded_ids(&store, 9);
    let provenance = Provenance::new("chebi").with_details("ChEBI_complete.sdf");
    let config = ChunkConfig::with_chunk_size(4);

    assert_eq!(
        record_creations(&store, Table::NodeHistory, &ids, &provenance, &config).unwrap(),
        9
    );
    for _ in 0..3 {
        assert_eq!(
            record_creations(&store, Table::NodeHistory, &ids, &provenance, &config).unwrap(),
            0
        );
    }
    assert_eq!(store.count(Table::NodeHistory).unwrap(), 9);
    for id in &ids {
        let history = store.history(Table::NodeHistory, *id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].change_type, ChangeType::Create);
        assert_eq!(history[0].source, "chebi");
        assert_eq!(history[0].source_details.as_deref(), Some("ChEBI_complete.sdf"));
    }
}

#[test]
fn test_only_missing_ids_are_recorded() {
    let store = GraphStore::open_in_memory().unwrap();
    let ids = loaded_ids(&store, 6);
    let provenance = Provenance::new("rhea");
    let config = ChunkConfig::default();
    record_creations(&store, Table::NodeHistory, &ids[..2], &provenance, &config).unwrap();

    let mut with_repeats = ids.clone();
    with_repeats.extend_from_slice(&ids[3..]);
    let written =
        record_creations(&store, Table::NodeHistory, &with_repeats, &provenance, &config).unwrap();
    assert_eq!(written, 4);
    assert_eq!(store.count(Table::NodeHistory).unwrap(), 6);
}

#[test]
fn test_history_captures_time_and_attribution() {
    let store = GraphStore::open_in_memory().unwrap();
    let ids = loaded_ids(&store, 1);
    let time = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let provenance = Provenance::new("ncbi_taxonomy")
        .with_attribution("NCBI")
        .at(time);
    record_creations(&store, Table::NodeHistory, &ids, &provenance, &ChunkConfig::default())
        .unwrap();
    let history = store.history(Table::NodeHistory, ids[0]).unwrap();
    assert_eq!(history[0].time, "2024-03-01T12:00:00.000000Z");
    assert_eq!(history[0].attribution.as_deref(), Some("NCBI"));
    assert_eq!(history[0].changed_field, None);
}

#[test]
fn test_store_rejects_a_second_create_row() {
    let store = GraphStore::open_in_memory().unwrap();
    let ids = loaded_ids(&store, 1);
    let provenance = Provenance::new("chebi");
    record_creations(&store, Table::NodeHistory, &ids, &provenance, &ChunkConfig::default())
        .unwrap();

    let duplicate = HistoryRecord {
        entity_id: ids[0],
        source: "chebi".into(),
        source_details: None,
        change_type: ChangeType::Create,
        time: Utc::now(),
        attribution: None,
        changed_field: None,
    };
    let result = chunked_insert(
        &store,
        &[duplicate.clone()],
        Table::NodeHistory,
        &ChunkConfig::default(),
        &ConflictPolicy::Error,
        &[],
    );
    assert!(result.is_err());

    let modify = HistoryRecord {
        change_type: ChangeType::Modify,
        changed_field: Some("data".into()),
        ..duplicate
    };
    chunked_insert(
        &store,
        &[modify],
        Table::NodeHistory,
        &ChunkConfig::default(),
        &ConflictPolicy::Error,
        &[],
    )
    .unwrap();
    assert_eq!(store.history(Table::NodeHistory, ids[0]).unwrap().len(), 2);
}

#[test]
fn test_non_history_tables_are_rejected() {
    let store = GraphStore::open_in_memory().unwrap();
    let err = record_creations(
        &store,
        Table::Node,
        &[1],
        &Provenance::new("chebi"),
        &ChunkConfig::default(),
    )
    .unwrap_err();
    assert!(err.is_validation());
}
