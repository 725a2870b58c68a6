use contentgraph::{
    GraphStore, Table,
    schema::{BASE_SCHEMA_VERSION, SCHEMA_VERSION},
};
use rusqlite::Connection;
use tempfile::tempdir;

#[test]
fn test_fresh_store_is_at_latest_version() {
    let store = GraphStore::open_in_memory().unwrap();
    assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
    assert_eq!(store.count(Table::NodeSearch).unwrap(), 0);

    let report = store.run_pending_migrations(false).unwrap();
    assert!(report.statements.is_empty());
    assert_eq!(report.to_version, SCHEMA_VERSION);
}

#[test]
fn test_base_schema_lacks_search_view_until_migrated() {
    let store = GraphStore::open_in_memory_without_migrations().unwrap();
    assert_eq!(store.schema_version().unwrap(), BASE_SCHEMA_VERSION);
    assert!(store.count(Table::NodeSearch).is_err());

    let dry = store.run_pending_migrations(true).unwrap();
    assert!(dry.dry_run);
    assert_eq!(dry.from_version, BASE_SCHEMA_VERSION);
    assert_eq!(dry.to_version, SCHEMA_VERSION);
    assert_eq!(dry.statements.len(), 7);
    assert_eq!(store.schema_version().unwrap(), BASE_SCHEMA_VERSION);

    let applied = store.run_pending_migrations(false).unwrap();
    assert!(!applied.dry_run);
    assert_eq!(applied.statements.len(), 7);
    assert_eq!(store.schema_version().unwrap(), SCHEMA_VERSION);
    assert_eq!(store.count(Table::NodeSearch).unwrap(), 0);
}

#[test]
fn test_reopening_a_file_store_keeps_its_version() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("graph.db");
    GraphStore::open_without_migrations(&path)
        .unwrap()
        .close()
        .unwrap();

    let reopened = GraphStore::open(&path).unwrap();
    assert_eq!(reopened.schema_version().unwrap(), SCHEMA_VERSION);
    reopened.close().unwrap();

    let again = GraphStore::open_without_migrations(&path).unwrap();
    assert_eq!(again.schema_version().unwrap(), SCHEMA_VERSION);
}

#[test]
fn test_newer_database_version_is_refused() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("future.db");
    GraphStore::open(&path).unwrap().close().unwrap();

    let conn = Connection::open(&path).unwrap();
    conn.execute(
        "UPDATE graph_meta SET schema_version=?1 WHERE id=1",
        [SCHEMA_VERSION + 1],
    )
    .unwrap();
    drop(conn);

    let err = match GraphStore::open(&path) {
        Ok(_) => panic!("newer schema should be refused"),
        Err(err) => err,
    };
    assert!(err.to_string().contains("newer than supported"));
}
