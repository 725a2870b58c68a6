//! Store connection context with an explicit open/close lifecycle.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value as JsonValue;

use crate::{
    errors::ContentGraphError,
    model::{ChangeType, Edge, HistoryEntry, Node},
    schema::{
        MigrationReport, ensure_schema, ensure_schema_without_migrations, read_schema_version,
        run_pending_migrations,
    },
};

use super::{
    metrics::{InstrumentedConnection, StoreMetrics, StoreMetricsSnapshot},
    table::Table,
};

/// An open SQLite store holding the content-addressed graph.
///
/// Every engine operation takes a `&GraphStore`; there is no ambient
/// connection. The store owns exactly one connection and is not `Sync`, so a
/// single context can never be shared between concurrent writers.
pub struct GraphStore {
    conn: Connection,
    metrics: StoreMetrics,
}

fn is_in_memory_connection(conn: &Connection) -> bool {
    match conn.pragma_query_value(None, "database_list", |row| {
        let name: String = row.get(2)?;
        Ok(name)
    }) {
        Ok(name) => name.is_empty() || name == ":memory:",
        Err(_) => true,
    }
}

impl GraphStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ContentGraphError> {
        let conn =
            Connection::open(path).map_err(|e| ContentGraphError::connection(e.to_string()))?;
        ensure_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_without_migrations<P: AsRef<Path>>(path: P) -> Result<Self, ContentGraphError> {
        let conn =
            Connection::open(path).map_err(|e| ContentGraphError::connection(e.to_string()))?;
        ensure_schema_without_migrations(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self, ContentGraphError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ContentGraphError::connection(e.to_string()))?;
        ensure_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory_without_migrations() -> Result<Self, ContentGraphError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ContentGraphError::connection(e.to_string()))?;
        ensure_schema_without_migrations(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        conn.set_prepared_statement_cache_capacity(128);

        if !is_in_memory_connection(&conn) {
            if conn.pragma_update(None, "journal_mode", "WAL").is_err() {
                // network filesystems may refuse WAL
                let _ = conn.pragma_update(None, "journal_mode", "DELETE");
            }
            let _ = conn.pragma_update(None, "synchronous", "NORMAL");
            let _ = conn.pragma_update(None, "cache_size", "-64000");
            let _ = conn.pragma_update(None, "temp_store", "MEMORY");
        }

        Self {
            conn,
            metrics: StoreMetrics::default(),
        }
    }

    /// Close the underlying connection, surfacing any error SQLite reports.
    pub fn close(self) -> Result<(), ContentGraphError> {
        self.conn
            .close()
            .map_err(|(_, e)| ContentGraphError::connection(e.to_string()))
    }

    pub fn apply_pragma(&self, key: &str, value: &str) -> Result<(), ContentGraphError> {
        let sql = format!("PRAGMA {key} = {value}");
        match self.conn.execute(&sql, []) {
            Ok(_) | Err(rusqlite::Error::ExecuteReturnedResults) => Ok(()),
            Err(e) => Err(ContentGraphError::connection(format!(
                "PRAGMA {key} = {value}: {e}"
            ))),
        }
    }

    pub fn schema_version(&self) -> Result<i64, ContentGraphError> {
        read_schema_version(&self.conn)
    }

    pub fn run_pending_migrations(
        &self,
        dry_run: bool,
    ) -> Result<MigrationReport, ContentGraphError> {
        run_pending_migrations(&self.conn, dry_run)
    }

    pub fn metrics_snapshot(&self) -> StoreMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    pub(crate) fn connection(&self) -> InstrumentedConnection<'_> {
        InstrumentedConnection::new(&self.conn, &self.metrics)
    }

    pub fn count(&self, table: Table) -> Result<i64, ContentGraphError> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.name());
        self.connection()
            .query_row(&sql, [], |row| row.get(0))
            .map_err(|e| ContentGraphError::query(e.to_string()))
    }

    pub fn node_by_hash(&self, hash: &str) -> Result<Option<Node>, ContentGraphError> {
        self.connection()
            .query_row(
                "SELECT id, node_type_id, data, hash FROM node WHERE hash=?1",
                params![hash],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| ContentGraphError::query(e.to_string()))?
            .map(|(id, node_type_id, data, hash)| -> Result<Node, ContentGraphError> {
                Ok(Node {
                    id,
                    node_type_id,
                    data: parse_json(&data)?,
                    hash,
                })
            })
            .transpose()
    }

    pub fn edge_by_hash(&self, hash: &str) -> Result<Option<Edge>, ContentGraphError> {
        self.connection()
            .query_row(
                "SELECT id, source_id, destination_id, relationship, hash, data FROM edge WHERE hash=?1",
                params![hash],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| ContentGraphError::query(e.to_string()))?
            .map(|(id, source_id, destination_id, relationship, hash, data)| {
                let data: Option<JsonValue> = data.as_deref().map(parse_json).transpose()?;
                Ok::<_, ContentGraphError>(Edge {
                    id,
                    source_id,
                    destination_id,
                    relationship,
                    hash,
                    data,
                })
            })
            .transpose()
    }

    /// History rows for one node or edge, oldest first.
    pub fn history(
        &self,
        table: Table,
        entity_id: i64,
    ) -> Result<Vec<HistoryEntry>, ContentGraphError> {
        let key = match table {
            Table::NodeHistory => "node_id",
            Table::EdgeHistory => "edge_id",
            other => {
                return Err(ContentGraphError::invalid_input(format!(
                    "{other} is not a history table"
                )));
            }
        };
        let sql = format!(
            "SELECT id, {key}, source, source_details, change_type, time, attribution, changed_field \
             FROM {} WHERE {key}=?1 ORDER BY id",
            table.name()
        );
        let conn = self.connection();
        let mut stmt = conn
            .prepare_cached(&sql)
            .map_err(|e| ContentGraphError::query(e.to_string()))?;
        let rows = stmt
            .query_rows(params![entity_id], table.columns())
            .map_err(|e| ContentGraphError::query(e.to_string()))?;
        rows.into_iter()
            .map(|row| -> Result<HistoryEntry, ContentGraphError> {
                let change_type: String = row.get("change_type")?;
                Ok(HistoryEntry {
                    id: row.get("id")?,
                    entity_id: row.get(key)?,
                    source: row.get("source")?,
                    source_details: row.get("source_details")?,
                    change_type: change_type.parse::<ChangeType>()?,
                    time: row.get("time")?,
                    attribution: row.get("attribution")?,
                    changed_field: row.get("changed_field")?,
                })
            })
            .collect()
    }
}

fn parse_json(raw: &str) -> Result<JsonValue, ContentGraphError> {
    serde_json::from_str(raw).map_err(|e| ContentGraphError::query(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_in_memory_has_empty_tables() {
        let store = GraphStore::open_in_memory().unwrap();
        assert_eq!(store.count(Table::Node).unwrap(), 0);
        assert_eq!(store.count(Table::Edge).unwrap(), 0);
        assert_eq!(store.count(Table::NodeSearch).unwrap(), 0);
    }

    #[test]
    fn test_open_file_and_close() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("graph.db");
        let store = GraphStore::open(&path).unwrap();
        assert_eq!(store.schema_version().unwrap(), crate::schema::SCHEMA_VERSION);
        store.close().unwrap();
        assert!(path.exists());

        let reopened = GraphStore::open(&path).unwrap();
        assert_eq!(reopened.count(Table::Node).unwrap(), 0);
    }

    #[test]
    fn test_history_rejects_non_history_table() {
        let store = GraphStore::open_in_memory().unwrap();
        assert!(store.history(Table::Node, 1).is_err());
    }
}
