//! Chunked bulk primitives: insert, select and update over large row sets.
//!
//! Each chunk of an insert or update runs in its own `BEGIN IMMEDIATE`
//! transaction. A failure in chunk `n` rolls back chunk `n` only; chunks
//! already committed stay committed, and callers recover by rerunning the
//! whole (idempotent) load.

use std::{thread, time::Duration};

use ahash::AHashSet;
use rusqlite::{params_from_iter, types::Value};

use crate::{
    errors::ContentGraphError,
    fault_injection::{self, FaultPoint},
    store::{GraphStore, InstrumentedConnection, Row, Table, TableRow, ValueKey},
};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// SQLite's default cap on bound parameters per statement.
pub const MAX_BIND_PARAMETERS: usize = 32_766;

/// How inserts treat rows that collide with a unique constraint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Skip colliding rows; `RETURNING` yields only rows actually inserted.
    Ignore,
    /// Update `update_columns` of the colliding row; `RETURNING` yields every row.
    Upsert {
        match_keys: Vec<String>,
        update_columns: Vec<String>,
    },
    /// Let the constraint violation fail the chunk.
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    /// Fixed pause between consecutive chunks.
    pub delay: Option<Duration>,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            delay: None,
        }
    }
}

impl ChunkConfig {
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            ..Self::default()
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn validate(&self) -> Result<(), ContentGraphError> {
        if self.chunk_size == 0 {
            return Err(ContentGraphError::invalid_input("chunk size must be positive"));
        }
        Ok(())
    }
}

/// Pairs a store column with the row column whose value it must equal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColumnMatch {
    pub table_column: String,
    pub row_column: String,
}

impl ColumnMatch {
    pub fn new(table_column: &str, row_column: &str) -> Self {
        Self {
            table_column: table_column.to_string(),
            row_column: row_column.to_string(),
        }
    }

    /// Match a column against the row column of the same name.
    pub fn same(column: &str) -> Self {
        Self::new(column, column)
    }
}

/// Rolls back on drop unless committed.
pub struct TransactionGuard<'a> {
    conn: InstrumentedConnection<'a>,
    committed: bool,
}

impl<'a> TransactionGuard<'a> {
    pub fn new(conn: InstrumentedConnection<'a>) -> Result<Self, ContentGraphError> {
        conn.execute("BEGIN IMMEDIATE", [])
            .map_err(|e| ContentGraphError::transaction(e.to_string()))?;
        Ok(Self {
            conn,
            committed: false,
        })
    }

    pub fn conn(&self) -> &InstrumentedConnection<'a> {
        &self.conn
    }

    pub fn commit(mut self) -> Result<(), ContentGraphError> {
        self.conn
            .execute("COMMIT", [])
            .map_err(|e| ContentGraphError::transaction(e.to_string()))?;
        self.committed = true;
        Ok(())
    }

    /// Run `f` inside the transaction and commit only if it succeeds.
    pub fn execute<F, R>(self, f: F) -> Result<R, ContentGraphError>
    where
        F: FnOnce(&InstrumentedConnection<'a>) -> Result<R, ContentGraphError>,
    {
        let result = f(&self.conn)?;
        self.commit()?;
        Ok(result)
    }
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        if !self.committed {
            let _ = self.conn.execute("ROLLBACK", []);
        }
    }
}

/// Apply `op` to consecutive chunks of `items`, strictly in order.
fn run_chunks<T, R, F>(
    items: &[T],
    config: &ChunkConfig,
    operation: &str,
    table: Table,
    mut op: F,
) -> Result<Vec<R>, ContentGraphError>
where
    F: FnMut(&[T]) -> Result<R, ContentGraphError>,
{
    config.validate()?;
    let total = items.len().div_ceil(config.chunk_size);
    let mut results = Vec::with_capacity(total);
    for (index, chunk) in items.chunks(config.chunk_size).enumerate() {
        if index > 0
            && let Some(delay) = config.delay
        {
            thread::sleep(delay);
        }
        tracing::debug!(
            operation,
            table = table.name(),
            chunk = index + 1,
            of = total,
            rows = chunk.len(),
            "processing chunk"
        );
        results.push(op(chunk)?);
    }
    Ok(results)
}

fn bind_values<R: TableRow>(row: &R, columns: &[&str]) -> Vec<Value> {
    columns
        .iter()
        .map(|c| row.column_value(c).unwrap_or(Value::Null))
        .collect()
}

fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn insert_sql(
    table: Table,
    conflict: &ConflictPolicy,
    returning: &[&str],
) -> Result<String, ContentGraphError> {
    let columns = table.insert_columns();
    let verb = match conflict {
        ConflictPolicy::Ignore => "INSERT OR IGNORE",
        ConflictPolicy::Upsert { .. } | ConflictPolicy::Error => "INSERT",
    };
    let mut sql = format!(
        "{verb} INTO {}({}) VALUES({})",
        table.name(),
        columns.join(", "),
        placeholders(1, columns.len())
    );
    if let ConflictPolicy::Upsert {
        match_keys,
        update_columns,
    } = conflict
    {
        if match_keys.is_empty() || update_columns.is_empty() {
            return Err(ContentGraphError::validation(
                "upsert requires match keys and update columns",
            ));
        }
        let keys: Vec<&str> = match_keys.iter().map(String::as_str).collect();
        let updates: Vec<&str> = update_columns.iter().map(String::as_str).collect();
        table.check_columns(&keys)?;
        let updates = table.check_columns(&updates)?;
        let assignments: Vec<String> = updates
            .iter()
            .map(|c| format!("{c}=excluded.{c}"))
            .collect();
        sql.push_str(&format!(
            " ON CONFLICT({}) DO UPDATE SET {}",
            keys.join(", "),
            assignments.join(", ")
        ));
    }
    if !returning.is_empty() {
        sql.push_str(&format!(" RETURNING {}", returning.join(", ")));
    }
    Ok(sql)
}

/// Insert `rows` into `table` chunk by chunk.
///
/// When `returning` names columns, the rows produced by each chunk's
/// `RETURNING` clause are accumulated and returned in input order.
pub fn chunked_insert<R: TableRow>(
    store: &GraphStore,
    rows: &[R],
    table: Table,
    config: &ChunkConfig,
    conflict: &ConflictPolicy,
    returning: &[&str],
) -> Result<Vec<Row>, ContentGraphError> {
    table.check_writable()?;
    let returning = table.check_columns(returning)?;
    let sql = insert_sql(table, conflict, &returning)?;
    let columns = table.insert_columns();

    let chunks = run_chunks(rows, config, "insert", table, |chunk| {
        TransactionGuard::new(store.connection())?.execute(|conn| {
            let mut stmt = conn
                .prepare_cached(&sql)
                .map_err(|e| ContentGraphError::query(e.to_string()))?;
            let mut produced = Vec::new();
            let mut written = 0usize;
            for row in chunk {
                let values = bind_values(row, columns);
                if returning.is_empty() {
                    written += stmt
                        .execute(params_from_iter(values.iter()))
                        .map_err(|e| ContentGraphError::query(e.to_string()))?;
                } else {
                    let out = stmt
                        .query_rows(params_from_iter(values.iter()), &returning)
                        .map_err(|e| ContentGraphError::query(e.to_string()))?;
                    written += out.len();
                    produced.extend(out);
                }
            }
            fault_injection::check_fault(FaultPoint::ChunkInsertBeforeCommit)?;
            conn.metrics().record_rows_written(written);
            Ok(produced)
        })
    })?;
    Ok(chunks.into_iter().flatten().collect())
}

/// Fetch `returning` columns of every stored row whose `on.table_column`
/// equals some row's `on.row_column`.
///
/// Keys are de-duplicated before chunking, so the result is the same set a
/// single unchunked `IN (...)` query would produce. A chunk never binds more
/// than [`MAX_BIND_PARAMETERS`] keys, whatever `config.chunk_size` says.
pub fn chunked_select<R: TableRow>(
    store: &GraphStore,
    rows: &[R],
    table: Table,
    on: &ColumnMatch,
    returning: &[&str],
    config: &ChunkConfig,
) -> Result<Vec<Row>, ContentGraphError> {
    let key_column = table.check_column(&on.table_column)?;
    if returning.is_empty() {
        return Err(ContentGraphError::invalid_input(
            "select requires at least one returning column",
        ));
    }
    let returning = table.check_columns(returning)?;

    let mut seen = AHashSet::new();
    let keys: Vec<Value> = rows
        .iter()
        .filter_map(|row| row.column_value(&on.row_column))
        .filter(|value| ValueKey::from_value(value).is_some_and(|key| seen.insert(key)))
        .collect();

    let config = ChunkConfig {
        chunk_size: config.chunk_size.min(MAX_BIND_PARAMETERS),
        ..config.clone()
    };
    let chunks = run_chunks(&keys, &config, "select", table, |chunk| {
        let sql = format!(
            "SELECT {} FROM {} WHERE {key_column} IN ({})",
            returning.join(", "),
            table.name(),
            placeholders(1, chunk.len())
        );
        let conn = store.connection();
        let mut stmt = conn
            .prepare_cached(&sql)
            .map_err(|e| ContentGraphError::query(e.to_string()))?;
        stmt.query_rows(params_from_iter(chunk.iter()), &returning)
            .map_err(|e| ContentGraphError::query(e.to_string()))
    })?;
    Ok(chunks.into_iter().flatten().collect())
}

/// Set `update_columns` on every stored row matched by `on`, one prepared
/// `UPDATE` per input row. Rows without a match value are skipped.
///
/// Returns the number of store rows changed.
pub fn chunked_update<R: TableRow>(
    store: &GraphStore,
    rows: &[R],
    table: Table,
    on: &ColumnMatch,
    update_columns: &[&str],
    config: &ChunkConfig,
) -> Result<usize, ContentGraphError> {
    table.check_writable()?;
    if update_columns.is_empty() {
        return Err(ContentGraphError::validation("update requires update columns"));
    }
    let key_column = table.check_column(&on.table_column)?;
    let update_columns = table.check_columns(update_columns)?;
    let assignments: Vec<String> = update_columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{c}=?{}", i + 1))
        .collect();
    let sql = format!(
        "UPDATE {} SET {} WHERE {key_column}=?{}",
        table.name(),
        assignments.join(", "),
        update_columns.len() + 1
    );

    let matched: Vec<(Vec<Value>, Value)> = rows
        .iter()
        .filter_map(|row| {
            let key = row.column_value(&on.row_column)?;
            (key != Value::Null).then(|| (bind_values(row, &update_columns), key))
        })
        .collect();

    let counts = run_chunks(&matched, config, "update", table, |chunk| {
        TransactionGuard::new(store.connection())?.execute(|conn| {
            let mut stmt = conn
                .prepare_cached(&sql)
                .map_err(|e| ContentGraphError::query(e.to_string()))?;
            let mut changed = 0usize;
            for (values, key) in chunk {
                let params = values.iter().chain(std::iter::once(key));
                changed += stmt
                    .execute(params_from_iter(params))
                    .map_err(|e| ContentGraphError::query(e.to_string()))?;
            }
            fault_injection::check_fault(FaultPoint::ChunkUpdateBeforeCommit)?;
            conn.metrics().record_rows_written(changed);
            Ok(changed)
        })
    })?;
    Ok(counts.into_iter().sum())
}
