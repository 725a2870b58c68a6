use std::sync::atomic::{AtomicU64, Ordering};

use rusqlite::{CachedStatement, Connection, types::Value};

use super::table::Row;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreMetricsSnapshot {
    pub execute_count: u64,
    pub tx_begin_count: u64,
    pub tx_commit_count: u64,
    pub tx_rollback_count: u64,
    pub rows_written: u64,
    pub rows_read: u64,
}

#[derive(Default)]
pub struct StoreMetrics {
    executes: AtomicU64,
    tx_begin: AtomicU64,
    tx_commit: AtomicU64,
    tx_rollback: AtomicU64,
    rows_written: AtomicU64,
    rows_read: AtomicU64,
}

impl StoreMetrics {
    pub fn snapshot(&self) -> StoreMetricsSnapshot {
        StoreMetricsSnapshot {
            execute_count: self.executes.load(Ordering::Relaxed),
            tx_begin_count: self.tx_begin.load(Ordering::Relaxed),
            tx_commit_count: self.tx_commit.load(Ordering::Relaxed),
            tx_rollback_count: self.tx_rollback.load(Ordering::Relaxed),
            rows_written: self.rows_written.load(Ordering::Relaxed),
            rows_read: self.rows_read.load(Ordering::Relaxed),
        }
    }

    pub fn reset(&self) {
        self.executes.store(0, Ordering::Relaxed);
        self.tx_begin.store(0, Ordering::Relaxed);
        self.tx_commit.store(0, Ordering::Relaxed);
        self.tx_rollback.store(0, Ordering::Relaxed);
        self.rows_written.store(0, Ordering::Relaxed);
        self.rows_read.store(0, Ordering::Relaxed);
    }

    pub fn record_execute(&self, sql: &str) {
        self.executes.fetch_add(1, Ordering::Relaxed);
        let keyword = sql.split_whitespace().next().unwrap_or_default();
        if keyword.eq_ignore_ascii_case("BEGIN") {
            self.tx_begin.fetch_add(1, Ordering::Relaxed);
        } else if keyword.eq_ignore_ascii_case("COMMIT") {
            self.tx_commit.fetch_add(1, Ordering::Relaxed);
        } else if keyword.eq_ignore_ascii_case("ROLLBACK") {
            self.tx_rollback.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_rows_written(&self, count: usize) {
        self.rows_written.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_rows_read(&self, count: usize) {
        self.rows_read.fetch_add(count as u64, Ordering::Relaxed);
    }
}

/// Connection handle that counts statements and transactions as they run.
#[derive(Copy, Clone)]
pub struct InstrumentedConnection<'a> {
    conn: &'a Connection,
    metrics: &'a StoreMetrics,
}

impl<'a> InstrumentedConnection<'a> {
    pub fn new(conn: &'a Connection, metrics: &'a StoreMetrics) -> Self {
        Self { conn, metrics }
    }

    pub fn execute<P>(&self, sql: &str, params: P) -> Result<usize, rusqlite::Error>
    where
        P: rusqlite::Params,
    {
        self.metrics.record_execute(sql);
        self.conn.execute(sql, params)
    }

    pub fn prepare_cached<'b>(
        &'b self,
        sql: &str,
    ) -> Result<InstrumentedStatement<'b>, rusqlite::Error> {
        Ok(InstrumentedStatement {
            stmt: self.conn.prepare_cached(sql)?,
            metrics: self.metrics,
            sql: sql.to_string(),
        })
    }

    pub fn query_row<P, F, R>(&self, sql: &str, params: P, f: F) -> Result<R, rusqlite::Error>
    where
        P: rusqlite::Params,
        F: FnOnce(&rusqlite::Row<'_>) -> rusqlite::Result<R>,
    {
        self.metrics.record_execute(sql);
        self.conn.query_row(sql, params, f)
    }

    pub fn metrics(&self) -> &'a StoreMetrics {
        self.metrics
    }
}

pub struct InstrumentedStatement<'conn> {
    stmt: CachedStatement<'conn>,
    metrics: &'conn StoreMetrics,
    sql: String,
}

impl<'conn> InstrumentedStatement<'conn> {
    pub fn execute<P>(&mut self, params: P) -> Result<usize, rusqlite::Error>
    where
        P: rusqlite::Params,
    {
        self.metrics.record_execute(&self.sql);
        self.stmt.execute(params)
    }

    /// Run the statement and collect every produced row under `columns`.
    ///
    /// `columns` names the result columns positionally, which is how both
    /// `SELECT` lists and `RETURNING` clauses are built in this crate.
    pub fn query_rows<P>(&mut self, params: P, columns: &[&str]) -> Result<Vec<Row>, rusqlite::Error>
    where
        P: rusqlite::Params,
    {
        self.metrics.record_execute(&self.sql);
        let mut rows = self.stmt.query(params)?;
        let mut collected = Vec::new();
        while let Some(row) = rows.next()? {
            let mut out = Row::new();
            for (index, column) in columns.iter().enumerate() {
                let value: Value = row.get(index)?;
                out.insert(column, value);
            }
            collected.push(out);
        }
        self.metrics.record_rows_read(collected.len());
        Ok(collected)
    }
}
