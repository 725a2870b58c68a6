//! Append-only `create` history for loaded nodes and edges.

use ahash::AHashSet;
use chrono::{DateTime, Utc};

use crate::{
    bulk::{ChunkConfig, ColumnMatch, ConflictPolicy, chunked_insert, chunked_select},
    errors::ContentGraphError,
    model::{ChangeType, HistoryRecord},
    store::{GraphStore, Row, Table},
};

/// Who produced a batch, and when.
#[derive(Clone, Debug, PartialEq)]
pub struct Provenance {
    pub source: String,
    pub source_details: Option<String>,
    pub attribution: Option<String>,
    pub time: DateTime<Utc>,
}

impl Provenance {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            source_details: None,
            attribution: None,
            time: Utc::now(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.source_details = Some(details.into());
        self
    }

    pub fn with_attribution(mut self, attribution: impl Into<String>) -> Self {
        self.attribution = Some(attribution.into());
        self
    }

    pub fn at(mut self, time: DateTime<Utc>) -> Self {
        self.time = time;
        self
    }

    fn creation(&self, entity_id: i64) -> HistoryRecord {
        HistoryRecord {
            entity_id,
            source: self.source.clone(),
            source_details: self.source_details.clone(),
            change_type: ChangeType::Create,
            time: self.time,
            attribution: self.attribution.clone(),
            changed_field: None,
        }
    }
}

fn entity_column(table: Table) -> Result<&'static str, ContentGraphError> {
    match table {
        Table::NodeHistory => Ok("node_id"),
        Table::EdgeHistory => Ok("edge_id"),
        other => Err(ContentGraphError::invalid_input(format!(
            "{other} is not a history table"
        ))),
    }
}

/// Write one `create` row for every id in `ids` that has none yet.
///
/// Returns the number of history rows written; ids that already carry a
/// `create` row are left alone, so repeated calls never duplicate history.
pub fn record_creations(
    store: &GraphStore,
    table: Table,
    ids: &[i64],
    provenance: &Provenance,
    config: &ChunkConfig,
) -> Result<usize, ContentGraphError> {
    let key = entity_column(table)?;
    if ids.is_empty() {
        return Ok(0);
    }

    let probes: Vec<Row> = ids.iter().map(|id| Row::new().with(key, *id)).collect();
    let recorded = chunked_select(store, &probes, table, &ColumnMatch::same(key), &[key], config)?;
    let mut known = AHashSet::with_capacity(recorded.len());
    for row in recorded {
        known.insert(row.get::<i64>(key)?);
    }

    let mut missing: Vec<i64> = ids.iter().copied().filter(|id| known.insert(*id)).collect();
    missing.sort_unstable();
    let records: Vec<HistoryRecord> = missing.iter().map(|id| provenance.creation(*id)).collect();
    if records.is_empty() {
        return Ok(0);
    }
    chunked_insert(store, &records, table, config, &ConflictPolicy::Error, &[])?;
    tracing::info!(
        table = table.name(),
        rows = records.len(),
        source = %provenance.source,
        "recorded creation history"
    );
    Ok(records.len())
}
