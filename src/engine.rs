//! Hash-based idempotent loading of node and edge batches.

use ahash::{AHashMap, AHashSet};
use serde::Serialize;

use crate::{
    bulk::{ChunkConfig, ColumnMatch, ConflictPolicy, chunked_insert, chunked_select, chunked_update},
    errors::ContentGraphError,
    model::{EdgeCandidate, HashEdgeCandidate, HashedRecord, IdHash},
    store::{GraphStore, Row, Table},
};

const ID_HASH: &[&str] = &["id", "hash"];

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Migrate rows whose stored hash equals a record's `previous_hash`.
    pub upsert: bool,
    /// Columns replaced during migration; `hash` is always added.
    pub update_columns: Vec<String>,
    pub chunk: ChunkConfig,
}

impl LoadOptions {
    pub fn insert_only(chunk: ChunkConfig) -> Self {
        Self {
            upsert: false,
            update_columns: Vec::new(),
            chunk,
        }
    }

    pub fn upsert(update_columns: &[&str], chunk: ChunkConfig) -> Self {
        Self {
            upsert: true,
            update_columns: update_columns.iter().map(|c| c.to_string()).collect(),
            chunk,
        }
    }
}

/// Hash to id table produced by a load.
#[derive(Clone, Debug, Default, Serialize)]
pub struct IdentityLookup {
    #[serde(skip)]
    ids: AHashMap<String, i64>,
    pub existing: usize,
    pub inserted: usize,
    pub migrated: usize,
}

impl IdentityLookup {
    pub fn get(&self, hash: &str) -> Option<i64> {
        self.ids.get(hash).copied()
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.ids.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.ids.values().copied()
    }

    /// Every `(id, hash)` pair ordered by id.
    pub fn rows(&self) -> Vec<IdHash> {
        let mut rows: Vec<IdHash> = self
            .ids
            .iter()
            .map(|(hash, id)| IdHash {
                id: *id,
                hash: hash.clone(),
            })
            .collect();
        rows.sort_by_key(|r| r.id);
        rows
    }

    /// Fold `other` into `self`; entries already present are kept.
    pub fn merge(&mut self, other: IdentityLookup) {
        for (hash, id) in other.ids {
            self.ids.entry(hash).or_insert(id);
        }
        self.existing += other.existing;
        self.inserted += other.inserted;
        self.migrated += other.migrated;
    }

    fn absorb(&mut self, rows: Vec<Row>) -> Result<usize, ContentGraphError> {
        let mut added = 0;
        for row in rows {
            let id: i64 = row.get("id")?;
            let hash: String = row.get("hash")?;
            if self.ids.insert(hash, id).is_none() {
                added += 1;
            }
        }
        Ok(added)
    }
}

fn validate_batch<R: HashedRecord>(
    batch: &[R],
    table: Table,
    options: &LoadOptions,
) -> Result<Vec<String>, ContentGraphError> {
    if !table.is_content_addressed() {
        return Err(ContentGraphError::invalid_input(format!(
            "table {table} is not content addressed"
        )));
    }
    if batch.is_empty() {
        return Err(ContentGraphError::validation("batch is empty"));
    }
    if let Some(position) = batch.iter().position(|r| r.hash().is_empty()) {
        return Err(ContentGraphError::validation(format!(
            "record {position} has an empty hash"
        )));
    }
    if !options.upsert {
        return Ok(Vec::new());
    }
    if options.update_columns.is_empty() {
        return Err(ContentGraphError::validation(
            "upsert requires explicit update columns",
        ));
    }
    if !batch.iter().any(|r| r.previous_hash().is_some()) {
        return Err(ContentGraphError::validation(
            "upsert requires records carrying previous_hash",
        ));
    }
    let mut columns: Vec<String> = Vec::with_capacity(options.update_columns.len() + 1);
    let requested = options.update_columns.iter().map(String::as_str).chain(["hash"]);
    for column in requested {
        let known = table.check_column(column)?;
        if known == "id" {
            return Err(ContentGraphError::validation("id cannot be updated"));
        }
        if !columns.iter().any(|c| c == known) {
            columns.push(known.to_string());
        }
    }
    Ok(columns)
}

/// Load `batch` into `table`, skipping records whose hash is already stored.
///
/// With `options.upsert`, stored rows whose hash equals a record's
/// `previous_hash` are first migrated in place (same id, new columns and
/// hash). Calling this twice with the same batch inserts nothing the second
/// time. All validation happens before the first write.
pub fn load_with_hash<R: HashedRecord>(
    store: &GraphStore,
    batch: &[R],
    table: Table,
    options: &LoadOptions,
) -> Result<IdentityLookup, ContentGraphError> {
    let update_columns = validate_batch(batch, table, options)?;
    let mut lookup = IdentityLookup::default();

    if options.upsert {
        let columns: Vec<&str> = update_columns.iter().map(String::as_str).collect();
        lookup.migrated = chunked_update(
            store,
            batch,
            table,
            &ColumnMatch::new("hash", "previous_hash"),
            &columns,
            &options.chunk,
        )?;
        tracing::info!(table = table.name(), rows = lookup.migrated, "migrated rows by previous hash");
    }

    let found = chunked_select(
        store,
        batch,
        table,
        &ColumnMatch::same("hash"),
        ID_HASH,
        &options.chunk,
    )?;
    lookup.existing = lookup.absorb(found)?;

    let mut seen = AHashSet::new();
    let missing: Vec<&R> = batch
        .iter()
        .filter(|r| !lookup.contains(r.hash()) && seen.insert(r.hash()))
        .collect();

    if !missing.is_empty() {
        let inserted = chunked_insert(
            store,
            &missing,
            table,
            &options.chunk,
            &ConflictPolicy::Ignore,
            ID_HASH,
        )?;
        lookup.inserted = lookup.absorb(inserted)?;
    }

    tracing::info!(
        table = table.name(),
        batch = batch.len(),
        existing = lookup.existing,
        inserted = lookup.inserted,
        "loaded batch by hash"
    );
    Ok(lookup)
}

/// Resolve already-stored hashes to ids without writing anything.
pub fn lookup_hashes(
    store: &GraphStore,
    table: Table,
    hashes: &[String],
    config: &ChunkConfig,
) -> Result<IdentityLookup, ContentGraphError> {
    if !table.is_content_addressed() {
        return Err(ContentGraphError::invalid_input(format!(
            "table {table} is not content addressed"
        )));
    }
    let keys: Vec<Row> = hashes
        .iter()
        .map(|h| Row::new().with("hash", h.clone()))
        .collect();
    let found = chunked_select(store, &keys, table, &ColumnMatch::same("hash"), ID_HASH, config)?;
    let mut lookup = IdentityLookup::default();
    lookup.existing = lookup.absorb(found)?;
    Ok(lookup)
}

/// Map synonym `values` from `source` to the node that owns them.
///
/// When several nodes own the same value, the oldest one wins.
pub fn lookup_synonyms(
    store: &GraphStore,
    source: &str,
    values: &[String],
    config: &ChunkConfig,
) -> Result<AHashMap<String, IdHash>, ContentGraphError> {
    let keys: Vec<Row> = values
        .iter()
        .map(|v| Row::new().with("value", v.clone()))
        .collect();
    let found = chunked_select(
        store,
        &keys,
        Table::NodeSearch,
        &ColumnMatch::same("value"),
        &["id", "hash", "source", "value"],
        config,
    )?;
    let mut owners: AHashMap<String, IdHash> = AHashMap::new();
    for row in found {
        let row_source: Option<String> = row.get("source")?;
        if row_source.as_deref() != Some(source) {
            continue;
        }
        let value: String = row.get("value")?;
        let owner = IdHash {
            id: row.get("id")?,
            hash: row.get("hash")?,
        };
        match owners.get(&value) {
            Some(current) if current.id <= owner.id => {}
            _ => {
                owners.insert(value, owner);
            }
        }
    }
    Ok(owners)
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EdgeResolution {
    pub resolved: Vec<EdgeCandidate>,
    pub unresolved: Vec<HashEdgeCandidate>,
}

/// Turn hash-addressed edges into id-addressed ones through `nodes`.
pub fn resolve_edges(edges: &[HashEdgeCandidate], nodes: &IdentityLookup) -> EdgeResolution {
    let mut resolution = EdgeResolution::default();
    for edge in edges {
        match (nodes.get(&edge.source_hash), nodes.get(&edge.destination_hash)) {
            (Some(source_id), Some(destination_id)) => resolution
                .resolved
                .push(edge.resolve(source_id, destination_id)),
            _ => resolution.unresolved.push(edge.clone()),
        }
    }
    resolution
}
