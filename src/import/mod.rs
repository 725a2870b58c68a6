//! Source importers and the shared node-then-edge load sequence.
//!
//! An importer turns one raw dataset into an [`ImportBatch`] of node
//! candidates and hash-addressed edge candidates. [`load_batch`] then loads
//! the nodes, resolves edge endpoints through the resulting identity lookup,
//! loads the edges and records creation history for everything touched.

mod chebi;
mod ontology;
mod rhea;
mod taxonomy;

pub use chebi::ChebiImporter;
pub use ontology::OntologyImporter;
pub use rhea::RheaImporter;
pub use taxonomy::TaxonomyImporter;

use std::{fs, path::Path};

use ahash::{AHashMap, AHashSet};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::{
    bulk::{ChunkConfig, ColumnMatch, chunked_select},
    engine::{IdentityLookup, LoadOptions, load_with_hash, lookup_hashes, resolve_edges},
    errors::ContentGraphError,
    hash::{ContentKey, HashScheme},
    model::{HashEdgeCandidate, IdHash, NodeCandidate, NodeType},
    provenance::{Provenance, record_creations},
    store::{GraphStore, Row, Table},
};

pub const SOURCE_NCBI_TAXONOMY: &str = "ncbi_taxonomy";
pub const SOURCE_CHEBI: &str = "chebi";
pub const SOURCE_RHEA: &str = "rhea";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportOptions {
    /// Write to the store; otherwise only parse and report.
    pub write: bool,
    /// Stop after this many source records.
    pub limit: Option<usize>,
    pub upsert: bool,
    pub chunk: ChunkConfig,
    pub scheme: HashScheme,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            write: false,
            limit: None,
            upsert: false,
            chunk: ChunkConfig::default(),
            scheme: HashScheme::CURRENT,
        }
    }
}

impl ImportOptions {
    pub fn writing() -> Self {
        Self {
            write: true,
            ..Self::default()
        }
    }

    fn limit_reached(&self, records: usize) -> bool {
        self.limit.is_some_and(|limit| records >= limit)
    }

    fn load_options(&self, update_columns: &[&str]) -> LoadOptions {
        if self.upsert {
            LoadOptions::upsert(update_columns, self.chunk.clone())
        } else {
            LoadOptions::insert_only(self.chunk.clone())
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImportBatch {
    /// Source records accepted into the batch.
    pub records: usize,
    /// Source records dropped as malformed or unresolvable.
    pub skipped: usize,
    pub nodes: Vec<NodeCandidate>,
    pub edges: Vec<HashEdgeCandidate>,
}

impl ImportBatch {
    fn skip(&mut self, reason: &str, record: &str) {
        tracing::warn!(record, reason, "skipping source record");
        self.skipped += 1;
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub total: usize,
    pub existing: usize,
    pub inserted: usize,
    pub migrated: usize,
}

impl From<&IdentityLookup> for LoadSummary {
    fn from(lookup: &IdentityLookup) -> Self {
        Self {
            total: lookup.len(),
            existing: lookup.existing,
            inserted: lookup.inserted,
            migrated: lookup.migrated,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub source: String,
    pub records: usize,
    pub skipped: usize,
    pub node_candidates: usize,
    pub edge_candidates: usize,
    pub written: bool,
    pub nodes: Option<LoadSummary>,
    pub edges: Option<LoadSummary>,
    pub unresolved_edges: usize,
    pub node_history_rows: usize,
    pub edge_history_rows: usize,
}

/// Outcome of [`load_batch`].
#[derive(Clone, Debug, Default)]
pub struct BatchOutcome {
    pub nodes: Option<IdentityLookup>,
    pub edges: Option<IdentityLookup>,
    pub unresolved_edges: usize,
    pub node_history_rows: usize,
    pub edge_history_rows: usize,
}

pub trait SourceImporter {
    /// Source tag recorded in history rows.
    fn source(&self) -> &'static str;

    fn build_batch(
        &self,
        store: &GraphStore,
        options: &ImportOptions,
    ) -> Result<ImportBatch, ContentGraphError>;

    fn provenance(&self) -> Provenance {
        Provenance::new(self.source())
    }

    /// Node columns replaced when migrating with `upsert`.
    fn node_update_columns(&self) -> &'static [&'static str] {
        &["data"]
    }
}

/// Load nodes, then edges, then creation history for both.
pub fn load_batch(
    store: &GraphStore,
    batch: &ImportBatch,
    options: &ImportOptions,
    provenance: &Provenance,
    node_update_columns: &[&str],
) -> Result<BatchOutcome, ContentGraphError> {
    let mut outcome = BatchOutcome::default();

    let mut endpoints = IdentityLookup::default();
    if !batch.nodes.is_empty() {
        let nodes = load_with_hash(
            store,
            &batch.nodes,
            Table::Node,
            &options.load_options(node_update_columns),
        )?;
        endpoints.merge(nodes.clone());
        outcome.nodes = Some(nodes);
    }

    if !batch.edges.is_empty() {
        let mut seen = AHashSet::new();
        let unknown: Vec<String> = batch
            .edges
            .iter()
            .flat_map(|e| [&e.source_hash, &e.destination_hash])
            .filter(|&h| !endpoints.contains(h) && seen.insert(h.as_str()))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            endpoints.merge(lookup_hashes(store, Table::Node, &unknown, &options.chunk)?);
        }

        let resolution = resolve_edges(&batch.edges, &endpoints);
        outcome.unresolved_edges = resolution.unresolved.len();
        for edge in &resolution.unresolved {
            tracing::warn!(
                relationship = %edge.relationship,
                source = %edge.source_hash,
                destination = %edge.destination_hash,
                "edge endpoint not found"
            );
        }
        if !resolution.resolved.is_empty() {
            outcome.edges = Some(load_with_hash(
                store,
                &resolution.resolved,
                Table::Edge,
                &options.load_options(&["data"]),
            )?);
        }
    }

    if let Some(nodes) = &outcome.nodes {
        let ids: Vec<i64> = nodes.ids().collect();
        outcome.node_history_rows =
            record_creations(store, Table::NodeHistory, &ids, provenance, &options.chunk)?;
    }
    if let Some(edges) = &outcome.edges {
        let ids: Vec<i64> = edges.ids().collect();
        outcome.edge_history_rows =
            record_creations(store, Table::EdgeHistory, &ids, provenance, &options.chunk)?;
    }
    Ok(outcome)
}

/// Build the importer's batch and, when `options.write` is set, load it.
pub fn run_import(
    store: &GraphStore,
    importer: &dyn SourceImporter,
    options: &ImportOptions,
) -> Result<ImportReport, ContentGraphError> {
    let batch = importer.build_batch(store, options)?;
    tracing::info!(
        source = importer.source(),
        records = batch.records,
        skipped = batch.skipped,
        nodes = batch.nodes.len(),
        edges = batch.edges.len(),
        "parsed source"
    );
    let mut report = ImportReport {
        source: importer.source().to_string(),
        records: batch.records,
        skipped: batch.skipped,
        node_candidates: batch.nodes.len(),
        edge_candidates: batch.edges.len(),
        ..ImportReport::default()
    };
    if !options.write {
        return Ok(report);
    }

    let outcome = load_batch(
        store,
        &batch,
        options,
        &importer.provenance(),
        importer.node_update_columns(),
    )?;
    report.written = true;
    report.nodes = outcome.nodes.as_ref().map(LoadSummary::from);
    report.edges = outcome.edges.as_ref().map(LoadSummary::from);
    report.unresolved_edges = outcome.unresolved_edges;
    report.node_history_rows = outcome.node_history_rows;
    report.edge_history_rows = outcome.edge_history_rows;
    Ok(report)
}

/// Digest inputs of stored nodes, keyed by their stored hash.
///
/// A chemical whose InChIKey reproduces its stored hash under `scheme` is
/// keyed by that InChIKey, so digests built on top of it can be recomputed
/// under the previous scheme. Every other node keeps its stored digest.
fn stored_keys<'a>(
    store: &GraphStore,
    nodes: impl IntoIterator<Item = &'a IdHash>,
    scheme: HashScheme,
    config: &ChunkConfig,
) -> Result<AHashMap<String, ContentKey>, ContentGraphError> {
    let mut keys = AHashMap::new();
    let mut ids = Vec::new();
    for node in nodes {
        if keys
            .insert(node.hash.clone(), ContentKey::digest(node.hash.clone()))
            .is_none()
        {
            ids.push(Row::new().with("id", node.id));
        }
    }
    if ids.is_empty() {
        return Ok(keys);
    }
    let rows = chunked_select(
        store,
        &ids,
        Table::Node,
        &ColumnMatch::same("id"),
        &["hash", "node_type_id", "data"],
        config,
    )?;
    for row in rows {
        let node_type: String = row.get("node_type_id")?;
        if node_type != NodeType::Chemical.as_str() {
            continue;
        }
        let hash: String = row.get("hash")?;
        let data: String = row.get("data")?;
        let data: JsonValue = serde_json::from_str(&data)
            .map_err(|e| ContentGraphError::parse(format!("node {hash}: {e}")))?;
        if let Some(inchi_key) = data.get("inchi_key").and_then(JsonValue::as_str)
            && scheme.chemical(inchi_key) == hash
        {
            keys.insert(hash, ContentKey::chemical(inchi_key));
        }
    }
    Ok(keys)
}

fn read_source(path: &Path) -> Result<String, ContentGraphError> {
    fs::read_to_string(path)
        .map_err(|e| ContentGraphError::parse(format!("{}: {e}", path.display())))
}

/// `CHEBI:15377` and `15377` both name ChEBI entry `15377`.
fn chebi_accession(raw: &str) -> Option<&str> {
    let id = raw.trim();
    let id = id.strip_prefix("CHEBI:").unwrap_or(id);
    (!id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())).then_some(id)
}
