//! NCBI taxonomy dump (`nodes.dmp` + `names.dmp`).

use std::path::PathBuf;

use ahash::{AHashMap, AHashSet};
use serde_json::json;

use crate::{
    errors::ContentGraphError,
    hash::ContentKey,
    model::{HAS_PARENT, HashEdgeCandidate, NodeCandidate, NodeType},
    store::GraphStore,
};

use super::{ImportBatch, ImportOptions, SOURCE_NCBI_TAXONOMY, SourceImporter, read_source};

const SCIENTIFIC_NAME: &str = "scientific name";

#[derive(Clone, Debug)]
pub struct TaxonomyImporter {
    pub nodes_path: PathBuf,
    pub names_path: PathBuf,
}

#[derive(Debug, PartialEq, Eq)]
struct TaxonRecord<'a> {
    tax_id: &'a str,
    parent_tax_id: &'a str,
    rank: &'a str,
}

impl TaxonomyImporter {
    pub fn new(nodes_path: impl Into<PathBuf>, names_path: impl Into<PathBuf>) -> Self {
        Self {
            nodes_path: nodes_path.into(),
            names_path: names_path.into(),
        }
    }
}

/// Fields of one `.dmp` line, which separates columns with `\t|\t` and ends in `\t|`.
fn dmp_fields(line: &str) -> Vec<&str> {
    let line = line.trim_end_matches(['\r', '\n']);
    let line = line.strip_suffix("\t|").unwrap_or(line);
    line.split("\t|\t").map(str::trim).collect()
}

fn parse_nodes<'a>(raw: &'a str, batch: &mut ImportBatch) -> Vec<TaxonRecord<'a>> {
    let mut records = Vec::new();
    for line in raw.lines().filter(|l| !l.trim().is_empty()) {
        let fields = dmp_fields(line);
        match *fields.as_slice() {
            [tax_id, parent_tax_id, rank, ..]
                if is_tax_id(tax_id) && is_tax_id(parent_tax_id) =>
            {
                records.push(TaxonRecord {
                    tax_id,
                    parent_tax_id,
                    rank,
                })
            }
            _ => batch.skip("malformed nodes.dmp line", line),
        }
    }
    records
}

/// Scientific names by tax id; other name classes are ignored.
fn parse_names(raw: &str) -> AHashMap<&str, &str> {
    let mut names = AHashMap::new();
    for line in raw.lines() {
        if let [tax_id, name, _, class, ..] = *dmp_fields(line).as_slice()
            && class == SCIENTIFIC_NAME
            && !name.is_empty()
        {
            names.entry(tax_id).or_insert(name);
        }
    }
    names
}

fn is_tax_id(raw: &str) -> bool {
    !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit())
}

impl SourceImporter for TaxonomyImporter {
    fn source(&self) -> &'static str {
        SOURCE_NCBI_TAXONOMY
    }

    fn build_batch(
        &self,
        _store: &GraphStore,
        options: &ImportOptions,
    ) -> Result<ImportBatch, ContentGraphError> {
        let nodes_raw = read_source(&self.nodes_path)?;
        let names_raw = read_source(&self.names_path)?;
        let mut batch = ImportBatch::default();
        let records = parse_nodes(&nodes_raw, &mut batch);
        let names = parse_names(&names_raw);

        let roots: AHashSet<&str> = records
            .iter()
            .filter(|r| names.get(r.tax_id) == Some(&"root"))
            .map(|r| r.tax_id)
            .collect();

        let scheme = options.scheme;
        for record in records {
            if options.limit_reached(batch.records) {
                break;
            }
            if roots.contains(record.tax_id) {
                continue;
            }
            let Some(name) = names.get(record.tax_id) else {
                batch.skip("no scientific name", record.tax_id);
                continue;
            };

            let key = ContentKey::taxonomy(record.tax_id);
            let taxon = NodeCandidate::keyed(
                scheme,
                NodeType::Taxonomy,
                json!({"ncbi_tax_id": record.tax_id, "name": name, "rank": record.rank}),
                &key,
            );
            let (synonym, has_synonym) =
                NodeCandidate::synonym(scheme, &key, SOURCE_NCBI_TAXONOMY, record.tax_id);
            batch.edges.push(has_synonym);

            if record.parent_tax_id != record.tax_id && !roots.contains(record.parent_tax_id) {
                let parent = ContentKey::taxonomy(record.parent_tax_id);
                batch
                    .edges
                    .push(HashEdgeCandidate::between(scheme, &key, &parent, HAS_PARENT));
            }

            batch.nodes.push(taxon);
            batch.nodes.push(synonym);
            batch.records += 1;
        }
        Ok(batch)
    }

    fn node_update_columns(&self) -> &'static [&'static str] {
        &["data", "node_type_id"]
    }
}
