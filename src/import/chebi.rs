//! ChEBI structure file (SDF) importer.

use std::path::PathBuf;

use ahash::{AHashMap, AHashSet};
use serde_json::json;

use crate::{
    errors::ContentGraphError,
    hash::ContentKey,
    model::{NodeCandidate, NodeType},
    store::GraphStore,
};

use super::{ImportBatch, ImportOptions, SOURCE_CHEBI, SourceImporter, chebi_accession, read_source};

const RECORD_END: &str = "$$$$";

#[derive(Clone, Debug)]
pub struct ChebiImporter {
    pub sdf_path: PathBuf,
}

impl ChebiImporter {
    pub fn new(sdf_path: impl Into<PathBuf>) -> Self {
        Self {
            sdf_path: sdf_path.into(),
        }
    }
}

/// Data items of one SDF record; the molfile block before them is ignored.
fn sdf_properties(record: &str) -> AHashMap<&str, String> {
    let mut properties = AHashMap::new();
    let mut lines = record.lines();
    while let Some(line) = lines.next() {
        let Some(header) = line.trim_start().strip_prefix('>') else {
            continue;
        };
        let Some(name) = header
            .split_once('<')
            .and_then(|(_, rest)| rest.split_once('>'))
            .map(|(name, _)| name.trim())
        else {
            continue;
        };
        let value: Vec<&str> = lines
            .by_ref()
            .take_while(|l| !l.trim().is_empty())
            .map(str::trim)
            .collect();
        properties.insert(name, value.join(" "));
    }
    properties
}

impl SourceImporter for ChebiImporter {
    fn source(&self) -> &'static str {
        SOURCE_CHEBI
    }

    fn build_batch(
        &self,
        _store: &GraphStore,
        options: &ImportOptions,
    ) -> Result<ImportBatch, ContentGraphError> {
        let raw = read_source(&self.sdf_path)?;
        let mut batch = ImportBatch::default();
        let mut seen_ids = AHashSet::new();
        let mut seen_keys = AHashSet::new();
        let scheme = options.scheme;

        for (index, record) in raw.split(RECORD_END).enumerate() {
            if options.limit_reached(batch.records) {
                break;
            }
            if record.trim().is_empty() {
                continue;
            }
            let properties = sdf_properties(record);
            let label = format!("record {}", index + 1);
            let Some(chebi_id) = properties.get("ChEBI ID").and_then(|v| chebi_accession(v))
            else {
                batch.skip("missing ChEBI ID", &label);
                continue;
            };
            let Some(inchi_key) = properties
                .get("InChIKey")
                .map(|k| k.trim())
                .filter(|k| !k.is_empty())
            else {
                batch.skip("missing InChIKey", chebi_id);
                continue;
            };
            if !seen_ids.insert(chebi_id.to_string()) || !seen_keys.insert(inchi_key.to_string()) {
                tracing::debug!(chebi_id, inchi_key, "dropping duplicate ChEBI entry");
                continue;
            }

            let key = ContentKey::chemical(inchi_key);
            let chemical = NodeCandidate::keyed(
                scheme,
                NodeType::Chemical,
                json!({
                    "name": properties.get("ChEBI Name"),
                    "inchi": properties.get("InChI"),
                    "inchi_key": inchi_key,
                }),
                &key,
            );
            let (synonym, has_synonym) =
                NodeCandidate::synonym(scheme, &key, SOURCE_CHEBI, chebi_id);
            batch.edges.push(has_synonym);
            batch.nodes.push(chemical);
            batch.nodes.push(synonym);
            batch.records += 1;
        }
        Ok(batch)
    }
}
