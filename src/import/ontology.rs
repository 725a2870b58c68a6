//! ChEBI ontology (OBO) importer.
//!
//! Only `[Term]` stanzas are read. Each `is_a` and `relationship` line becomes
//! an edge between two chemicals that are already stored, found through their
//! `chebi` synonyms.

use std::path::PathBuf;

use ahash::AHashSet;

use crate::{
    engine::lookup_synonyms,
    errors::ContentGraphError,
    hash::ContentKey,
    model::HashEdgeCandidate,
    store::GraphStore,
};

use super::{
    ImportBatch, ImportOptions, SOURCE_CHEBI, SourceImporter, chebi_accession, read_source,
    stored_keys,
};

const IS_A: &str = "is_a";

#[derive(Clone, Debug)]
pub struct OntologyImporter {
    pub obo_path: PathBuf,
    /// Recorded in history as the source tag.
    pub source: &'static str,
}

impl OntologyImporter {
    pub fn new(obo_path: impl Into<PathBuf>) -> Self {
        Self {
            obo_path: obo_path.into(),
            source: "chebi_ontology",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct OntologyEdge {
    source: String,
    destination: String,
    relationship: String,
}

#[derive(Default)]
struct Stanza<'a> {
    id: Option<&'a str>,
    obsolete: bool,
    /// `(relationship, target)` pairs in file order.
    links: Vec<(&'a str, &'a str)>,
}

/// Drop a trailing `! comment` and surrounding whitespace.
fn strip_comment(value: &str) -> &str {
    value.split_once(" !").map_or(value, |(v, _)| v).trim()
}

fn flush_stanza(stanza: Stanza<'_>, edges: &mut Vec<OntologyEdge>, batch: &mut ImportBatch) {
    let Some(raw_id) = stanza.id else {
        if !stanza.links.is_empty() {
            batch.skip("term without id", "[Term]");
        }
        return;
    };
    if stanza.obsolete {
        return;
    }
    let Some(source) = chebi_accession(raw_id) else {
        batch.skip("term id is not a ChEBI accession", raw_id);
        return;
    };
    for (relationship, target) in stanza.links {
        match chebi_accession(target) {
            Some(destination) if !relationship.is_empty() => edges.push(OntologyEdge {
                source: source.to_string(),
                destination: destination.to_string(),
                relationship: relationship.to_string(),
            }),
            _ => batch.skip("link target is not a ChEBI accession", target),
        }
    }
}

fn parse_obo(raw: &str, batch: &mut ImportBatch) -> Vec<OntologyEdge> {
    let mut edges = Vec::new();
    let mut current: Option<Stanza<'_>> = None;
    for line in raw.lines().map(str::trim) {
        if line.starts_with('[') {
            if let Some(stanza) = current.take() {
                flush_stanza(stanza, &mut edges, batch);
            }
            if line == "[Term]" {
                current = Some(Stanza::default());
            }
            continue;
        }
        let Some(stanza) = current.as_mut() else {
            continue;
        };
        let Some((tag, value)) = line.split_once(':') else {
            continue;
        };
        let value = strip_comment(value);
        match tag.trim() {
            "id" => stanza.id = Some(value),
            "is_obsolete" => stanza.obsolete = value == "true",
            "is_a" => stanza.links.push((IS_A, value)),
            "relationship" => match value.split_once(char::is_whitespace) {
                Some((relationship, target)) => stanza.links.push((relationship, target.trim())),
                None => batch.skip("malformed relationship line", line),
            },
            _ => {}
        }
    }
    if let Some(stanza) = current {
        flush_stanza(stanza, &mut edges, batch);
    }
    edges
}

impl SourceImporter for OntologyImporter {
    fn source(&self) -> &'static str {
        self.source
    }

    fn build_batch(
        &self,
        store: &GraphStore,
        options: &ImportOptions,
    ) -> Result<ImportBatch, ContentGraphError> {
        let raw = read_source(&self.obo_path)?;
        let mut batch = ImportBatch::default();
        let edges = parse_obo(&raw, &mut batch);

        let accessions: Vec<String> = edges
            .iter()
            .flat_map(|e| [e.source.clone(), e.destination.clone()])
            .collect::<AHashSet<_>>()
            .into_iter()
            .collect();
        let chemicals = lookup_synonyms(store, SOURCE_CHEBI, &accessions, &options.chunk)?;

        let scheme = options.scheme;
        let keys = stored_keys(store, chemicals.values(), scheme, &options.chunk)?;
        let key_of = |hash: &str| {
            keys.get(hash)
                .cloned()
                .unwrap_or_else(|| ContentKey::digest(hash))
        };
        for edge in edges {
            if options.limit_reached(batch.records) {
                break;
            }
            let (Some(source), Some(destination)) =
                (chemicals.get(&edge.source), chemicals.get(&edge.destination))
            else {
                batch.skip("chemical not found", &format!("{} {}", edge.source, edge.destination));
                continue;
            };
            batch.edges.push(HashEdgeCandidate::between(
                scheme,
                &key_of(&source.hash),
                &key_of(&destination.hash),
                &edge.relationship,
            ));
            batch.records += 1;
        }
        Ok(batch)
    }

    fn node_update_columns(&self) -> &'static [&'static str] {
        &[]
    }
}
