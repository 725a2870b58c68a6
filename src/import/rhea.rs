//! Rhea reactions, one JSON object per line.
//!
//! ```json
//! {"uid": "10000", "display_name": "A = B",
//!  "participants": [{"chebi_xref": "CHEBI:1", "coefficient": 1.0, "side": "left"}]}
//! ```
//!
//! Left-side coefficients are negated before hashing, so a reaction and its
//! reverse written with sides swapped land on the same reaction node.

use std::path::PathBuf;

use ahash::{AHashMap, AHashSet};
use serde::Deserialize;
use serde_json::json;

use crate::{
    engine::lookup_synonyms,
    errors::ContentGraphError,
    hash::{ContentKey, KeyedParticipant},
    model::{HAS_REACTION_PARTICIPANT, HashEdgeCandidate, NodeCandidate, NodeType},
    store::GraphStore,
};

use super::{
    ImportBatch, ImportOptions, SOURCE_CHEBI, SOURCE_RHEA, SourceImporter, chebi_accession,
    read_source, stored_keys,
};

#[derive(Clone, Debug)]
pub struct RheaImporter {
    pub reactions_path: PathBuf,
}

impl RheaImporter {
    pub fn new(reactions_path: impl Into<PathBuf>) -> Self {
        Self {
            reactions_path: reactions_path.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, Deserialize)]
struct ParticipantRecord {
    chebi_xref: String,
    coefficient: f64,
    side: Side,
    #[serde(default)]
    compartment_rule: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ReactionRecord {
    uid: String,
    #[serde(default)]
    display_name: Option<String>,
    participants: Vec<ParticipantRecord>,
}

impl ParticipantRecord {
    fn signed_coefficient(&self) -> f64 {
        match self.side {
            Side::Left => -self.coefficient,
            Side::Right => self.coefficient,
        }
    }
}

fn parse_reactions(raw: &str, batch: &mut ImportBatch) -> Vec<ReactionRecord> {
    let mut reactions = Vec::new();
    for (index, line) in raw.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ReactionRecord>(line) {
            Ok(reaction) if reaction.participants.is_empty() => {
                batch.skip("reaction without participants", &reaction.uid)
            }
            Ok(reaction) => reactions.push(reaction),
            Err(err) => batch.skip(&err.to_string(), &format!("line {}", index + 1)),
        }
    }
    reactions
}

impl SourceImporter for RheaImporter {
    fn source(&self) -> &'static str {
        SOURCE_RHEA
    }

    fn build_batch(
        &self,
        store: &GraphStore,
        options: &ImportOptions,
    ) -> Result<ImportBatch, ContentGraphError> {
        let raw = read_source(&self.reactions_path)?;
        let mut batch = ImportBatch::default();
        let reactions = parse_reactions(&raw, &mut batch);

        let accessions: Vec<String> = reactions
            .iter()
            .flat_map(|r| r.participants.iter())
            .filter_map(|p| chebi_accession(&p.chebi_xref))
            .map(str::to_string)
            .collect::<AHashSet<_>>()
            .into_iter()
            .collect();
        let chemicals = lookup_synonyms(store, SOURCE_CHEBI, &accessions, &options.chunk)?;

        let scheme = options.scheme;
        let keys = stored_keys(store, chemicals.values(), scheme, &options.chunk)?;
        let mut reaction_hashes: AHashSet<String> = AHashSet::new();
        for reaction in reactions {
            if options.limit_reached(batch.records) {
                break;
            }
            let resolved: Option<Vec<KeyedParticipant>> = reaction
                .participants
                .iter()
                .map(|p| {
                    let chemical = chebi_accession(&p.chebi_xref).and_then(|id| chemicals.get(id))?;
                    let entity = keys
                        .get(&chemical.hash)
                        .cloned()
                        .unwrap_or_else(|| ContentKey::digest(chemical.hash.clone()));
                    Some(KeyedParticipant {
                        entity,
                        coefficient: p.signed_coefficient(),
                        compartment_rule: p.compartment_rule.clone(),
                    })
                })
                .collect();
            let Some(participants) = resolved else {
                batch.skip("participant not found", &reaction.uid);
                continue;
            };

            let key = ContentKey::Reaction(participants.clone());
            let node = NodeCandidate::keyed(
                scheme,
                NodeType::Reaction,
                json!({"rhea_id": reaction.uid, "name": reaction.display_name}),
                &key,
            );
            if reaction_hashes.insert(node.hash.clone()) {
                let mut participant_edges: AHashMap<String, HashEdgeCandidate> = AHashMap::new();
                for participant in &participants {
                    let edge = HashEdgeCandidate::between(
                        scheme,
                        &key,
                        &participant.entity,
                        HAS_REACTION_PARTICIPANT,
                    )
                    .with_data(json!({
                        "coefficient": participant.coefficient,
                        "compartment_rule": participant.compartment_rule,
                    }));
                    participant_edges.entry(edge.hash.clone()).or_insert(edge);
                }
                let mut participant_edges: Vec<HashEdgeCandidate> =
                    participant_edges.into_values().collect();
                participant_edges.sort_by(|a, b| a.hash.cmp(&b.hash));
                batch.nodes.push(node);
                batch.edges.extend(participant_edges);
            } else {
                tracing::debug!(uid = %reaction.uid, "reaction already present under another id");
            }

            let (synonym, has_synonym) =
                NodeCandidate::synonym(scheme, &key, SOURCE_RHEA, &reaction.uid);
            batch.edges.push(has_synonym);
            batch.nodes.push(synonym);
            batch.records += 1;
        }
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reactions_skips_bad_lines() {
        let raw = r#"{"uid": "1", "participants": [{"chebi_xref": "CHEBI:1", "coefficient": 1.0, "side": "left"}]}
not json
{"uid": "2", "participants": []}
"#;
        let mut batch = ImportBatch::default();
        let reactions = parse_reactions(raw, &mut batch);
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions[0].participants[0].signed_coefficient(), -1.0);
        assert_eq!(batch.skipped, 2);
    }
}
