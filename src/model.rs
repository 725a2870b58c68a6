//! Stored rows, load candidates and provenance records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value;
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use crate::{
    errors::ContentGraphError,
    hash::{ContentKey, HashScheme},
    store::TableRow,
};

pub const HAS_SYNONYM: &str = "has_synonym";
pub const HAS_PARENT: &str = "has_parent";
pub const HAS_REACTION_PARTICIPANT: &str = "has_reaction_participant";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Chemical,
    Synonym,
    Taxonomy,
    Reaction,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Chemical => "chemical",
            NodeType::Synonym => "synonym",
            NodeType::Taxonomy => "taxonomy",
            NodeType::Reaction => "reaction",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = ContentGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chemical" => Ok(NodeType::Chemical),
            "synonym" => Ok(NodeType::Synonym),
            "taxonomy" => Ok(NodeType::Taxonomy),
            "reaction" => Ok(NodeType::Reaction),
            other => Err(ContentGraphError::invalid_input(format!(
                "unknown node type {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Create,
    Modify,
    Delete,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Create => "create",
            ChangeType::Modify => "modify",
            ChangeType::Delete => "delete",
        }
    }
}

impl FromStr for ChangeType {
    type Err = ContentGraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(ChangeType::Create),
            "modify" => Ok(ChangeType::Modify),
            "delete" => Ok(ChangeType::Delete),
            other => Err(ContentGraphError::invalid_input(format!(
                "unknown change type {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: i64,
    pub node_type_id: String,
    pub data: JsonValue,
    pub hash: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub id: i64,
    pub source_id: i64,
    pub destination_id: i64,
    pub relationship: String,
    pub hash: String,
    pub data: Option<JsonValue>,
}

/// A record that can be loaded by content hash.
pub trait HashedRecord: TableRow {
    fn hash(&self) -> &str;
    fn previous_hash(&self) -> Option<&str>;
}

/// One participant of a reaction, as fed to the reaction hash.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stoichiometry {
    pub entity_hash: String,
    pub coefficient: f64,
    pub compartment_rule: Option<String>,
}

impl Stoichiometry {
    pub fn new(entity_hash: impl Into<String>, coefficient: f64) -> Self {
        Self {
            entity_hash: entity_hash.into(),
            coefficient,
            compartment_rule: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NodeCandidate {
    pub node_type_id: String,
    pub data: JsonValue,
    pub hash: String,
    pub previous_hash: Option<String>,
}

impl NodeCandidate {
    pub fn new(node_type: NodeType, data: JsonValue, hash: String) -> Self {
        Self {
            node_type_id: node_type.as_str().to_string(),
            data,
            hash,
            previous_hash: None,
        }
    }

    pub fn with_previous_hash(mut self, previous_hash: impl Into<String>) -> Self {
        self.previous_hash = Some(previous_hash.into());
        self
    }

    /// Candidate whose hash and previous hash both come from `key`.
    pub fn keyed(
        scheme: HashScheme,
        node_type: NodeType,
        data: JsonValue,
        key: &ContentKey,
    ) -> Self {
        let (hash, previous) = scheme.key_hashes(key);
        NodeCandidate::new(node_type, data, hash).with_previous_hash(previous)
    }

    /// Synonym node binding `value` from `source` to `owner`, with its `has_synonym` edge.
    pub fn synonym(
        scheme: HashScheme,
        owner: &ContentKey,
        source: &str,
        value: &str,
    ) -> (Self, HashEdgeCandidate) {
        let key = ContentKey::synonym(owner.clone(), source, value);
        let node = NodeCandidate::keyed(
            scheme,
            NodeType::Synonym,
            json!({"source": source, "value": value}),
            &key,
        );
        let edge = HashEdgeCandidate::between(scheme, owner, &key, HAS_SYNONYM);
        (node, edge)
    }
}

impl TableRow for NodeCandidate {
    fn column_value(&self, column: &str) -> Option<Value> {
        match column {
            "node_type_id" => Some(Value::Text(self.node_type_id.clone())),
            "data" => Some(Value::Text(self.data.to_string())),
            "hash" => Some(Value::Text(self.hash.clone())),
            "previous_hash" => self.previous_hash.clone().map(Value::Text),
            _ => None,
        }
    }
}

impl HashedRecord for NodeCandidate {
    fn hash(&self) -> &str {
        &self.hash
    }

    fn previous_hash(&self) -> Option<&str> {
        self.previous_hash.as_deref()
    }
}

/// Edge whose endpoints are already resolved to store ids.
#[derive(Clone, Debug, PartialEq)]
pub struct EdgeCandidate {
    pub source_id: i64,
    pub destination_id: i64,
    pub relationship: String,
    pub data: Option<JsonValue>,
    pub hash: String,
    pub previous_hash: Option<String>,
}

impl TableRow for EdgeCandidate {
    fn column_value(&self, column: &str) -> Option<Value> {
        match column {
            "source_id" => Some(Value::Integer(self.source_id)),
            "destination_id" => Some(Value::Integer(self.destination_id)),
            "relationship" => Some(Value::Text(self.relationship.clone())),
            "data" => self.data.as_ref().map(|d| Value::Text(d.to_string())),
            "hash" => Some(Value::Text(self.hash.clone())),
            "previous_hash" => self.previous_hash.clone().map(Value::Text),
            _ => None,
        }
    }
}

impl HashedRecord for EdgeCandidate {
    fn hash(&self) -> &str {
        &self.hash
    }

    fn previous_hash(&self) -> Option<&str> {
        self.previous_hash.as_deref()
    }
}

/// Edge addressed by endpoint hashes, as produced by importers.
#[derive(Clone, Debug, PartialEq)]
pub struct HashEdgeCandidate {
    pub source_hash: String,
    pub destination_hash: String,
    pub relationship: String,
    pub data: Option<JsonValue>,
    pub hash: String,
    pub previous_hash: Option<String>,
}

impl HashEdgeCandidate {
    /// Edge between endpoints whose digest inputs are unknown.
    pub fn new(
        scheme: HashScheme,
        source_hash: &str,
        destination_hash: &str,
        relationship: &str,
    ) -> Self {
        Self::between(
            scheme,
            &ContentKey::digest(source_hash),
            &ContentKey::digest(destination_hash),
            relationship,
        )
    }

    pub fn between(
        scheme: HashScheme,
        source: &ContentKey,
        destination: &ContentKey,
        relationship: &str,
    ) -> Self {
        let hash = scheme.edge_between(source, destination, relationship);
        let previous =
            scheme.previous_or_current(|s| s.edge_between(source, destination, relationship));
        Self {
            source_hash: scheme.key_hash(source),
            destination_hash: scheme.key_hash(destination),
            relationship: relationship.to_string(),
            data: None,
            hash,
            previous_hash: Some(previous),
        }
    }

    pub fn with_data(mut self, data: JsonValue) -> Self {
        self.data = Some(data);
        self
    }

    pub fn resolve(&self, source_id: i64, destination_id: i64) -> EdgeCandidate {
        EdgeCandidate {
            source_id,
            destination_id,
            relationship: self.relationship.clone(),
            data: self.data.clone(),
            hash: self.hash.clone(),
            previous_hash: self.previous_hash.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdHash {
    pub id: i64,
    pub hash: String,
}

impl TableRow for IdHash {
    fn column_value(&self, column: &str) -> Option<Value> {
        match column {
            "id" => Some(Value::Integer(self.id)),
            "hash" => Some(Value::Text(self.hash.clone())),
            _ => None,
        }
    }
}

/// A history row about to be written.
#[derive(Clone, Debug, PartialEq)]
pub struct HistoryRecord {
    pub entity_id: i64,
    pub source: String,
    pub source_details: Option<String>,
    pub change_type: ChangeType,
    pub time: DateTime<Utc>,
    pub attribution: Option<String>,
    pub changed_field: Option<String>,
}

impl TableRow for HistoryRecord {
    fn column_value(&self, column: &str) -> Option<Value> {
        match column {
            "node_id" | "edge_id" => Some(Value::Integer(self.entity_id)),
            "source" => Some(Value::Text(self.source.clone())),
            "source_details" => self.source_details.clone().map(Value::Text),
            "change_type" => Some(Value::Text(self.change_type.as_str().to_string())),
            "time" => Some(Value::Text(
                self.time.to_rfc3339_opts(SecondsFormat::Micros, true),
            )),
            "attribution" => self.attribution.clone().map(Value::Text),
            "changed_field" => self.changed_field.clone().map(Value::Text),
            _ => None,
        }
    }
}

/// A history row read back from the store.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub entity_id: i64,
    pub source: String,
    pub source_details: Option<String>,
    pub change_type: ChangeType,
    pub time: String,
    pub attribution: Option<String>,
    pub changed_field: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_round_trips_through_str() {
        for ty in [
            NodeType::Chemical,
            NodeType::Synonym,
            NodeType::Taxonomy,
            NodeType::Reaction,
        ] {
            assert_eq!(ty.as_str().parse::<NodeType>().unwrap(), ty);
        }
        assert!("protein".parse::<NodeType>().is_err());
    }

    #[test]
    fn test_edge_candidate_omits_missing_data() {
        let edge = HashEdgeCandidate::new(HashScheme::CURRENT, "a", "b", HAS_PARENT).resolve(1, 2);
        assert_eq!(edge.column_value("data"), None);
        assert_eq!(edge.column_value("source_id"), Some(Value::Integer(1)));
        assert_eq!(edge.previous_hash.as_deref(), Some(edge.hash.as_str()));
    }

    #[test]
    fn test_synonym_candidate_payload() {
        let owner = ContentKey::chemical("XLYOFNOQVPJJNP-UHFFFAOYSA-N");
        let (synonym, edge) = NodeCandidate::synonym(HashScheme::CURRENT, &owner, "chebi", "15377");
        let owner_hash = crate::hash::chemical_hash_fn("XLYOFNOQVPJJNP-UHFFFAOYSA-N");
        assert_eq!(synonym.node_type_id, "synonym");
        assert_eq!(synonym.data, json!({"source": "chebi", "value": "15377"}));
        assert_eq!(
            synonym.hash,
            crate::hash::synonym_hash_fn(&owner_hash, "chebi", "15377")
        );
        assert_eq!(edge.source_hash, owner_hash);
        assert_eq!(edge.destination_hash, synonym.hash);
        assert_eq!(edge.relationship, HAS_SYNONYM);
    }

    #[test]
    fn test_keyed_candidates_carry_previous_scheme_hashes() {
        let v2 = HashScheme::unreleased(2);
        let v1 = HashScheme::CURRENT;
        let owner = ContentKey::taxonomy("83333");
        let taxon = NodeCandidate::keyed(v2, NodeType::Taxonomy, json!({}), &owner);
        assert_eq!(taxon.hash, v2.taxonomy("83333"));
        assert_eq!(taxon.previous_hash, Some(v1.taxonomy("83333")));

        let (synonym, edge) = NodeCandidate::synonym(v2, &owner, "ncbi_taxonomy", "83333");
        let v1_synonym = v1.synonym(&v1.taxonomy("83333"), "ncbi_taxonomy", "83333");
        assert_eq!(synonym.previous_hash.as_deref(), Some(v1_synonym.as_str()));
        assert_eq!(
            edge.previous_hash,
            Some(v1.edge(&v1.taxonomy("83333"), &v1_synonym, HAS_SYNONYM))
        );
    }
}
