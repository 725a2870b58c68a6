//! Deterministic content hashes for nodes and edges.
//!
//! Every digest input starts with a version tag and a domain tag, so two
//! entity kinds never collide and a future change to any hash function shows
//! up as a new [`HashScheme`] version instead of silently different digests.
//! Digests are SHA-256 rendered as 64 lowercase hex characters.

use std::fmt::Write as _;

use sha2::{Digest, Sha256};

use crate::{errors::ContentGraphError, model::Stoichiometry};

/// Placeholder for a participant without a compartment rule.
const NULL_COMPARTMENT: &str = "NULL";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HashScheme {
    version: u32,
}

/// The inputs an entity's digest is computed from.
///
/// Digests nest: a synonym hash covers its owner's hash, an edge hash covers
/// both endpoint hashes. Keeping the inputs lets every level be recomputed
/// under another scheme, which is what migration by `previous_hash` needs.
#[derive(Clone, Debug, PartialEq)]
pub enum ContentKey {
    /// InChIKey.
    Chemical(String),
    /// NCBI tax id.
    Taxonomy(String),
    Synonym {
        owner: Box<ContentKey>,
        source: String,
        value: String,
    },
    Reaction(Vec<KeyedParticipant>),
    /// A digest whose inputs are unknown; it reads the same under every scheme.
    Digest(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct KeyedParticipant {
    pub entity: ContentKey,
    pub coefficient: f64,
    pub compartment_rule: Option<String>,
}

impl ContentKey {
    pub fn chemical(inchi_key: impl Into<String>) -> Self {
        ContentKey::Chemical(inchi_key.into())
    }

    pub fn taxonomy(tax_id: impl Into<String>) -> Self {
        ContentKey::Taxonomy(tax_id.into())
    }

    pub fn synonym(owner: ContentKey, source: impl Into<String>, value: impl Into<String>) -> Self {
        ContentKey::Synonym {
            owner: Box::new(owner),
            source: source.into(),
            value: value.into(),
        }
    }

    pub fn digest(hash: impl Into<String>) -> Self {
        ContentKey::Digest(hash.into())
    }
}

impl HashScheme {
    pub const CURRENT: HashScheme = HashScheme { version: 1 };

    /// A scheme newer than [`HashScheme::CURRENT`], for exercising migrations.
    #[cfg(test)]
    pub(crate) const fn unreleased(version: u32) -> Self {
        Self { version }
    }

    pub fn new(version: u32) -> Result<Self, ContentGraphError> {
        if version == 0 || version > Self::CURRENT.version {
            return Err(ContentGraphError::invalid_input(format!(
                "unsupported hash scheme version {version}"
            )));
        }
        Ok(Self { version })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// The scheme whose digests appear as `previous_hash` during a migration.
    pub fn previous(&self) -> Option<HashScheme> {
        (self.version > 1).then(|| HashScheme {
            version: self.version - 1,
        })
    }

    /// Digest under the previous scheme, or under this one when there is none.
    pub fn previous_or_current(&self, f: impl Fn(&HashScheme) -> String) -> String {
        match self.previous() {
            Some(previous) => f(&previous),
            None => f(self),
        }
    }

    /// Digest of `key` with every nested digest recomputed under this scheme.
    pub fn key_hash(&self, key: &ContentKey) -> String {
        match key {
            ContentKey::Chemical(inchi_key) => self.chemical(inchi_key),
            ContentKey::Taxonomy(tax_id) => self.taxonomy(tax_id),
            ContentKey::Synonym {
                owner,
                source,
                value,
            } => self.synonym(&self.key_hash(owner), source, value),
            ContentKey::Reaction(participants) => {
                let rows: Vec<Stoichiometry> = participants
                    .iter()
                    .map(|p| Stoichiometry {
                        entity_hash: self.key_hash(&p.entity),
                        coefficient: p.coefficient,
                        compartment_rule: p.compartment_rule.clone(),
                    })
                    .collect();
                self.reaction(&rows)
            }
            ContentKey::Digest(hash) => hash.clone(),
        }
    }

    /// `(hash, previous_hash)` of `key`.
    pub fn key_hashes(&self, key: &ContentKey) -> (String, String) {
        (
            self.key_hash(key),
            self.previous_or_current(|s| s.key_hash(key)),
        )
    }

    pub fn edge_between(
        &self,
        source: &ContentKey,
        destination: &ContentKey,
        relationship: &str,
    ) -> String {
        self.edge(
            &self.key_hash(source),
            &self.key_hash(destination),
            relationship,
        )
    }

    pub fn chemical(&self, inchi_key: &str) -> String {
        self.digest("chemical", &[inchi_key])
    }

    pub fn taxonomy(&self, tax_id: &str) -> String {
        self.digest("taxonomy", &[tax_id])
    }

    pub fn synonym(&self, owner_hash: &str, source: &str, value: &str) -> String {
        self.digest("synonym", &[owner_hash, source, value])
    }

    pub fn edge(&self, source_hash: &str, destination_hash: &str, relationship: &str) -> String {
        self.digest("edge", &[source_hash, destination_hash, relationship])
    }

    /// Direction-independent reaction digest.
    ///
    /// The participants are canonicalized once as given and once with every
    /// coefficient negated; the smaller of the two digests wins.
    pub fn reaction(&self, participants: &[Stoichiometry]) -> String {
        let forward = self.digest("reaction", &[&canonical_participants(participants, 1.0)]);
        let reverse = self.digest("reaction", &[&canonical_participants(participants, -1.0)]);
        forward.min(reverse)
    }

    fn digest(&self, domain: &str, fields: &[&str]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(format!("v{}", self.version).as_bytes());
        hasher.update([0u8]);
        hasher.update(domain.as_bytes());
        for field in fields {
            hasher.update([0u8]);
            hasher.update(field.as_bytes());
        }
        to_hex(&hasher.finalize())
    }
}

impl Default for HashScheme {
    fn default() -> Self {
        Self::CURRENT
    }
}

fn canonical_participants(participants: &[Stoichiometry], sign: f64) -> String {
    let mut tuples: Vec<String> = participants
        .iter()
        .map(|p| {
            let coefficient = format_coefficient(p.coefficient * sign);
            let compartment = p.compartment_rule.as_deref().unwrap_or(NULL_COMPARTMENT);
            format!("{}\0{}\0{}", p.entity_hash, coefficient, compartment)
        })
        .collect();
    tuples.sort();
    tuples.join("\0\0")
}

fn format_coefficient(value: f64) -> String {
    let formatted = format!("{value:.2}");
    if formatted == "-0.00" {
        "0.00".to_string()
    } else {
        formatted
    }
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

pub fn chemical_hash_fn(inchi_key: &str) -> String {
    HashScheme::CURRENT.chemical(inchi_key)
}

pub fn taxonomy_hash_fn(tax_id: &str) -> String {
    HashScheme::CURRENT.taxonomy(tax_id)
}

pub fn synonym_hash_fn(owner_hash: &str, source: &str, value: &str) -> String {
    HashScheme::CURRENT.synonym(owner_hash, source, value)
}

pub fn edge_hash_fn(source_hash: &str, destination_hash: &str, relationship: &str) -> String {
    HashScheme::CURRENT.edge(source_hash, destination_hash, relationship)
}

pub fn reaction_hash_fn(participants: &[Stoichiometry]) -> String {
    HashScheme::CURRENT.reaction(participants)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coefficient_formatting() {
        assert_eq!(format_coefficient(1.0), "1.00");
        assert_eq!(format_coefficient(-0.5), "-0.50");
        assert_eq!(format_coefficient(-0.0), "0.00");
        assert_eq!(format_coefficient(-0.001), "0.00");
    }

    #[test]
    fn test_canonical_form_is_sorted() {
        let rows = vec![Stoichiometry::new("b", 1.0), Stoichiometry::new("a", -1.0)];
        assert_eq!(
            canonical_participants(&rows, 1.0),
            "a\0-1.00\0NULL\0\0b\01.00\0NULL"
        );
    }

    #[test]
    fn test_scheme_versions() {
        assert!(HashScheme::new(0).is_err());
        assert!(HashScheme::new(2).is_err());
        assert_eq!(HashScheme::new(1).unwrap(), HashScheme::CURRENT);
        assert_eq!(HashScheme::CURRENT.previous(), None);
    }

    #[test]
    fn test_nested_digests_follow_the_scheme() {
        let v1 = HashScheme::CURRENT;
        let v2 = HashScheme::unreleased(2);
        let owner = ContentKey::taxonomy("511145");
        let synonym = ContentKey::synonym(owner.clone(), "ncbi_taxonomy", "511145");

        assert_eq!(v2.previous(), Some(v1));
        let (hash, previous) = v2.key_hashes(&synonym);
        assert_eq!(hash, v2.synonym(&v2.taxonomy("511145"), "ncbi_taxonomy", "511145"));
        assert_eq!(previous, v1.synonym(&v1.taxonomy("511145"), "ncbi_taxonomy", "511145"));

        let edge = v2.previous_or_current(|s| s.edge_between(&owner, &synonym, "has_synonym"));
        assert_eq!(edge, v1.edge(&v1.taxonomy("511145"), &previous, "has_synonym"));
    }

    #[test]
    fn test_reaction_key_rehashes_participants() {
        let v2 = HashScheme::unreleased(2);
        let key = ContentKey::Reaction(vec![KeyedParticipant {
            entity: ContentKey::chemical("XLYOFNOQVPJJNP-UHFFFAOYSA-N"),
            coefficient: -1.0,
            compartment_rule: None,
        }]);
        let (_, previous) = v2.key_hashes(&key);
        assert_eq!(
            previous,
            reaction_hash_fn(&[Stoichiometry::new(
                chemical_hash_fn("XLYOFNOQVPJJNP-UHFFFAOYSA-N"),
                -1.0
            )])
        );
        assert_eq!(v2.key_hash(&ContentKey::digest("abc")), "abc");
    }

    #[test]
    fn test_domains_do_not_collide() {
        assert_ne!(chemical_hash_fn("511145"), taxonomy_hash_fn("511145"));
    }
}
