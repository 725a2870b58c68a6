//! Content-addressed ingestion of scientific entities into a SQLite graph.
//!
//! Nodes and edges are identified by deterministic content hashes rather than
//! row ids. Batches are loaded idempotently in chunked transactions, with a
//! `create` history row written once per entity.

pub mod bench_utils;
pub mod bulk;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fault_injection;
pub mod hash;
pub mod import;
pub mod model;
pub mod provenance;
pub mod schema;
pub mod store;

pub use crate::bulk::{
    ChunkConfig, ColumnMatch, ConflictPolicy, chunked_insert, chunked_select, chunked_update,
};
pub use crate::config::{StoreConfig, StoreTarget, open_store};
pub use crate::engine::{
    EdgeResolution, IdentityLookup, LoadOptions, load_with_hash, lookup_hashes, lookup_synonyms,
    resolve_edges,
};
pub use crate::errors::ContentGraphError;
pub use crate::hash::{
    ContentKey, HashScheme, KeyedParticipant, chemical_hash_fn, edge_hash_fn, reaction_hash_fn, synonym_hash_fn,
    taxonomy_hash_fn,
};
pub use crate::model::{
    ChangeType, Edge, EdgeCandidate, HashEdgeCandidate, HashedRecord, HistoryEntry, IdHash, Node,
    NodeCandidate, NodeType, Stoichiometry,
};
pub use crate::provenance::{Provenance, record_creations};
pub use crate::store::{GraphStore, Row, Table, TableRow};
