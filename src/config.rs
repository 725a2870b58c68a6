//! Store selection and connection options.
//!
//! The store target comes from an explicit value (the CLI `--database` flag)
//! or, failing that, from the `CONTENTGRAPH_DATABASE` environment variable.
//! A missing target is a configuration error raised before anything runs.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::{errors::ContentGraphError, store::GraphStore};

pub const DATABASE_ENV: &str = "CONTENTGRAPH_DATABASE";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreTarget {
    Memory,
    File(PathBuf),
}

impl StoreTarget {
    pub fn parse(raw: &str) -> Result<Self, ContentGraphError> {
        match raw.trim() {
            "" => Err(ContentGraphError::config("empty database target")),
            "memory" | ":memory:" => Ok(StoreTarget::Memory),
            path => Ok(StoreTarget::File(PathBuf::from(path))),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct StoreConfig {
    pub target: Option<StoreTarget>,
    pub without_migrations: bool,
    /// Applied in key order after the store is open.
    pub pragma_settings: BTreeMap<String, String>,
}

impl StoreConfig {
    pub fn new(target: StoreTarget) -> Self {
        Self {
            target: Some(target),
            ..Self::default()
        }
    }

    /// Resolve the target from `explicit`, falling back to [`DATABASE_ENV`].
    pub fn from_args(explicit: Option<&str>) -> Result<Self, ContentGraphError> {
        let env_value = std::env::var(DATABASE_ENV).ok();
        Self::resolve(explicit, env_value.as_deref())
    }

    pub fn resolve(
        explicit: Option<&str>,
        env_value: Option<&str>,
    ) -> Result<Self, ContentGraphError> {
        let raw = explicit.or(env_value).ok_or_else(|| {
            ContentGraphError::config(format!(
                "no database configured; pass --database or set {DATABASE_ENV}"
            ))
        })?;
        Ok(Self::new(StoreTarget::parse(raw)?))
    }

    pub fn pragma(mut self, key: &str, value: &str) -> Self {
        self.pragma_settings
            .insert(key.to_string(), value.to_string());
        self
    }
}

pub fn open_store(cfg: &StoreConfig) -> Result<GraphStore, ContentGraphError> {
    let target = cfg
        .target
        .as_ref()
        .ok_or_else(|| ContentGraphError::config("no database target configured"))?;
    let store = match (target, cfg.without_migrations) {
        (StoreTarget::Memory, false) => GraphStore::open_in_memory()?,
        (StoreTarget::Memory, true) => GraphStore::open_in_memory_without_migrations()?,
        (StoreTarget::File(path), false) => GraphStore::open(path)?,
        (StoreTarget::File(path), true) => GraphStore::open_without_migrations(path)?,
    };
    for (key, value) in &cfg.pragma_settings {
        store.apply_pragma(key, value)?;
    }
    tracing::debug!(store = ?target, "opened store");
    Ok(store)
}
