//! Explicit table definitions and the row currency of the bulk primitives.
//!
//! Every statement the bulk loader builds interpolates table and column
//! names, so both are checked against the definitions here before any SQL
//! is formatted.

use std::collections::BTreeMap;
use std::fmt;

use rusqlite::types::{FromSql, Value, ValueRef};

use crate::errors::ContentGraphError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Table {
    Node,
    Edge,
    NodeHistory,
    EdgeHistory,
    /// Read-only view of `(owner id, owner hash, synonym source, synonym value)`.
    NodeSearch,
}

const NODE_COLUMNS: &[&str] = &["id", "node_type_id", "data", "hash"];
const EDGE_COLUMNS: &[&str] = &[
    "id",
    "source_id",
    "destination_id",
    "relationship",
    "hash",
    "data",
];
const NODE_HISTORY_COLUMNS: &[&str] = &[
    "id",
    "node_id",
    "source",
    "source_details",
    "change_type",
    "time",
    "attribution",
    "changed_field",
];
const EDGE_HISTORY_COLUMNS: &[&str] = &[
    "id",
    "edge_id",
    "source",
    "source_details",
    "change_type",
    "time",
    "attribution",
    "changed_field",
];
const NODE_SEARCH_COLUMNS: &[&str] = &["id", "hash", "source", "value"];

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Node => "node",
            Table::Edge => "edge",
            Table::NodeHistory => "node_history",
            Table::EdgeHistory => "edge_history",
            Table::NodeSearch => "node_search",
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Table::Node => NODE_COLUMNS,
            Table::Edge => EDGE_COLUMNS,
            Table::NodeHistory => NODE_HISTORY_COLUMNS,
            Table::EdgeHistory => EDGE_HISTORY_COLUMNS,
            Table::NodeSearch => NODE_SEARCH_COLUMNS,
        }
    }

    /// Columns written on insert; the store assigns `id`.
    pub fn insert_columns(&self) -> &'static [&'static str] {
        &self.columns()[1..]
    }

    pub fn is_writable(&self) -> bool {
        !matches!(self, Table::NodeSearch)
    }

    /// Whether rows carry a content hash, i.e. can be loaded by hash.
    pub fn is_content_addressed(&self) -> bool {
        matches!(self, Table::Node | Table::Edge)
    }

    pub(crate) fn check_column(&self, column: &str) -> Result<&'static str, ContentGraphError> {
        self.columns()
            .iter()
            .copied()
            .find(|known| *known == column)
            .ok_or_else(|| {
                ContentGraphError::invalid_input(format!(
                    "unknown column {column} for table {}",
                    self.name()
                ))
            })
    }

    pub(crate) fn check_columns(
        &self,
        columns: &[&str],
    ) -> Result<Vec<&'static str>, ContentGraphError> {
        columns.iter().map(|c| self.check_column(c)).collect()
    }

    pub(crate) fn check_writable(&self) -> Result<(), ContentGraphError> {
        if self.is_writable() {
            Ok(())
        } else {
            Err(ContentGraphError::invalid_input(format!(
                "table {} is read-only",
                self.name()
            )))
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Anything the bulk primitives can read column values from.
///
/// Returning `None` means the row has no value for that column; inserts bind
/// `NULL` for it and matches skip the row.
pub trait TableRow {
    fn column_value(&self, column: &str) -> Option<Value>;
}

impl<T: TableRow + ?Sized> TableRow for &T {
    fn column_value(&self, column: &str) -> Option<Value> {
        (**self).column_value(column)
    }
}

/// A loosely typed row keyed by column name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row {
    values: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: &str, value: impl Into<Value>) {
        self.values.insert(column.to_string(), value.into());
    }

    pub fn value(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    pub fn get<T: FromSql>(&self, column: &str) -> Result<T, ContentGraphError> {
        let value = self
            .values
            .get(column)
            .ok_or_else(|| ContentGraphError::query(format!("column {column} missing from row")))?;
        T::column_result(ValueRef::from(value))
            .map_err(|e| ContentGraphError::query(format!("column {column}: {e}")))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl TableRow for Row {
    fn column_value(&self, column: &str) -> Option<Value> {
        self.values.get(column).cloned()
    }
}

/// Hashable projection of a bound value, used to de-duplicate match keys.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum ValueKey {
    Integer(i64),
    Real(u64),
    Text(String),
    Blob(Vec<u8>),
}

impl ValueKey {
    pub(crate) fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Integer(i) => Some(ValueKey::Integer(*i)),
            Value::Real(r) => Some(ValueKey::Real(r.to_bits())),
            Value::Text(t) => Some(ValueKey::Text(t.clone())),
            Value::Blob(b) => Some(ValueKey::Blob(b.clone())),
        }
    }
}
