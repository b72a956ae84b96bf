//! Declarative collection and index specs.
//!
//! # Responsibility
//! - Describe the target schema as static, hard-coded tables.
//! - Validate structural invariants before any store is touched.
//!
//! # Invariants
//! - Index names are unique per collection.
//! - Collection names are unique per schema.
//! - Every index has at least one field and no field twice.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

static NAMESPACE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("valid namespace regex"));
static FIELD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.]*$").expect("valid field regex"));

/// Sort direction of one indexed field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Ascending,
    Descending,
}

impl Direction {
    /// Key-pattern value understood by the store (`1` / `-1`).
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Ascending => 1,
            Self::Descending => -1,
        }
    }
}

/// One `(field, direction)` pair of an index key pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct IndexField {
    pub name: &'static str,
    pub direction: Direction,
}

/// Declared index on a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexSpec {
    /// Explicit index name; re-creating under this name must be a no-op.
    pub name: &'static str,
    /// Ordered key pattern.
    pub fields: &'static [IndexField],
    pub unique: bool,
}

impl IndexSpec {
    /// Returns `true` when both specs describe the same key pattern.
    pub fn same_keys(&self, other: &IndexSpec) -> bool {
        self.fields == other.fields
    }
}

/// Declared collection together with its ordered indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CollectionSpec {
    pub name: &'static str,
    pub indexes: &'static [IndexSpec],
}

/// Target database name plus the collections to provision in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schema {
    pub database: String,
    pub collections: &'static [CollectionSpec],
}

impl Schema {
    pub fn new(database: impl Into<String>, collections: &'static [CollectionSpec]) -> Self {
        Self {
            database: database.into(),
            collections,
        }
    }

    /// Replaces the target database, keeping the collection table.
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    pub fn collection(&self, name: &str) -> Option<&CollectionSpec> {
        self.collections.iter().find(|spec| spec.name == name)
    }

    /// Checks naming and uniqueness invariants of the whole schema.
    ///
    /// # Errors
    /// - Returns the first violation found, in declaration order.
    pub fn validate(&self) -> Result<(), SchemaError> {
        check_namespace("database", &self.database)?;

        let mut seen_collections = HashSet::new();
        for collection in self.collections {
            check_namespace("collection", collection.name)?;
            if !seen_collections.insert(collection.name) {
                return Err(SchemaError::DuplicateCollection(collection.name.to_string()));
            }
            validate_indexes(collection)?;
        }
        Ok(())
    }
}

fn validate_indexes(collection: &CollectionSpec) -> Result<(), SchemaError> {
    let mut seen_names = HashSet::new();
    for index in collection.indexes {
        check_namespace("index", index.name)?;
        if !seen_names.insert(index.name) {
            return Err(SchemaError::DuplicateIndex {
                collection: collection.name.to_string(),
                index: index.name.to_string(),
            });
        }
        if index.fields.is_empty() {
            return Err(SchemaError::EmptyIndex {
                collection: collection.name.to_string(),
                index: index.name.to_string(),
            });
        }

        let mut seen_fields = HashSet::new();
        for field in index.fields {
            if !FIELD_RE.is_match(field.name) {
                return Err(SchemaError::InvalidName {
                    kind: "field",
                    name: field.name.to_string(),
                });
            }
            if !seen_fields.insert(field.name) {
                return Err(SchemaError::DuplicateField {
                    collection: collection.name.to_string(),
                    index: index.name.to_string(),
                    field: field.name.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn check_namespace(kind: &'static str, name: &str) -> Result<(), SchemaError> {
    if NAMESPACE_RE.is_match(name) {
        Ok(())
    } else {
        Err(SchemaError::InvalidName {
            kind,
            name: name.to_string(),
        })
    }
}

/// Structural violation in a declared schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    InvalidName {
        kind: &'static str,
        name: String,
    },
    DuplicateCollection(String),
    DuplicateIndex {
        collection: String,
        index: String,
    },
    EmptyIndex {
        collection: String,
        index: String,
    },
    DuplicateField {
        collection: String,
        index: String,
        field: String,
    },
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName { kind, name } => write!(f, "invalid {kind} name `{name}`"),
            Self::DuplicateCollection(name) => {
                write!(f, "collection `{name}` is declared more than once")
            }
            Self::DuplicateIndex { collection, index } => write!(
                f,
                "index `{index}` is declared more than once on collection `{collection}`"
            ),
            Self::EmptyIndex { collection, index } => {
                write!(f, "index `{index}` on collection `{collection}` has no fields")
            }
            Self::DuplicateField {
                collection,
                index,
                field,
            } => write!(
                f,
                "field `{field}` appears twice in index `{index}` on collection `{collection}`"
            ),
        }
    }
}

impl Error for SchemaError {}
