//! Schema store contracts and implementations.
//!
//! # Responsibility
//! - Define the narrow set of schema operations provisioning needs.
//! - Keep driver details behind the `SchemaStore`/`Connector` seam.
//!
//! # Invariants
//! - A store is owned by exactly one caller and released through `close`.
//! - Only `StoreError::Unreachable` is considered retryable.

use crate::schema::IndexSpec;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod memory;
pub mod mongo;

pub use memory::{MemoryConnector, MemoryStore, Operation, Reachability};
pub use mongo::{MongoConnector, MongoStore};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug)]
pub enum StoreError {
    /// The server could not be reached or selected.
    Unreachable(String),
    /// The server answered but refused the operation, e.g. bad credentials.
    Rejected(String),
    /// The collection already exists.
    NamespaceExists(String),
    /// An index with the same name or key pattern but another definition exists.
    IndexConflict {
        collection: String,
        index: String,
        reason: String,
    },
    /// A unique index rejected a write.
    DuplicateKey {
        collection: String,
        index: String,
    },
    Driver(mongodb::error::Error),
}

impl StoreError {
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unreachable(message) => write!(f, "server unreachable: {message}"),
            Self::Rejected(message) => write!(f, "server rejected the operation: {message}"),
            Self::NamespaceExists(collection) => {
                write!(f, "collection `{collection}` already exists")
            }
            Self::IndexConflict {
                collection,
                index,
                reason,
            } => write!(
                f,
                "index `{index}` on collection `{collection}` conflicts with an existing index: {reason}"
            ),
            Self::DuplicateKey { collection, index } => write!(
                f,
                "duplicate key on collection `{collection}` violates unique index `{index}`"
            ),
            Self::Driver(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Driver(err) => Some(err),
            _ => None,
        }
    }
}

/// Schema operations against one database of an open connection.
pub trait SchemaStore {
    /// Liveness check; success means the server answered.
    fn ping(&self) -> StoreResult<()>;
    fn collection_names(&self) -> StoreResult<Vec<String>>;
    fn create_collection(&self, name: &str) -> StoreResult<()>;
    /// Index names on `collection`; empty when the collection does not exist.
    fn index_names(&self, collection: &str) -> StoreResult<Vec<String>>;
    /// Creates `index`; an identical existing index makes this a no-op.
    fn create_index(&self, collection: &str, index: &IndexSpec) -> StoreResult<()>;
    /// Releases the underlying connection.
    fn close(self);
}

/// Opens stores bound to a named database.
pub trait Connector {
    type Store: SchemaStore;

    fn connect(&self, database: &str) -> StoreResult<Self::Store>;
    /// Human-readable target used in logs.
    fn target(&self) -> String;
}
