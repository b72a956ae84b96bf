//! Idempotent schema provisioning with bounded connection retry.
//!
//! # Responsibility
//! - Connect with retries, then create missing collections and indexes.
//! - Report every step as `Progress` and as structured log events.
//!
//! # Invariants
//! - No schema write happens before a successful ping.
//! - An opened store is closed exactly once, on every exit path.
//! - Re-running against an already provisioned store changes nothing.

use crate::schema::SchemaError;
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod progress;
mod provisioner;
mod retry;

pub use progress::Progress;
pub use provisioner::{
    ensure_collection, ensure_indexes, provision_schema, CollectionReport, CollectionState,
    IndexReport, IndexState, ProvisionReport, Provisioner,
};
pub use retry::{connect_with_retry, RetryPolicy};

pub type ProvisionResult<T> = Result<T, ProvisionError>;

#[derive(Debug)]
pub enum ProvisionError {
    Schema(SchemaError),
    /// Connecting failed with an error that is not worth retrying.
    Connect(StoreError),
    ConnectionExhausted {
        attempts: u32,
    },
    Collection {
        collection: String,
        source: StoreError,
    },
    /// Listing the existing indexes of `collection` failed.
    IndexList {
        collection: String,
        source: StoreError,
    },
    Index {
        collection: String,
        index: String,
        source: StoreError,
    },
}

impl ProvisionError {
    /// Stable code used in log events.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Schema(_) => "schema_invalid",
            Self::Connect(_) => "connect_failed",
            Self::ConnectionExhausted { .. } => "connect_exhausted",
            Self::Collection { .. } => "collection_failed",
            Self::IndexList { .. } => "index_list_failed",
            Self::Index { .. } => "index_failed",
        }
    }
}

impl Display for ProvisionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Schema(err) => write!(f, "invalid schema: {err}"),
            Self::Connect(err) => write!(f, "connection failed: {err}"),
            Self::ConnectionExhausted { attempts } => {
                write!(f, "could not connect after {attempts} attempts")
            }
            Self::Collection { collection, source } => {
                write!(f, "failed to ensure collection `{collection}`: {source}")
            }
            Self::IndexList { collection, source } => {
                write!(f, "failed to list indexes of collection `{collection}`: {source}")
            }
            Self::Index {
                collection,
                index,
                source,
            } => write!(
                f,
                "failed to ensure index `{index}` on collection `{collection}`: {source}"
            ),
        }
    }
}

impl Error for ProvisionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Schema(err) => Some(err),
            Self::Connect(err) => Some(err),
            Self::ConnectionExhausted { .. } => None,
            Self::Collection { source, .. } => Some(source),
            Self::IndexList { source, .. } => Some(source),
            Self::Index { source, .. } => Some(source),
        }
    }
}

impl From<SchemaError> for ProvisionError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}
