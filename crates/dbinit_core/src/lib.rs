//! Idempotent MongoDB schema bootstrap.
//! Connects with bounded retry, then creates missing collections and indexes.

pub mod config;
pub mod logging;
pub mod provision;
pub mod schema;
pub mod store;

pub use config::{load_env_file, ConfigError, ConfigResult, ConnectionSettings};
pub use logging::{default_log_dir, default_log_level, init_logging, logging_status, LoggingError};
pub use provision::{
    connect_with_retry, ensure_collection, ensure_indexes, provision_schema, CollectionReport,
    CollectionState, IndexReport, IndexState, Progress, ProvisionError, ProvisionReport,
    ProvisionResult, Provisioner, RetryPolicy,
};
pub use schema::{CollectionSpec, Direction, IndexField, IndexSpec, Profile, Schema, SchemaError};
pub use store::{
    Connector, MemoryConnector, MemoryStore, MongoConnector, MongoStore, Operation, Reachability,
    SchemaStore, StoreError, StoreResult,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
