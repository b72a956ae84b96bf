use super::{connect_with_retry, Progress, ProvisionError, ProvisionResult, RetryPolicy};
use crate::schema::{CollectionSpec, Schema};
use crate::store::{Connector, SchemaStore, StoreError};
use log::{error, info};
use serde::Serialize;
use std::time::Instant;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionState {
    Created,
    Existing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    Created,
    /// The name was present before the create call.
    Existing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub name: String,
    pub state: IndexState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionReport {
    pub name: String,
    pub state: CollectionState,
    pub indexes: Vec<IndexReport>,
}

/// What a successful run found and changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionReport {
    pub database: String,
    pub collections: Vec<CollectionReport>,
}

impl ProvisionReport {
    pub fn created_collections(&self) -> Vec<&str> {
        self.collections
            .iter()
            .filter(|collection| collection.state == CollectionState::Created)
            .map(|collection| collection.name.as_str())
            .collect()
    }

    /// `(collection, index)` pairs created by this run.
    pub fn created_indexes(&self) -> Vec<(&str, &str)> {
        self.collections
            .iter()
            .flat_map(|collection| {
                collection
                    .indexes
                    .iter()
                    .filter(|index| index.state == IndexState::Created)
                    .map(move |index| (collection.name.as_str(), index.name.as_str()))
            })
            .collect()
    }

    pub fn is_noop(&self) -> bool {
        self.created_collections().is_empty() && self.created_indexes().is_empty()
    }
}

/// Creates `spec` when it is not listed yet.
///
/// A concurrent create surfacing as `NamespaceExists` counts as existing.
///
/// # Errors
/// - `ProvisionError::Collection` for any other store failure.
pub fn ensure_collection<S: SchemaStore>(
    store: &S,
    spec: &CollectionSpec,
    observer: &mut dyn FnMut(&Progress<'_>),
) -> ProvisionResult<CollectionState> {
    let wrap = |source: StoreError| ProvisionError::Collection {
        collection: spec.name.to_string(),
        source,
    };

    let exists = store
        .collection_names()
        .map_err(wrap)?
        .iter()
        .any(|name| name == spec.name);

    let state = if exists {
        CollectionState::Existing
    } else {
        match store.create_collection(spec.name) {
            Ok(()) => CollectionState::Created,
            Err(StoreError::NamespaceExists(_)) => CollectionState::Existing,
            Err(err) => return Err(wrap(err)),
        }
    };

    match state {
        CollectionState::Created => {
            info!(
                "event=collection_ensure module=provision status=created collection={}",
                spec.name
            );
            observer(&Progress::CollectionCreated(spec.name));
        }
        CollectionState::Existing => {
            info!(
                "event=collection_ensure module=provision status=exists collection={}",
                spec.name
            );
            observer(&Progress::CollectionExists(spec.name));
        }
    }
    Ok(state)
}

/// Issues a create call for every declared index of `spec`, in order.
///
/// # Errors
/// - `ProvisionError::IndexList` when existing indexes cannot be listed.
/// - `ProvisionError::Index` on the first failing index, including name
///   collisions with a different definition.
pub fn ensure_indexes<S: SchemaStore>(
    store: &S,
    spec: &CollectionSpec,
    observer: &mut dyn FnMut(&Progress<'_>),
) -> ProvisionResult<Vec<IndexReport>> {
    let existing = store
        .index_names(spec.name)
        .map_err(|source| ProvisionError::IndexList {
            collection: spec.name.to_string(),
            source,
        })?;

    let mut reports = Vec::with_capacity(spec.indexes.len());
    for index in spec.indexes {
        store
            .create_index(spec.name, index)
            .map_err(|source| ProvisionError::Index {
                collection: spec.name.to_string(),
                index: index.name.to_string(),
                source,
            })?;

        let state = if existing.iter().any(|name| name == index.name) {
            IndexState::Existing
        } else {
            IndexState::Created
        };
        info!(
            "event=index_ensure module=provision status={} collection={} index={} unique={}",
            match state {
                IndexState::Created => "created",
                IndexState::Existing => "exists",
            },
            spec.name,
            index.name,
            index.unique
        );
        reports.push(IndexReport {
            name: index.name.to_string(),
            state,
        });
    }

    observer(&Progress::IndexesEnsured(spec.name));
    Ok(reports)
}

/// Ensures every declared collection and then its indexes, in order.
pub fn provision_schema<S: SchemaStore>(
    store: &S,
    schema: &Schema,
    observer: &mut dyn FnMut(&Progress<'_>),
) -> ProvisionResult<ProvisionReport> {
    let mut collections = Vec::with_capacity(schema.collections.len());
    for spec in schema.collections {
        let state = ensure_collection(store, spec, observer)?;
        let indexes = ensure_indexes(store, spec, observer)?;
        collections.push(CollectionReport {
            name: spec.name.to_string(),
            state,
            indexes,
        });
    }
    Ok(ProvisionReport {
        database: schema.database.clone(),
        collections,
    })
}

/// Runs the whole bootstrap sequence against one connector.
#[derive(Debug, Clone)]
pub struct Provisioner {
    policy: RetryPolicy,
    run_id: Uuid,
}

impl Default for Provisioner {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl Provisioner {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Validates `schema`, connects with retry, provisions, then closes.
    ///
    /// # Side effects
    /// - Creates missing collections and indexes in `schema.database`.
    /// - Emits `provision_run` events tagged with this provisioner's run id.
    ///
    /// # Errors
    /// - `Schema` before any connection attempt.
    /// - `ConnectionExhausted`/`Connect` with no schema write performed.
    /// - `Collection`/`IndexList`/`Index` after the store has been closed.
    pub fn run<C: Connector>(
        &self,
        connector: &C,
        schema: &Schema,
        observer: &mut dyn FnMut(&Progress<'_>),
    ) -> ProvisionResult<ProvisionReport> {
        let started_at = Instant::now();
        info!(
            "event=provision_run module=provision status=start run_id={} target={} database={} collections={}",
            self.run_id,
            connector.target(),
            schema.database,
            schema.collections.len()
        );

        let result = self.run_inner(connector, schema, observer);
        match &result {
            Ok(report) => info!(
                "event=provision_run module=provision status=ok run_id={} duration_ms={} created_collections={} created_indexes={}",
                self.run_id,
                started_at.elapsed().as_millis(),
                report.created_collections().len(),
                report.created_indexes().len()
            ),
            Err(err) => error!(
                "event=provision_run module=provision status=error run_id={} duration_ms={} error_code={} error={}",
                self.run_id,
                started_at.elapsed().as_millis(),
                err.code(),
                err
            ),
        }
        result
    }

    fn run_inner<C: Connector>(
        &self,
        connector: &C,
        schema: &Schema,
        observer: &mut dyn FnMut(&Progress<'_>),
    ) -> ProvisionResult<ProvisionReport> {
        schema.validate()?;
        let store = connect_with_retry(connector, &schema.database, &self.policy, observer)?;

        let result = provision_schema(&store, schema, observer);
        match &result {
            Ok(_) => observer(&Progress::Complete),
            Err(err) => observer(&Progress::Failed(err)),
        }

        store.close();
        info!(
            "event=db_close module=provision status=ok run_id={}",
            self.run_id
        );
        observer(&Progress::ConnectionClosed);
        result
    }
}
