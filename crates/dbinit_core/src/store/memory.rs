//! In-process schema store with MongoDB-equivalent create semantics.
//!
//! # Responsibility
//! - Back dry runs and tests without a database server.
//! - Enforce unique indexes on inserted documents.
//! - Simulate an unreachable server for a bounded or unbounded number of pings.
//! - Inject a rejected ping or a failing schema operation.
//!
//! # Invariants
//! - Stores opened from one connector share state, so later runs observe
//!   earlier ones.
//! - Every collection carries the implicit `_id_` index.

use super::{Connector, SchemaStore, StoreError, StoreResult};
use crate::schema::{Direction, IndexField, IndexSpec};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

const ID_FIELD: &str = "_id";

const ID_INDEX: IndexSpec = IndexSpec {
    name: "_id_",
    fields: &[IndexField {
        name: ID_FIELD,
        direction: Direction::Ascending,
    }],
    unique: true,
};

/// Whether pings reach the simulated server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reachability {
    #[default]
    Reachable,
    /// The next `n` pings fail, later ones succeed.
    UnreachableFor(u32),
    Unreachable,
    /// Pings reach the server but are refused, as with bad credentials.
    Rejecting,
}

/// Schema operation that can be made to fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CollectionNames,
    CreateCollection,
    IndexNames,
    CreateIndex,
}

#[derive(Debug, Default)]
struct MemoryCollection {
    indexes: Vec<IndexSpec>,
    documents: Vec<Value>,
}

impl MemoryCollection {
    fn new() -> Self {
        Self {
            indexes: vec![ID_INDEX],
            documents: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    databases: BTreeMap<String, BTreeMap<String, MemoryCollection>>,
    reachability: Reachability,
    failing: Option<Operation>,
}

#[derive(Debug, Default)]
struct Counters {
    connects: AtomicU32,
    pings: AtomicU32,
    schema_writes: AtomicUsize,
    closes: AtomicUsize,
}

/// Opens `MemoryStore`s over one shared in-process server.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<MemoryState>>,
    counters: Arc<Counters>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reachability(reachability: Reachability) -> Self {
        let connector = Self::default();
        connector.set_reachability(reachability);
        connector
    }

    pub fn set_reachability(&self, reachability: Reachability) {
        lock(&self.state).reachability = reachability;
    }

    /// Makes every later call of `operation` fail with `StoreError::Rejected`.
    pub fn fail_on(&self, operation: Operation) {
        lock(&self.state).failing = Some(operation);
    }

    /// Pre-creates `collection` with `indexes`, bypassing conflict checks.
    pub fn seed(&self, database: &str, collection: &str, indexes: &[IndexSpec]) {
        let mut state = lock(&self.state);
        let entry = state
            .databases
            .entry(database.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_insert_with(MemoryCollection::new);
        entry.indexes.extend_from_slice(indexes);
    }

    pub fn connect_attempts(&self) -> u32 {
        self.counters.connects.load(Ordering::SeqCst)
    }

    pub fn ping_attempts(&self) -> u32 {
        self.counters.pings.load(Ordering::SeqCst)
    }

    /// Collection and index creations that changed state.
    pub fn schema_writes(&self) -> usize {
        self.counters.schema_writes.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    /// Snapshot of `collection -> index definitions` for one database.
    pub fn snapshot(&self, database: &str) -> BTreeMap<String, Vec<IndexSpec>> {
        lock(&self.state)
            .databases
            .get(database)
            .map(|collections| {
                collections
                    .iter()
                    .map(|(name, collection)| (name.clone(), collection.indexes.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Connector for MemoryConnector {
    type Store = MemoryStore;

    fn connect(&self, database: &str) -> StoreResult<MemoryStore> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryStore {
            database: database.to_string(),
            state: Arc::clone(&self.state),
            counters: Arc::clone(&self.counters),
        })
    }

    fn target(&self) -> String {
        "memory".to_string()
    }
}

/// Connection to one database of a `MemoryConnector`.
#[derive(Debug)]
pub struct MemoryStore {
    database: String,
    state: Arc<Mutex<MemoryState>>,
    counters: Arc<Counters>,
}

impl MemoryStore {
    /// Inserts `document`, assigning an `_id` when absent.
    ///
    /// # Errors
    /// - `DuplicateKey` when any unique index already holds the same key.
    pub fn insert(&self, collection: &str, mut document: Value) -> StoreResult<()> {
        if let Value::Object(fields) = &mut document {
            fields
                .entry(ID_FIELD)
                .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        }

        let mut state = lock(&self.state);
        let target = state
            .databases
            .entry(self.database.clone())
            .or_default()
            .entry(collection.to_string())
            .or_insert_with(MemoryCollection::new);

        for index in target.indexes.iter().filter(|index| index.unique) {
            let key = index_key(index, &document);
            if target
                .documents
                .iter()
                .any(|existing| index_key(index, existing) == key)
            {
                return Err(StoreError::DuplicateKey {
                    collection: collection.to_string(),
                    index: index.name.to_string(),
                });
            }
        }
        target.documents.push(document);
        Ok(())
    }

    fn check(&self, state: &MemoryState, operation: Operation) -> StoreResult<()> {
        if state.failing == Some(operation) {
            return Err(StoreError::Rejected(format!(
                "{operation:?} refused on database `{}`",
                self.database
            )));
        }
        Ok(())
    }

    fn record_write(&self) {
        self.counters.schema_writes.fetch_add(1, Ordering::SeqCst);
    }
}

impl SchemaStore for MemoryStore {
    fn ping(&self) -> StoreResult<()> {
        self.counters.pings.fetch_add(1, Ordering::SeqCst);
        let mut state = lock(&self.state);
        let reachability = state.reachability;
        match reachability {
            Reachability::Reachable => Ok(()),
            Reachability::Unreachable => Err(unreachable()),
            Reachability::Rejecting => Err(StoreError::Rejected(
                "authentication failed".to_string(),
            )),
            Reachability::UnreachableFor(remaining) => {
                state.reachability = match remaining {
                    0 | 1 => Reachability::Reachable,
                    n => Reachability::UnreachableFor(n - 1),
                };
                if remaining == 0 {
                    Ok(())
                } else {
                    Err(unreachable())
                }
            }
        }
    }

    fn collection_names(&self) -> StoreResult<Vec<String>> {
        let state = lock(&self.state);
        self.check(&state, Operation::CollectionNames)?;
        Ok(state
            .databases
            .get(&self.database)
            .map(|collections| collections.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn create_collection(&self, name: &str) -> StoreResult<()> {
        let mut state = lock(&self.state);
        self.check(&state, Operation::CreateCollection)?;
        let collections = state.databases.entry(self.database.clone()).or_default();
        if collections.contains_key(name) {
            return Err(StoreError::NamespaceExists(name.to_string()));
        }
        collections.insert(name.to_string(), MemoryCollection::new());
        drop(state);
        self.record_write();
        Ok(())
    }

    fn index_names(&self, collection: &str) -> StoreResult<Vec<String>> {
        let state = lock(&self.state);
        self.check(&state, Operation::IndexNames)?;
        Ok(state
            .databases
            .get(&self.database)
            .and_then(|collections| collections.get(collection))
            .map(|found| {
                found
                    .indexes
                    .iter()
                    .map(|index| index.name.to_string())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn create_index(&self, collection: &str, index: &IndexSpec) -> StoreResult<()> {
        let mut state = lock(&self.state);
        self.check(&state, Operation::CreateIndex)?;
        let target = state
            .databases
            .entry(self.database.clone())
            .or_default()
            .entry(collection.to_string())
            .or_insert_with(MemoryCollection::new);

        if let Some(existing) = target.indexes.iter().find(|existing| existing.name == index.name) {
            if existing == index {
                return Ok(());
            }
            return Err(StoreError::IndexConflict {
                collection: collection.to_string(),
                index: index.name.to_string(),
                reason: "an index with the same name has a different definition".to_string(),
            });
        }
        if let Some(existing) = target.indexes.iter().find(|existing| existing.same_keys(index)) {
            return Err(StoreError::IndexConflict {
                collection: collection.to_string(),
                index: index.name.to_string(),
                reason: format!("same key pattern already indexed as `{}`", existing.name),
            });
        }
        if index.unique {
            let mut seen = Vec::with_capacity(target.documents.len());
            for document in &target.documents {
                let key = index_key(index, document);
                if seen.contains(&key) {
                    return Err(StoreError::DuplicateKey {
                        collection: collection.to_string(),
                        index: index.name.to_string(),
                    });
                }
                seen.push(key);
            }
        }

        target.indexes.push(*index);
        drop(state);
        self.record_write();
        Ok(())
    }

    fn close(self) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
    }
}

fn unreachable() -> StoreError {
    StoreError::Unreachable("no reachable servers".to_string())
}

/// Missing fields compare as `null`, matching the server's unique semantics.
fn index_key(index: &IndexSpec, document: &Value) -> Vec<Value> {
    index
        .fields
        .iter()
        .map(|field| lookup_path(document, field.name).cloned().unwrap_or(Value::Null))
        .collect()
}

fn lookup_path<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(document, |current, segment| current.get(segment))
}

fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    // A panic while holding the lock leaves plain data; keep serving it.
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
