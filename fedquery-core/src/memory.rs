//! In-memory source backend.
//!
//! `MemoryStore` holds records behind a shared lock; `MemorySource` is a
//! lazily composed query over one store. Each fetch takes the lock only for
//! as long as it needs, so open iterators never block writers for long.

use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::error::{FederationError, FederationResult};
use crate::ordering::OrderingSpec;
use crate::predicate::{CompiledPredicate, Predicate};
use crate::record::{record_from_fields, Record, RecordId};
use crate::source::{BoxedSourceQuery, RecordStream, SourceProvider, SourceQuery};

struct MemoryState<R> {
    records: Vec<R>,
    next_id: RecordId,
}

/// Shared in-memory record store
pub struct MemoryStore<R> {
    state: Arc<RwLock<MemoryState<R>>>,
    served: Arc<AtomicUsize>,
}

impl<R> Clone for MemoryStore<R> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            served: Arc::clone(&self.served),
        }
    }
}

impl<R: Record> Default for MemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> MemoryStore<R> {
    /// Create a new empty store
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState {
                records: Vec::new(),
                next_id: 1,
            })),
            served: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Store a record under its own primary key.
    pub fn insert(&self, record: R) -> FederationResult<()> {
        let mut state = self.state.write();
        let pk = record.pk();
        if state.records.iter().any(|existing| existing.pk() == pk) {
            return Err(FederationError::Backend(format!(
                "duplicate primary key {}",
                pk
            )));
        }
        let after = pk.checked_add(1).ok_or_else(|| {
            FederationError::Backend(format!("primary key {} leaves no key to assign next", pk))
        })?;
        state.next_id = state.next_id.max(after);
        state.records.push(record);
        Ok(())
    }

    /// Build a record from `fields` with the next free primary key.
    pub fn create(&self, fields: Map<String, Value>) -> FederationResult<R> {
        let mut state = self.state.write();
        let pk = state.next_id;
        let next = pk.checked_add(1).ok_or_else(|| {
            FederationError::Backend(format!("primary key space exhausted at {}", pk))
        })?;
        let record: R = record_from_fields(pk, fields)?;
        state.next_id = next;
        state.records.push(record.clone());
        Ok(record)
    }

    /// Remove a record by primary key, returning whether it existed.
    pub fn delete(&self, pk: RecordId) -> bool {
        let mut state = self.state.write();
        let before = state.records.len();
        state.records.retain(|record| record.pk() != pk);
        state.records.len() != before
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records handed out by iterators of this store so far.
    pub fn records_served(&self) -> usize {
        self.served.load(AtomicOrdering::Relaxed)
    }

    /// Unfiltered, unordered query over this store.
    pub fn source(&self) -> BoxedSourceQuery<R> {
        Box::new(MemorySource {
            store: self.clone(),
            predicate: Predicate::All,
            ordering: OrderingSpec::none(),
        })
    }

    fn matching(&self, predicate: &CompiledPredicate) -> Vec<R> {
        self.state
            .read()
            .records
            .iter()
            .filter(|record| predicate.matches(*record))
            .cloned()
            .collect()
    }
}

/// Query over a `MemoryStore`.
pub struct MemorySource<R> {
    store: MemoryStore<R>,
    predicate: Predicate,
    ordering: OrderingSpec<R>,
}

impl<R: Record> MemorySource<R> {
    fn derive(&self, predicate: Predicate, ordering: OrderingSpec<R>) -> BoxedSourceQuery<R> {
        Box::new(MemorySource {
            store: self.store.clone(),
            predicate,
            ordering,
        })
    }
}

impl<R: Record> SourceQuery<R> for MemorySource<R> {
    fn filter(&self, predicate: &Predicate) -> BoxedSourceQuery<R> {
        self.derive(
            self.predicate.clone().and(predicate.clone()),
            self.ordering.clone(),
        )
    }

    fn exclude(&self, predicate: &Predicate) -> BoxedSourceQuery<R> {
        self.derive(
            self.predicate.clone().and(predicate.clone().negate()),
            self.ordering.clone(),
        )
    }

    fn order_by(&self, ordering: &OrderingSpec<R>) -> BoxedSourceQuery<R> {
        self.derive(self.predicate.clone(), ordering.clone())
    }

    fn count(&self) -> FederationResult<usize> {
        let predicate = self.predicate.compile()?;
        let state = self.store.state.read();
        Ok(state.records.iter().filter(|r| predicate.matches(*r)).count())
    }

    fn exists(&self) -> FederationResult<bool> {
        let predicate = self.predicate.compile()?;
        let state = self.store.state.read();
        Ok(state.records.iter().any(|r| predicate.matches(r)))
    }

    fn get(&self, predicate: &Predicate) -> FederationResult<R> {
        let combined = self.predicate.clone().and(predicate.clone());
        let mut matched = self.store.matching(&combined.compile()?);
        match matched.len() {
            0 => Err(FederationError::NotFound(combined.to_string())),
            1 => Ok(matched.remove(0)),
            n => Err(FederationError::MultipleResultsFound(format!(
                "{} records match {}",
                n, combined
            ))),
        }
    }

    fn create(&self, fields: Map<String, Value>) -> FederationResult<R> {
        self.store.create(fields)
    }

    fn iter(&self) -> FederationResult<RecordStream<R>> {
        let predicate = self.predicate.compile()?;
        if self.ordering.is_empty() {
            return Ok(Box::new(MemoryCursor {
                store: self.store.clone(),
                predicate,
                position: 0,
            }));
        }

        let mut records = self.store.matching(&predicate);
        records.sort_by(|a, b| self.ordering.compare(a, b));
        tracing::trace!(
            "Memory source sorted {} records by {:?}",
            records.len(),
            self.ordering
        );
        let served = Arc::clone(&self.store.served);
        Ok(Box::new(records.into_iter().map(
            move |record| -> FederationResult<R> {
                served.fetch_add(1, AtomicOrdering::Relaxed);
                Ok(record)
            },
        )))
    }

    fn box_clone(&self) -> BoxedSourceQuery<R> {
        self.derive(self.predicate.clone(), self.ordering.clone())
    }
}

/// Unordered scan that re-locks the store for every record.
struct MemoryCursor<R> {
    store: MemoryStore<R>,
    predicate: CompiledPredicate,
    position: usize,
}

impl<R: Record> Iterator for MemoryCursor<R> {
    type Item = FederationResult<R>;

    fn next(&mut self) -> Option<Self::Item> {
        let state = self.store.state.read();
        while let Some(record) = state.records.get(self.position) {
            self.position += 1;
            if self.predicate.matches(record) {
                self.store.served.fetch_add(1, AtomicOrdering::Relaxed);
                return Some(Ok(record.clone()));
            }
        }
        None
    }
}

/// Named memory stores, one per source id.
pub struct MemoryProvider<R> {
    stores: Vec<(String, MemoryStore<R>)>,
}

impl<R: Record> Default for MemoryProvider<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> MemoryProvider<R> {
    pub fn new() -> Self {
        Self { stores: Vec::new() }
    }

    /// Provider with one empty store per id.
    pub fn with_sources(source_ids: &[&str]) -> Self {
        let mut provider = Self::new();
        for id in source_ids {
            provider.add_store(id, MemoryStore::new());
        }
        provider
    }

    pub fn add_store(&mut self, source_id: &str, store: MemoryStore<R>) {
        self.stores.retain(|(id, _)| id != source_id);
        self.stores.push((source_id.to_string(), store));
    }

    pub fn store(&self, source_id: &str) -> Option<&MemoryStore<R>> {
        self.stores
            .iter()
            .find(|(id, _)| id == source_id)
            .map(|(_, store)| store)
    }
}

impl<R: Record> SourceProvider<R> for MemoryProvider<R> {
    fn handle(&self, source_id: &str) -> FederationResult<BoxedSourceQuery<R>> {
        self.store(source_id)
            .map(MemoryStore::source)
            .ok_or_else(|| FederationError::UnknownSource(source_id.to_string()))
    }
}
