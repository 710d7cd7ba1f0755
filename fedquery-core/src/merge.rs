//! Federated iteration.
//!
//! Without an ordering, sources are concatenated in registry order and each
//! source is opened only once the previous one is exhausted. With an
//! ordering, the sources are merged through a min-heap holding at most one
//! pending record per source.
//!
//! The merge only interleaves: each source must already yield its records
//! sorted by the same `OrderingSpec`, which `FederatedQuery::order_by`
//! guarantees by pushing the ordering down to every handle.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::iter::FusedIterator;
use std::sync::Arc;

use crate::error::FederationResult;
use crate::ordering::{OrderedRecordRef, OrderingSpec};
use crate::record::Record;
use crate::registry::SourceRegistry;
use crate::source::{BoxedSourceQuery, RecordStream};

/// Lazy iterator over every source of a federated query.
///
/// After yielding an error the iterator is exhausted. Dropping it drops all
/// open per-source streams.
pub struct FederatedIter<R: Record> {
    mode: Mode<R>,
    finished: bool,
}

enum Mode<R: Record> {
    Concat(ConcatState<R>),
    Merge(MergeState<R>),
}

impl<R: Record> FederatedIter<R> {
    pub(crate) fn new(registry: &SourceRegistry<R>, ordering: &OrderingSpec<R>) -> Self {
        let sources: Vec<(Arc<str>, BoxedSourceQuery<R>)> = registry
            .shared_ids()
            .zip(registry.iter().map(|(_, handle)| handle.box_clone()))
            .collect();

        let mode = if ordering.is_empty() {
            Mode::Concat(ConcatState {
                pending: sources.into(),
                current: None,
            })
        } else {
            Mode::Merge(MergeState {
                ordering: ordering.clone(),
                sources,
                streams: Vec::new(),
                heap: BinaryHeap::new(),
                refill: None,
                primed: false,
            })
        };
        Self {
            mode,
            finished: false,
        }
    }

    fn release(&mut self) {
        self.finished = true;
        match &mut self.mode {
            Mode::Concat(state) => {
                state.pending.clear();
                state.current = None;
            }
            Mode::Merge(state) => {
                state.streams.clear();
                state.heap.clear();
                state.refill = None;
            }
        }
    }
}

impl<R: Record> Iterator for FederatedIter<R> {
    type Item = FederationResult<R>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let item = match &mut self.mode {
            Mode::Concat(state) => state.next_item(),
            Mode::Merge(state) => state.next_item(),
        };
        match item {
            Some(Ok(record)) => Some(Ok(record)),
            Some(Err(e)) => {
                self.release();
                Some(Err(e))
            }
            None => {
                self.release();
                None
            }
        }
    }
}

impl<R: Record> FusedIterator for FederatedIter<R> {}

struct ConcatState<R: Record> {
    pending: VecDeque<(Arc<str>, BoxedSourceQuery<R>)>,
    current: Option<RecordStream<R>>,
}

impl<R: Record> ConcatState<R> {
    fn next_item(&mut self) -> Option<FederationResult<R>> {
        loop {
            if let Some(stream) = self.current.as_mut() {
                match stream.next() {
                    Some(item) => return Some(item),
                    None => self.current = None,
                }
            }
            let (source_id, handle) = self.pending.pop_front()?;
            tracing::trace!("Concatenating source '{}'", source_id);
            match handle.iter() {
                Ok(stream) => self.current = Some(stream),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

struct MergeState<R: Record> {
    ordering: OrderingSpec<R>,
    sources: Vec<(Arc<str>, BoxedSourceQuery<R>)>,
    /// One slot per source; `None` once a source is exhausted
    streams: Vec<Option<RecordStream<R>>>,
    heap: BinaryHeap<Reverse<OrderedRecordRef<R>>>,
    /// Source whose head was emitted last and still needs its next record
    refill: Option<usize>,
    primed: bool,
}

impl<R: Record> MergeState<R> {
    fn prime(&mut self) -> FederationResult<()> {
        let mut streams = Vec::with_capacity(self.sources.len());
        for (_, handle) in &self.sources {
            streams.push(Some(handle.iter()?));
        }
        self.streams = streams;

        for index in 0..self.streams.len() {
            self.pull(index)?;
        }
        tracing::debug!(
            "Merging {} sources ordered by {:?} ({} non-empty)",
            self.sources.len(),
            self.ordering,
            self.heap.len()
        );
        Ok(())
    }

    /// Move the next record of source `index` into the heap, or close the
    /// source when it has none left.
    fn pull(&mut self, index: usize) -> FederationResult<()> {
        let Some(stream) = self.streams[index].as_mut() else {
            return Ok(());
        };
        match stream.next() {
            Some(Ok(record)) => {
                let source_id = Arc::clone(&self.sources[index].0);
                self.heap.push(Reverse(OrderedRecordRef::new(
                    index,
                    source_id,
                    self.ordering.clone(),
                    record,
                )));
                Ok(())
            }
            Some(Err(e)) => Err(e),
            None => {
                tracing::trace!("Source '{}' exhausted", self.sources[index].0);
                self.streams[index] = None;
                Ok(())
            }
        }
    }

    fn next_item(&mut self) -> Option<FederationResult<R>> {
        if !self.primed {
            self.primed = true;
            if let Err(e) = self.prime() {
                return Some(Err(e));
            }
        }
        if let Some(index) = self.refill.take() {
            if let Err(e) = self.pull(index) {
                return Some(Err(e));
            }
        }
        let Reverse(head) = self.heap.pop()?;
        self.refill = Some(head.source_index());
        Some(Ok(head.into_record()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FederationError;
    use crate::memory::MemoryStore;
    use crate::predicate::Predicate;
    use crate::record::Document;
    use crate::source::SourceQuery;
    use serde_json::{json, Map, Value};

    /// Source that fails to open, or fails after yielding its rows.
    #[derive(Clone)]
    struct Failing {
        rows: Vec<Document>,
        fails_to_open: bool,
        fails_after_rows: bool,
    }

    impl Failing {
        fn on_open() -> BoxedSourceQuery<Document> {
            Box::new(Failing {
                rows: Vec::new(),
                fails_to_open: true,
                fails_after_rows: false,
            })
        }

        fn after(rows: &[(i64, &str)]) -> BoxedSourceQuery<Document> {
            Box::new(Failing {
                rows: rows
                    .iter()
                    .map(|(id, kind)| Document::new(*id, json!({"type": kind})))
                    .collect(),
                fails_to_open: false,
                fails_after_rows: true,
            })
        }
    }

    impl SourceQuery<Document> for Failing {
        fn filter(&self, _predicate: &Predicate) -> BoxedSourceQuery<Document> {
            self.box_clone()
        }

        fn exclude(&self, _predicate: &Predicate) -> BoxedSourceQuery<Document> {
            self.box_clone()
        }

        fn order_by(&self, _ordering: &OrderingSpec<Document>) -> BoxedSourceQuery<Document> {
            self.box_clone()
        }

        fn count(&self) -> FederationResult<usize> {
            Ok(self.rows.len())
        }

        fn get(&self, predicate: &Predicate) -> FederationResult<Document> {
            Err(FederationError::NotFound(predicate.to_string()))
        }

        fn create(&self, _fields: Map<String, Value>) -> FederationResult<Document> {
            Err(FederationError::Backend("read only".to_string()))
        }

        fn iter(&self) -> FederationResult<RecordStream<Document>> {
            if self.fails_to_open {
                return Err(FederationError::Backend("cannot open".to_string()));
            }
            let tail = self
                .fails_after_rows
                .then(|| Err(FederationError::Backend("read failed".to_string())));
            Ok(Box::new(self.rows.clone().into_iter().map(Ok).chain(tail)))
        }

        fn box_clone(&self) -> BoxedSourceQuery<Document> {
            Box::new(self.clone())
        }
    }

    fn assert_fused_after_error(iter: &mut FederatedIter<Document>) {
        assert!(matches!(iter.next(), Some(Err(FederationError::Backend(_)))));
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
    }

    fn store(rows: &[(i64, &str)]) -> MemoryStore<Document> {
        let store = MemoryStore::new();
        for (id, kind) in rows {
            store
                .insert(Document::new(*id, json!({"type": kind})))
                .unwrap();
        }
        store
    }

    fn ordered_registry(
        stores: &[(&str, &MemoryStore<Document>)],
        spec: &OrderingSpec<Document>,
    ) -> SourceRegistry<Document> {
        let mut registry = SourceRegistry::new();
        for (id, store) in stores {
            registry.insert(*id, store.source().order_by(spec));
        }
        registry
    }

    #[test]
    fn test_merge_interleaves_sorted_sources() {
        let hot = store(&[(1, "type4"), (4, "type2")]);
        let cold = store(&[(2, "type3"), (3, "type1")]);
        let spec = OrderingSpec::resolve(&["type", "pk"]).unwrap();
        let registry = ordered_registry(&[("default", &hot), ("cold", &cold)], &spec);

        let ids: Vec<i64> = FederatedIter::new(&registry, &spec)
            .map(|r| r.unwrap().id)
            .collect();
        assert_eq!(ids, vec![3, 4, 2, 1]);
    }

    #[test]
    fn test_concat_keeps_registry_order() {
        let hot = store(&[(5, "a"), (1, "b")]);
        let cold = store(&[(2, "c")]);
        let mut registry = SourceRegistry::new();
        registry.insert("default", hot.source());
        registry.insert("cold", cold.source());

        let ids: Vec<i64> = FederatedIter::new(&registry, &OrderingSpec::none())
            .map(|r| r.unwrap().id)
            .collect();
        assert_eq!(ids, vec![5, 1, 2]);
    }

    #[test]
    fn test_concat_opens_sources_on_demand() {
        let hot = store(&[(1, "a"), (2, "b")]);
        let cold = store(&[(3, "c")]);
        let mut registry = SourceRegistry::new();
        registry.insert("default", hot.source());
        registry.insert("cold", cold.source());

        let mut iter = FederatedIter::new(&registry, &OrderingSpec::none());
        iter.next().unwrap().unwrap();
        iter.next().unwrap().unwrap();
        assert_eq!(cold.records_served(), 0);
        assert_eq!(iter.next().unwrap().unwrap().id, 3);
        assert!(iter.next().is_none());
        assert!(iter.next().is_none());
    }

    #[test]
    fn test_merge_reads_at_most_one_ahead() {
        let hot = store(&[(1, "a"), (2, "c"), (3, "e"), (4, "g")]);
        let cold = store(&[(5, "b"), (6, "d"), (7, "f")]);
        let spec = OrderingSpec::resolve(&["type"]).unwrap();
        let registry = ordered_registry(&[("default", &hot), ("cold", &cold)], &spec);

        let mut iter = FederatedIter::new(&registry, &spec);
        assert_eq!(hot.records_served() + cold.records_served(), 0);

        assert_eq!(iter.next().unwrap().unwrap().id, 1);
        assert_eq!((hot.records_served(), cold.records_served()), (1, 1));

        assert_eq!(iter.next().unwrap().unwrap().id, 5);
        assert_eq!((hot.records_served(), cold.records_served()), (2, 1));
        drop(iter);
        assert_eq!((hot.records_served(), cold.records_served()), (2, 1));
    }

    #[test]
    fn test_merge_skips_empty_sources() {
        let empty = store(&[]);
        let cold = store(&[(2, "b"), (1, "a")]);
        let spec = OrderingSpec::resolve(&["type"]).unwrap();
        let registry = ordered_registry(&[("default", &empty), ("cold", &cold)], &spec);

        let ids: Vec<i64> = FederatedIter::new(&registry, &spec)
            .map(|r| r.unwrap().id)
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_empty_registry_yields_nothing() {
        let registry = SourceRegistry::<Document>::new();
        let spec = OrderingSpec::resolve(&["type"]).unwrap();
        assert_eq!(FederatedIter::new(&registry, &spec).count(), 0);
        assert_eq!(FederatedIter::new(&registry, &OrderingSpec::none()).count(), 0);
    }

    #[test]
    fn test_merge_open_error_while_priming() {
        let hot = store(&[(1, "a")]);
        let spec = OrderingSpec::resolve(&["type"]).unwrap();
        let mut registry = ordered_registry(&[("default", &hot)], &spec);
        registry.insert("cold", Failing::on_open());

        let mut iter = FederatedIter::new(&registry, &spec);
        assert_fused_after_error(&mut iter);
    }

    #[test]
    fn test_merge_read_error_while_priming() {
        let hot = store(&[(1, "a")]);
        let spec = OrderingSpec::resolve(&["type"]).unwrap();
        let mut registry = ordered_registry(&[("default", &hot)], &spec);
        registry.insert("cold", Failing::after(&[]));

        let mut iter = FederatedIter::new(&registry, &spec);
        assert_fused_after_error(&mut iter);
    }

    #[test]
    fn test_merge_error_during_refill() {
        let cold = store(&[(2, "b"), (3, "c")]);
        let spec = OrderingSpec::resolve(&["type"]).unwrap();
        let mut registry = SourceRegistry::new();
        registry.insert("default", Failing::after(&[(1, "a")]));
        registry.insert("cold", cold.source().order_by(&spec));

        let mut iter = FederatedIter::new(&registry, &spec);
        assert_eq!(iter.next().unwrap().unwrap().id, 1);
        assert_fused_after_error(&mut iter);
        assert_eq!(cold.records_served(), 1);
    }

    #[test]
    fn test_concat_open_error() {
        let hot = store(&[(1, "a")]);
        let mut registry = SourceRegistry::new();
        registry.insert("default", hot.source());
        registry.insert("cold", Failing::on_open());
        registry.insert("archive", store(&[(9, "z")]).source());

        let mut iter = FederatedIter::new(&registry, &OrderingSpec::none());
        assert_eq!(iter.next().unwrap().unwrap().id, 1);
        assert_fused_after_error(&mut iter);
    }
}
