//! `SourceQuery` over a SQLite store.
//!
//! Predicates and orderings are compiled when a terminal method runs, so a
//! handle always reflects the table at that moment.

use std::collections::VecDeque;

use fedquery_core::{
    BoxedSourceQuery, FederationError, FederationResult, OrderingSpec, Predicate, Record,
    RecordStream, SourceQuery,
};
use serde_json::{Map, Value};

use super::sql::{compile_ordering, compile_predicate, SqlFilter};
use super::store::SqliteStore;

/// Lazily composed query over one `SqliteStore`.
pub struct SqliteSource<R> {
    store: SqliteStore,
    predicate: Predicate,
    ordering: OrderingSpec<R>,
}

impl<R: Record> SqliteSource<R> {
    pub fn new(store: SqliteStore) -> Self {
        Self {
            store,
            predicate: Predicate::All,
            ordering: OrderingSpec::none(),
        }
    }

    fn derive(&self, predicate: Predicate, ordering: OrderingSpec<R>) -> BoxedSourceQuery<R> {
        Box::new(SqliteSource {
            store: self.store.clone(),
            predicate,
            ordering,
        })
    }

    fn compiled(&self, predicate: &Predicate) -> FederationResult<SqlFilter> {
        compile_predicate::<R>(predicate)
    }
}

impl<R: Record> SourceQuery<R> for SqliteSource<R> {
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
        self.store.count(&self.compiled(&self.predicate)?)
    }

    fn exists(&self) -> FederationResult<bool> {
        self.store.exists(&self.compiled(&self.predicate)?)
    }

    fn get(&self, predicate: &Predicate) -> FederationResult<R> {
        let combined = self.predicate.clone().and(predicate.clone());
        let filter = self.compiled(&combined)?;
        let mut matched: Vec<R> = self.store.select(&filter, "id ASC", 2, 0)?;
        match matched.len() {
            0 => Err(FederationError::NotFound(format!(
                "{} in {}",
                combined,
                self.store.location()
            ))),
            1 => Ok(matched.remove(0)),
            _ => Err(FederationError::MultipleResultsFound(format!(
                "{} records match {} in {}",
                self.store.count(&filter)?,
                combined,
                self.store.location()
            ))),
        }
    }

    fn create(&self, fields: Map<String, Value>) -> FederationResult<R> {
        self.store.create(fields)
    }

    fn iter(&self) -> FederationResult<RecordStream<R>> {
        let filter = self.compiled(&self.predicate)?;
        let order = compile_ordering(&self.ordering)?;
        tracing::trace!(
            "SQLite cursor on {}: WHERE {} ORDER BY {}",
            self.store.location(),
            filter.clause,
            order
        );
        Ok(Box::new(SqliteCursor {
            page_size: self.store.page_size(),
            store: self.store.clone(),
            filter,
            order,
            offset: 0,
            buffer: VecDeque::new(),
            exhausted: false,
        }))
    }

    fn box_clone(&self) -> BoxedSourceQuery<R> {
        self.derive(self.predicate.clone(), self.ordering.clone())
    }
}

/// Paged `LIMIT`/`OFFSET` cursor; no page is read before it is needed.
struct SqliteCursor<R> {
    store: SqliteStore,
    filter: SqlFilter,
    order: String,
    page_size: usize,
    offset: usize,
    buffer: VecDeque<R>,
    exhausted: bool,
}

impl<R: Record> Iterator for SqliteCursor<R> {
    type Item = FederationResult<R>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            match self
                .store
                .select::<R>(&self.filter, &self.order, self.page_size, self.offset)
            {
                Ok(page) => {
                    self.store.note_page_read();
                    self.exhausted = page.len() < self.page_size;
                    self.offset += page.len();
                    self.buffer.extend(page);
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}
