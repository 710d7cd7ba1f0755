//! Per-source query handles.
//!
//! Implement [`SourceQuery`] to let a backend take part in a federation.
//! Handles are values: `filter`, `exclude` and `order_by` return new handles
//! and never run anything. Terminal methods and `iter` execute against the
//! backend each time they are called.

use serde_json::{Map, Value};

use crate::error::FederationResult;
use crate::ordering::OrderingSpec;
use crate::predicate::Predicate;
use crate::record::Record;

/// Lazily produced records of one source.
pub type RecordStream<R> = Box<dyn Iterator<Item = FederationResult<R>> + Send>;

/// Owned, type-erased source handle.
pub type BoxedSourceQuery<R> = Box<dyn SourceQuery<R>>;

/// Lazily composable query over a single source.
pub trait SourceQuery<R: Record>: Send + Sync {
    /// Narrow to records matching `predicate`.
    fn filter(&self, predicate: &Predicate) -> BoxedSourceQuery<R>;

    /// Narrow to records not matching `predicate`.
    fn exclude(&self, predicate: &Predicate) -> BoxedSourceQuery<R>;

    /// Replace the ordering; `iter` must then yield records sorted by
    /// `ordering.compare`.
    fn order_by(&self, ordering: &OrderingSpec<R>) -> BoxedSourceQuery<R>;

    /// Number of matching records.
    fn count(&self) -> FederationResult<usize>;

    /// Whether any record matches.
    fn exists(&self) -> FederationResult<bool> {
        Ok(self.count()? > 0)
    }

    /// The single record matching `predicate`.
    ///
    /// Fails with `NotFound` on zero matches and `MultipleResultsFound` on
    /// more than one.
    fn get(&self, predicate: &Predicate) -> FederationResult<R>;

    /// Insert a new record built from `fields`; the source assigns the key.
    fn create(&self, fields: Map<String, Value>) -> FederationResult<R>;

    /// Start a fresh iteration, re-running the query.
    fn iter(&self) -> FederationResult<RecordStream<R>>;

    fn box_clone(&self) -> BoxedSourceQuery<R>;
}

impl<R: Record> Clone for BoxedSourceQuery<R> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Hands out the unfiltered base handle of a named source.
pub trait SourceProvider<R: Record>: Send + Sync {
    /// Fails with `UnknownSource` when `source_id` is not served here.
    fn handle(&self, source_id: &str) -> FederationResult<BoxedSourceQuery<R>>;
}
