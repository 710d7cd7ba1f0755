//! SQLite Backend
//!
//! Each source is one SQLite database file. Records keep their primary key
//! in an integer column and the rest of their fields as JSON, so any
//! `Record` type can be stored without a schema of its own.

mod source;
mod sql;
mod store;

pub use source::SqliteSource;
pub use sql::{compile_ordering, compile_predicate, to_sql_value, SqlFilter};
pub use store::{SqliteStore, DEFAULT_PAGE_SIZE};

use fedquery_core::{BoxedSourceQuery, FederationError, FederationResult, Record, SourceProvider};

use crate::config::Config;

/// Named SQLite stores, one per source id, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct SqliteProvider {
    stores: Vec<(String, SqliteStore)>,
}

impl SqliteProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open every source declared in `config`.
    pub fn from_config(config: &Config) -> FederationResult<Self> {
        let mut provider = Self::new();
        for source in &config.sources {
            let path = config.source_path(source);
            let store = SqliteStore::open(&path)?.with_page_size(config.page_size);
            provider.add_store(&source.name, store);
        }
        tracing::debug!("Opened {} SQLite sources", provider.stores.len());
        Ok(provider)
    }

    pub fn add_store(&mut self, source_id: &str, store: SqliteStore) {
        self.stores.retain(|(id, _)| id != source_id);
        self.stores.push((source_id.to_string(), store));
    }

    pub fn store(&self, source_id: &str) -> Option<&SqliteStore> {
        self.stores
            .iter()
            .find(|(id, _)| id == source_id)
            .map(|(_, store)| store)
    }

    /// Source ids in declaration order.
    pub fn source_ids(&self) -> Vec<String> {
        self.stores.iter().map(|(id, _)| id.clone()).collect()
    }
}

impl<R: Record> SourceProvider<R> for SqliteProvider {
    fn handle(&self, source_id: &str) -> FederationResult<BoxedSourceQuery<R>> {
        self.store(source_id)
            .map(|store| store.source::<R>())
            .ok_or_else(|| FederationError::UnknownSource(source_id.to_string()))
    }
}
