//! Query factory for a federated record type.

use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::FederationResult;
use crate::predicate::Predicate;
use crate::query::FederatedQuery;
use crate::record::Record;
use crate::registry::SourceRegistry;
use crate::source::{BoxedSourceQuery, SourceProvider};

/// Builds fresh [`FederatedQuery`] values over the sources a record type
/// lives in.
///
/// The source list defaults to [`Record::SOURCES`] and is read each time a
/// query is built; handles come from the [`SourceProvider`].
pub struct FederatedManager<R: Record> {
    provider: Arc<dyn SourceProvider<R>>,
    sources: Vec<String>,
    default_source: Option<String>,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> Clone for FederatedManager<R> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            sources: self.sources.clone(),
            default_source: self.default_source.clone(),
            _record: PhantomData,
        }
    }
}

impl<R: Record> FederatedManager<R> {
    pub fn new(provider: impl SourceProvider<R> + 'static) -> Self {
        Self::from_shared(Arc::new(provider))
    }

    pub fn from_shared(provider: Arc<dyn SourceProvider<R>>) -> Self {
        Self {
            provider,
            sources: R::SOURCES.iter().map(|s| s.to_string()).collect(),
            default_source: None,
            _record: PhantomData,
        }
    }

    /// Replace the declared source list.
    pub fn with_sources<S: AsRef<str>>(mut self, sources: &[S]) -> Self {
        self.sources = sources.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    /// Route `create` on built queries to `source_id`.
    pub fn with_default_source(mut self, source_id: impl Into<String>) -> Self {
        self.default_source = Some(source_id.into());
        self
    }

    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// A new query with one base handle per declared source.
    pub fn get_queryset(&self) -> FederationResult<FederatedQuery<R>> {
        let mut registry = SourceRegistry::new();
        for source_id in &self.sources {
            registry.insert(source_id.as_str(), self.provider.handle(source_id)?);
        }
        tracing::debug!("Built federated query over {:?}", self.sources);
        let query = FederatedQuery::new(registry);
        Ok(match &self.default_source {
            Some(source_id) => query.with_default_source(source_id.clone()),
            None => query,
        })
    }

    // Shortcuts mirroring the query API.

    pub fn all(&self) -> FederationResult<FederatedQuery<R>> {
        self.get_queryset()
    }

    pub fn filter(&self, predicate: Predicate) -> FederationResult<FederatedQuery<R>> {
        Ok(self.get_queryset()?.filter(predicate))
    }

    pub fn exclude(&self, predicate: Predicate) -> FederationResult<FederatedQuery<R>> {
        Ok(self.get_queryset()?.exclude(predicate))
    }

    pub fn order_by<S: AsRef<str>>(&self, fields: &[S]) -> FederationResult<FederatedQuery<R>> {
        self.get_queryset()?.order_by(fields)
    }

    pub fn using(&self, source_id: &str) -> FederationResult<BoxedSourceQuery<R>> {
        self.get_queryset()?.using(source_id)
    }

    pub fn count(&self) -> FederationResult<usize> {
        self.get_queryset()?.count()
    }

    pub fn exists(&self) -> FederationResult<bool> {
        self.get_queryset()?.exists()
    }

    pub fn first(&self) -> FederationResult<Option<R>> {
        self.get_queryset()?.first()
    }

    pub fn get(&self, predicate: Predicate) -> FederationResult<R> {
        self.get_queryset()?.get(predicate)
    }

    pub fn create(&self, fields: Map<String, Value>) -> FederationResult<R> {
        self.get_queryset()?.create(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FederationError;
    use crate::memory::MemoryProvider;
    use crate::record::Document;
    use crate::source::SourceQuery;
    use serde_json::json;

    #[test]
    fn test_default_declaration_is_single_default_source() {
        let provider = MemoryProvider::<Document>::with_sources(&["default"]);
        let manager = FederatedManager::new(provider);
        assert_eq!(manager.sources(), &["default".to_string()]);
        assert_eq!(manager.get_queryset().unwrap().source_ids(), vec!["default"]);
    }

    #[test]
    fn test_unknown_declared_source_fails() {
        let provider = MemoryProvider::<Document>::with_sources(&["default"]);
        let manager = FederatedManager::new(provider).with_sources(&["default", "cold"]);
        assert!(matches!(
            manager.get_queryset(),
            Err(FederationError::UnknownSource(id)) if id == "cold"
        ));
    }

    #[test]
    fn test_each_queryset_is_fresh() {
        let provider = MemoryProvider::<Document>::with_sources(&["default", "cold"]);
        let cold = provider.store("cold").unwrap().clone();
        let manager = FederatedManager::new(provider).with_sources(&["default", "cold"]);

        let before = manager.filter(Predicate::eq("type", "cold")).unwrap();
        cold.insert(Document::new(1, json!({"type": "cold"}))).unwrap();
        assert_eq!(before.count().unwrap(), 1);
        assert_eq!(manager.count().unwrap(), 1);
        assert_eq!(manager.using("cold").unwrap().count().unwrap(), 1);
        assert_eq!(manager.using("default").unwrap().count().unwrap(), 0);
    }

    #[test]
    fn test_configured_default_source_applies_to_create() {
        let provider = MemoryProvider::<Document>::with_sources(&["hot", "cold"]);
        let cold = provider.store("cold").unwrap().clone();
        let manager = FederatedManager::new(provider).with_sources(&["hot", "cold"]);

        let mut fields = Map::new();
        fields.insert("type".to_string(), json!("cold"));
        assert!(matches!(
            manager.create(fields.clone()),
            Err(FederationError::NoDefaultSource(_))
        ));

        let manager = manager.with_default_source("cold");
        let created = manager.create(fields).unwrap();
        assert_eq!(created.id, 1);
        assert_eq!(cold.len(), 1);
    }
}
