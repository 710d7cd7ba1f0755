//! Ordered source registry.

use std::fmt;
use std::sync::Arc;

use crate::error::{FederationError, FederationResult};
use crate::record::Record;
use crate::source::BoxedSourceQuery;

/// Conventional name of the default source.
pub const DEFAULT_SOURCE: &str = "default";

/// Source id to handle, in insertion order.
///
/// Registries are small (one entry per backing store), so lookups are a
/// linear scan over a `Vec`.
pub struct SourceRegistry<R: Record> {
    entries: Vec<(Arc<str>, BoxedSourceQuery<R>)>,
}

impl<R: Record> SourceRegistry<R> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register `handle` under `source_id`.
    ///
    /// Re-registering an id replaces its handle and keeps its position.
    pub fn insert(&mut self, source_id: impl Into<Arc<str>>, handle: BoxedSourceQuery<R>) {
        let source_id = source_id.into();
        match self.entries.iter_mut().find(|(id, _)| *id == source_id) {
            Some(entry) => entry.1 = handle,
            None => self.entries.push((source_id, handle)),
        }
    }

    pub fn get(&self, source_id: &str) -> Option<&BoxedSourceQuery<R>> {
        self.entry(source_id).map(|(_, handle)| handle)
    }

    fn entry(&self, source_id: &str) -> Option<(&str, &BoxedSourceQuery<R>)> {
        self.entries
            .iter()
            .find(|(id, _)| id.as_ref() == source_id)
            .map(|(id, handle)| (id.as_ref(), handle))
    }

    /// Like [`get`](Self::get) but fails with `UnknownSource`.
    pub fn require(&self, source_id: &str) -> FederationResult<&BoxedSourceQuery<R>> {
        self.get(source_id)
            .ok_or_else(|| FederationError::UnknownSource(source_id.to_string()))
    }

    pub fn contains(&self, source_id: &str) -> bool {
        self.get(source_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.entries.iter().map(|(id, _)| id.to_string()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BoxedSourceQuery<R>)> {
        self.entries.iter().map(|(id, handle)| (id.as_ref(), handle))
    }

    /// Shared ids in registry order, for tagging merged records.
    pub(crate) fn shared_ids(&self) -> impl Iterator<Item = Arc<str>> + '_ {
        self.entries.iter().map(|(id, _)| Arc::clone(id))
    }

    /// New registry with every handle replaced by `f(handle)`, same order.
    pub fn map<F>(&self, mut f: F) -> Self
    where
        F: FnMut(&BoxedSourceQuery<R>) -> BoxedSourceQuery<R>,
    {
        Self {
            entries: self
                .entries
                .iter()
                .map(|(id, handle)| (Arc::clone(id), f(handle)))
                .collect(),
        }
    }

    /// Pick the source that receives inserts.
    ///
    /// Order of preference: `explicit`, then [`DEFAULT_SOURCE`], then the
    /// only source of a single-source registry.
    pub fn default_source(
        &self,
        explicit: Option<&str>,
    ) -> FederationResult<(&str, &BoxedSourceQuery<R>)> {
        if self.is_empty() {
            return Err(FederationError::EmptyRegistry);
        }
        if let Some(id) = explicit {
            return self
                .entry(id)
                .ok_or_else(|| FederationError::UnknownSource(id.to_string()));
        }
        if let Some(entry) = self.entry(DEFAULT_SOURCE) {
            return Ok(entry);
        }
        if let [(id, handle)] = self.entries.as_slice() {
            return Ok((id.as_ref(), handle));
        }
        Err(FederationError::NoDefaultSource(format!(
            "no '{}' source among {:?} and none configured",
            DEFAULT_SOURCE,
            self.source_ids()
        )))
    }
}

impl<R: Record> Default for SourceRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> Clone for SourceRegistry<R> {
    fn clone(&self) -> Self {
        self.map(|handle| handle.box_clone())
    }
}

impl<R: Record> fmt::Debug for SourceRegistry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.source_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::record::Document;
    use crate::source::SourceQuery;
    use serde_json::json;

    fn store_with(ids: &[i64]) -> MemoryStore<Document> {
        let store = MemoryStore::new();
        for id in ids {
            store.insert(Document::new(*id, json!({}))).unwrap();
        }
        store
    }

    #[test]
    fn test_insertion_order_is_kept() {
        let mut registry = SourceRegistry::<Document>::new();
        registry.insert("default", store_with(&[1]).source());
        registry.insert("cold", store_with(&[2, 3]).source());
        registry.insert("archive", store_with(&[]).source());
        assert_eq!(registry.source_ids(), vec!["default", "cold", "archive"]);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_reinsert_replaces_in_place() {
        let mut registry = SourceRegistry::<Document>::new();
        registry.insert("default", store_with(&[1]).source());
        registry.insert("cold", store_with(&[2]).source());
        registry.insert("default", store_with(&[4, 5, 6]).source());
        assert_eq!(registry.source_ids(), vec!["default", "cold"]);
        assert_eq!(registry.get("default").unwrap().count().unwrap(), 3);
    }

    #[test]
    fn test_require_unknown_source() {
        let registry = SourceRegistry::<Document>::new();
        assert!(matches!(
            registry.require("cold"),
            Err(FederationError::UnknownSource(id)) if id == "cold"
        ));
    }

    #[test]
    fn test_default_source_resolution() {
        let mut registry = SourceRegistry::<Document>::new();
        assert!(matches!(
            registry.default_source(None),
            Err(FederationError::EmptyRegistry)
        ));

        registry.insert("cold", store_with(&[]).source());
        assert_eq!(registry.default_source(None).unwrap().0, "cold");

        registry.insert("warm", store_with(&[]).source());
        assert!(matches!(
            registry.default_source(None),
            Err(FederationError::NoDefaultSource(_))
        ));
        assert_eq!(registry.default_source(Some("warm")).unwrap().0, "warm");
        assert!(matches!(
            registry.default_source(Some("hot")),
            Err(FederationError::UnknownSource(_))
        ));

        registry.insert("default", store_with(&[]).source());
        assert_eq!(registry.default_source(None).unwrap().0, "default");
    }
}
