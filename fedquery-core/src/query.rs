//! Federated queryset.
//!
//! A `FederatedQuery` wraps one handle per source. Transformations fan out
//! to every handle and return a new query; terminal operations run against
//! each source and combine the answers.

use std::fmt;

use serde_json::{Map, Value};

use crate::error::{FederationError, FederationResult};
use crate::merge::FederatedIter;
use crate::ordering::OrderingSpec;
use crate::predicate::Predicate;
use crate::record::Record;
use crate::registry::SourceRegistry;
use crate::source::BoxedSourceQuery;

/// Queryset spanning every registered source.
pub struct FederatedQuery<R: Record> {
    registry: SourceRegistry<R>,
    ordering: OrderingSpec<R>,
    default_source: Option<String>,
}

impl<R: Record> FederatedQuery<R> {
    /// Query over `registry` in registry order.
    pub fn new(registry: SourceRegistry<R>) -> Self {
        Self {
            registry,
            ordering: OrderingSpec::none(),
            default_source: None,
        }
    }

    /// Route `create` to `source_id` instead of the conventional default.
    pub fn with_default_source(mut self, source_id: impl Into<String>) -> Self {
        self.default_source = Some(source_id.into());
        self
    }

    pub fn registry(&self) -> &SourceRegistry<R> {
        &self.registry
    }

    pub fn ordering(&self) -> &OrderingSpec<R> {
        &self.ordering
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.registry.source_ids()
    }

    fn derive(&self, registry: SourceRegistry<R>, ordering: OrderingSpec<R>) -> Self {
        Self {
            registry,
            ordering,
            default_source: self.default_source.clone(),
        }
    }

    // === Transformations ===

    /// Independent copy of this query.
    pub fn all(&self) -> Self {
        self.clone()
    }

    pub fn filter(&self, predicate: Predicate) -> Self {
        tracing::trace!("Fan-out filter {} to {:?}", predicate, self.source_ids());
        let registry = self.registry.map(|handle| handle.filter(&predicate));
        self.derive(registry, self.ordering.clone())
    }

    pub fn exclude(&self, predicate: Predicate) -> Self {
        tracing::trace!("Fan-out exclude {} to {:?}", predicate, self.source_ids());
        let registry = self.registry.map(|handle| handle.exclude(&predicate));
        self.derive(registry, self.ordering.clone())
    }

    /// Order by `fields` (prefix `-` for descending); the primary key
    /// always breaks ties. An empty list clears the ordering.
    pub fn order_by<S: AsRef<str>>(&self, fields: &[S]) -> FederationResult<Self> {
        let ordering = OrderingSpec::resolve(fields)?;
        tracing::trace!("Fan-out order_by {:?} to {:?}", ordering, self.source_ids());
        let registry = self.registry.map(|handle| handle.order_by(&ordering));
        Ok(self.derive(registry, ordering))
    }

    /// The raw handle of one source, bypassing federation.
    pub fn using(&self, source_id: &str) -> FederationResult<BoxedSourceQuery<R>> {
        self.registry
            .require(source_id)
            .map(|handle| handle.box_clone())
    }

    // === Terminal operations ===

    pub fn count(&self) -> FederationResult<usize> {
        let mut total = 0;
        for (_, handle) in self.registry.iter() {
            total += handle.count()?;
        }
        tracing::debug!("Federated count over {} sources: {}", self.registry.len(), total);
        Ok(total)
    }

    /// Per-source counts, in registry order.
    pub fn count_by_source(&self) -> FederationResult<Vec<(String, usize)>> {
        self.registry
            .iter()
            .map(|(source_id, handle)| Ok((source_id.to_string(), handle.count()?)))
            .collect()
    }

    pub fn exists(&self) -> FederationResult<bool> {
        for (source_id, handle) in self.registry.iter() {
            if handle.exists()? {
                tracing::trace!("Source '{}' has matching records", source_id);
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// First record in iteration order, `None` when nothing matches.
    pub fn first(&self) -> FederationResult<Option<R>> {
        self.iter().next().transpose()
    }

    /// The one record matching `predicate` across all sources.
    ///
    /// A source reporting several matches fails the whole lookup with its own
    /// error; matches in more than one source fail with
    /// `MultipleResultsFound`.
    pub fn get(&self, predicate: Predicate) -> FederationResult<R> {
        let mut found: Vec<(&str, R)> = Vec::new();
        for (source_id, handle) in self.registry.iter() {
            match handle.get(&predicate) {
                Ok(record) => found.push((source_id, record)),
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
        match found.len() {
            0 => Err(FederationError::NotFound(format!(
                "{} in sources {:?}",
                predicate,
                self.source_ids()
            ))),
            1 => Ok(found.remove(0).1),
            _ => {
                let sources: Vec<&str> = found.iter().map(|(id, _)| *id).collect();
                Err(FederationError::MultipleResultsFound(format!(
                    "{} matched in sources {:?}",
                    predicate, sources
                )))
            }
        }
    }

    /// Insert into the default source.
    pub fn create(&self, fields: Map<String, Value>) -> FederationResult<R> {
        let (source_id, handle) = self.registry.default_source(self.default_source.as_deref())?;
        tracing::debug!("Creating record in source '{}'", source_id);
        handle.create(fields)
    }

    /// Lazy iteration; see [`FederatedIter`].
    pub fn iter(&self) -> FederatedIter<R> {
        FederatedIter::new(&self.registry, &self.ordering)
    }

    /// Collect the full iteration, stopping at the first error.
    pub fn to_vec(&self) -> FederationResult<Vec<R>> {
        self.iter().collect()
    }
}

impl<R: Record> Clone for FederatedQuery<R> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            ordering: self.ordering.clone(),
            default_source: self.default_source.clone(),
        }
    }
}

impl<R: Record> fmt::Debug for FederatedQuery<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FederatedQuery")
            .field("sources", &self.source_ids())
            .field("ordering", &self.ordering)
            .field("default_source", &self.default_source)
            .finish()
    }
}

impl<'a, R: Record> IntoIterator for &'a FederatedQuery<R> {
    type Item = FederationResult<R>;
    type IntoIter = FederatedIter<R>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
