//! Ordering keys and the comparable wrapper used by the merge.
//!
//! An `OrderingSpec` resolves field names to accessors once; every clone
//! shares the same key list, so all records taking part in one merge are
//! compared by the same keys.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{FederationError, FederationResult};
use crate::record::{resolve_accessor, FieldAccessor, Record};
use crate::value::compare_values;

/// One resolved ordering field.
pub struct OrderKey<R> {
    field: String,
    descending: bool,
    accessor: FieldAccessor<R>,
}

impl<R> OrderKey<R> {
    /// Field name without the `-` prefix.
    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn is_descending(&self) -> bool {
        self.descending
    }

    pub fn value(&self, record: &R) -> Value {
        (self.accessor)(record)
    }
}

/// Ordered list of ordering fields; empty means "no ordering".
pub struct OrderingSpec<R> {
    keys: Arc<Vec<OrderKey<R>>>,
}

impl<R> Clone for OrderingSpec<R> {
    fn clone(&self) -> Self {
        Self {
            keys: Arc::clone(&self.keys),
        }
    }
}

impl<R> Default for OrderingSpec<R> {
    fn default() -> Self {
        Self {
            keys: Arc::new(Vec::new()),
        }
    }
}

impl<R> fmt::Debug for OrderingSpec<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.fields()).finish()
    }
}

impl<R> OrderingSpec<R> {
    /// The empty spec.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn keys(&self) -> &[OrderKey<R>] {
        &self.keys
    }

    /// Field names as given, descending ones prefixed with `-`.
    pub fn fields(&self) -> Vec<String> {
        self.keys
            .iter()
            .map(|key| {
                if key.descending {
                    format!("-{}", key.field)
                } else {
                    key.field.clone()
                }
            })
            .collect()
    }

    /// True when both specs share one key list.
    pub fn shares_keys(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.keys, &other.keys)
    }
}

impl<R: Record> OrderingSpec<R> {
    /// Resolve field names (optionally `-`-prefixed) into accessors.
    pub fn resolve<S: AsRef<str>>(fields: &[S]) -> FederationResult<Self> {
        let mut keys = Vec::with_capacity(fields.len());
        for raw in fields {
            let raw = raw.as_ref().trim();
            let (field, descending) = match raw.strip_prefix('-') {
                Some(rest) => (rest, true),
                None => (raw, false),
            };
            if field.is_empty() {
                return Err(FederationError::UnknownField(raw.to_string()));
            }
            let accessor = resolve_accessor::<R>(field)
                .ok_or_else(|| FederationError::UnknownField(field.to_string()))?;
            keys.push(OrderKey {
                field: field.to_string(),
                descending,
                accessor,
            });
        }
        Ok(Self {
            keys: Arc::new(keys),
        })
    }

    /// Compare two records: ordering fields in turn (nulls first, reversed
    /// for descending fields), then ascending primary key.
    pub fn compare(&self, a: &R, b: &R) -> Ordering {
        for key in self.keys.iter() {
            let ordering = compare_values(&key.value(a), &key.value(b));
            let ordering = if key.descending {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        a.pk().cmp(&b.pk())
    }
}

/// A record pulled from one source, ordered by the merge's shared spec.
pub struct OrderedRecordRef<R> {
    source_index: usize,
    source_id: Arc<str>,
    ordering: OrderingSpec<R>,
    record: R,
}

impl<R: Record> OrderedRecordRef<R> {
    pub fn new(
        source_index: usize,
        source_id: Arc<str>,
        ordering: OrderingSpec<R>,
        record: R,
    ) -> Self {
        Self {
            source_index,
            source_id,
            ordering,
            record,
        }
    }

    pub fn source_index(&self) -> usize {
        self.source_index
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn record(&self) -> &R {
        &self.record
    }

    pub fn into_record(self) -> R {
        self.record
    }
}

impl<R: Record> fmt::Debug for OrderedRecordRef<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedRecordRef")
            .field("source_id", &self.source_id)
            .field("ordering", &self.ordering)
            .field("record", &self.record)
            .finish()
    }
}

impl<R: Record> Ord for OrderedRecordRef<R> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ordering
            .compare(&self.record, &other.record)
            .then_with(|| self.source_index.cmp(&other.source_index))
    }
}

impl<R: Record> PartialOrd for OrderedRecordRef<R> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<R: Record> PartialEq for OrderedRecordRef<R> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<R: Record> Eq for OrderedRecordRef<R> {}
