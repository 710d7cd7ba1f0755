//! fedquery-core - Storage-independent federated queryset.
//!
//! One logical record type often lives in several independent stores: a hot
//! database and a cold archive, or one shard per region. This crate presents
//! those stores as a single queryset that filters, counts and looks records
//! up across every source, and iterates all of them in one global order
//! without loading any source fully into memory.
//!
//! # Main Components
//!
//! - **SourceQuery**: The per-source handle a backend implements
//! - **SourceRegistry**: Ordered source id to handle mapping
//! - **FederatedQuery**: The composite queryset (filter/exclude/order_by/get/...)
//! - **FederatedIter**: Concatenating or k-way merging lazy iterator
//! - **FederatedManager**: Builds queries over a record type's declared sources
//! - **MemoryStore**: In-memory backend, mainly for tests
//!
//! # Example
//!
//! ```rust
//! use fedquery_core::{Document, FederatedManager, MemoryProvider, Predicate};
//! use serde_json::json;
//!
//! let provider = MemoryProvider::<Document>::with_sources(&["default", "cold"]);
//! provider.store("default").unwrap()
//!     .insert(Document::new(1, json!({"type": "type4"}))).unwrap();
//! provider.store("cold").unwrap()
//!     .insert(Document::new(2, json!({"type": "type1"}))).unwrap();
//!
//! let objects = FederatedManager::new(provider).with_sources(&["default", "cold"]);
//! assert_eq!(objects.count().unwrap(), 2);
//!
//! let ordered = objects.order_by(&["type", "pk"]).unwrap();
//! let ids: Vec<i64> = ordered.iter().map(|r| r.unwrap().id).collect();
//! assert_eq!(ids, vec![2, 1]);
//!
//! let cold = objects.get(Predicate::eq("type", "type1")).unwrap();
//! assert_eq!(cold.id, 2);
//! ```

pub mod error;
pub mod manager;
pub mod memory;
pub mod merge;
pub mod ordering;
pub mod predicate;
pub mod query;
pub mod record;
pub mod registry;
pub mod source;
pub mod value;

// Re-export main types for convenience
pub use error::{FederationError, FederationResult};
pub use manager::FederatedManager;
pub use memory::{MemoryProvider, MemorySource, MemoryStore};
pub use merge::FederatedIter;
pub use ordering::{OrderKey, OrderedRecordRef, OrderingSpec};
pub use predicate::{CompiledPredicate, Predicate};
pub use query::FederatedQuery;
pub use record::{
    field_value, record_from_fields, record_to_fields, resolve_accessor, Document, FieldAccessor,
    Record, RecordId, PK_ALIAS,
};
pub use registry::{SourceRegistry, DEFAULT_SOURCE};
pub use source::{BoxedSourceQuery, RecordStream, SourceProvider, SourceQuery};
