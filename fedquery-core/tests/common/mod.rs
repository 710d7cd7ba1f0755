//! Common test utilities for federation tests
//!
//! Provides a typed record living in a hot and a cold source, plus helpers
//! to build managers and seed stores.

#![allow(dead_code)]

use std::sync::Arc;

use fedquery_core::value::lookup_path;
use fedquery_core::{
    FederatedManager, FieldAccessor, MemoryProvider, MemoryStore, Record, RecordId,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAction {
    pub id: RecordId,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub detail: Map<String, Value>,
}

impl UserAction {
    pub fn new(id: RecordId, kind: &str) -> Self {
        Self {
            id,
            kind: kind.to_string(),
            detail: Map::new(),
        }
    }
}

impl Record for UserAction {
    const SOURCES: &'static [&'static str] = &["default", "db_cold"];

    fn pk(&self) -> RecordId {
        self.id
    }

    fn field_accessor(name: &str) -> Option<FieldAccessor<Self>> {
        match name {
            "type" => Some(Arc::new(|a: &UserAction| json!(a.kind))),
            "detail" => Some(Arc::new(|a: &UserAction| Value::Object(a.detail.clone()))),
            _ => {
                let path = name.strip_prefix("detail.")?.to_string();
                Some(Arc::new(move |a: &UserAction| {
                    lookup_path(&a.detail, &path).cloned().unwrap_or(Value::Null)
                }))
            }
        }
    }
}

pub struct Fixture {
    pub manager: FederatedManager<UserAction>,
    pub hot: MemoryStore<UserAction>,
    pub cold: MemoryStore<UserAction>,
}

pub fn create_fixture() -> Fixture {
    let hot = MemoryStore::new();
    let cold = MemoryStore::new();
    let mut provider = MemoryProvider::new();
    provider.add_store("default", hot.clone());
    provider.add_store("db_cold", cold.clone());
    Fixture {
        manager: FederatedManager::new(provider),
        hot,
        cold,
    }
}

/// Hot: 1 type4, 4 type2. Cold: 2 type3, 3 type1.
pub fn create_ordered_fixture() -> Fixture {
    let fixture = create_fixture();
    fixture.hot.insert(UserAction::new(1, "type4")).unwrap();
    fixture.cold.insert(UserAction::new(2, "type3")).unwrap();
    fixture.cold.insert(UserAction::new(3, "type1")).unwrap();
    fixture.hot.insert(UserAction::new(4, "type2")).unwrap();
    fixture
}

pub fn fields(kind: &str) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("type".to_string(), json!(kind));
    fields
}
