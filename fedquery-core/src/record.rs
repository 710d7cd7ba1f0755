//! Record model.
//!
//! A record is anything a source can persist and hand back: it carries an
//! integer primary key and exposes its comparable attributes through typed
//! accessors, resolved by name once and then called per comparison.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::FederationResult;
use crate::value::lookup_path;

/// Primary key type shared by every backend.
pub type RecordId = i64;

/// Extracts one named attribute from a record.
pub type FieldAccessor<R> = Arc<dyn Fn(&R) -> Value + Send + Sync>;

/// Field name that always resolves to the primary key.
pub const PK_ALIAS: &str = "pk";

/// A record type that can be federated across sources.
pub trait Record:
    Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Serialized name of the primary key field.
    const PK_FIELD: &'static str = "id";

    /// Sources this record type lives in, in iteration order.
    const SOURCES: &'static [&'static str] = &["default"];

    /// Primary key of this record.
    fn pk(&self) -> RecordId;

    /// Accessor for a named attribute, `None` if the type has no such field.
    ///
    /// The primary key does not need to be handled here; see [`resolve_accessor`].
    fn field_accessor(name: &str) -> Option<FieldAccessor<Self>>;
}

/// Resolve a field name to an accessor, mapping `pk` and the primary key
/// field onto [`Record::pk`].
pub fn resolve_accessor<R: Record>(name: &str) -> Option<FieldAccessor<R>> {
    if name == PK_ALIAS || name == R::PK_FIELD {
        return Some(Arc::new(|record: &R| Value::from(record.pk())));
    }
    R::field_accessor(name)
}

/// Read a named attribute, `Value::Null` for unknown fields.
pub fn field_value<R: Record>(record: &R, name: &str) -> Value {
    resolve_accessor::<R>(name)
        .map(|accessor| accessor(record))
        .unwrap_or(Value::Null)
}

/// Build a record from creation fields and a freshly assigned primary key.
pub fn record_from_fields<R: Record>(
    pk: RecordId,
    mut fields: Map<String, Value>,
) -> FederationResult<R> {
    fields.remove(PK_ALIAS);
    fields.insert(R::PK_FIELD.to_string(), Value::from(pk));
    Ok(serde_json::from_value(Value::Object(fields))?)
}

/// Serialize a record into its field map with the primary key removed.
pub fn record_to_fields<R: Record>(record: &R) -> FederationResult<Map<String, Value>> {
    match serde_json::to_value(record)? {
        Value::Object(mut map) => {
            map.remove(R::PK_FIELD);
            Ok(map)
        }
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            Ok(map)
        }
    }
}

/// Schemaless JSON record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: RecordId,

    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Document {
    /// Create a document; a nested `id` inside `data` is dropped.
    pub fn new(id: RecordId, data: Value) -> Self {
        let mut data = match data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        data.remove("id");
        Self { id, data }
    }

    /// Read a dot-separated path, `Value::Null` when absent.
    pub fn get(&self, path: &str) -> Value {
        lookup_path(&self.data, path).cloned().unwrap_or(Value::Null)
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, Value::Object(self.data.clone()))
    }
}

impl Record for Document {
    fn pk(&self) -> RecordId {
        self.id
    }

    fn field_accessor(name: &str) -> Option<FieldAccessor<Self>> {
        let path = name.to_string();
        Some(Arc::new(move |doc: &Document| doc.get(&path)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Reading {
        id: RecordId,
        sensor: String,
    }

    impl Record for Reading {
        fn pk(&self) -> RecordId {
            self.id
        }

        fn field_accessor(name: &str) -> Option<FieldAccessor<Self>> {
            match name {
                "sensor" => Some(Arc::new(|r: &Reading| json!(r.sensor))),
                _ => None,
            }
        }
    }

    #[test]
    fn test_document_roundtrip_keeps_id_out_of_data() {
        let doc = Document::new(7, json!({"id": 99, "type": "hot"}));
        assert_eq!(doc.id, 7);
        assert!(!doc.data.contains_key("id"));

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value, json!({"id": 7, "type": "hot"}));
        let back: Document = serde_json::from_value(value).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_document_nested_get() {
        let doc = Document::new(1, json!({"detail": {"origin": "sensor"}}));
        assert_eq!(doc.get("detail.origin"), json!("sensor"));
        assert_eq!(doc.get("detail.missing"), Value::Null);
        assert_eq!(doc.get("missing"), Value::Null);
    }

    #[test]
    fn test_resolve_accessor_pk_alias() {
        let reading = Reading {
            id: 42,
            sensor: "north".to_string(),
        };
        let pk = resolve_accessor::<Reading>("pk").unwrap();
        let id = resolve_accessor::<Reading>("id").unwrap();
        assert_eq!(pk(&reading), json!(42));
        assert_eq!(id(&reading), json!(42));
        assert!(resolve_accessor::<Reading>("colour").is_none());
        assert_eq!(field_value(&reading, "sensor"), json!("north"));
        assert_eq!(field_value(&reading, "colour"), Value::Null);
    }

    #[test]
    fn test_record_from_fields_assigns_pk() {
        let mut fields = Map::new();
        fields.insert("sensor".to_string(), json!("south"));
        fields.insert("pk".to_string(), json!(1000));
        let reading: Reading = record_from_fields(3, fields).unwrap();
        assert_eq!(reading.id, 3);
        assert_eq!(reading.sensor, "south");

        let fields = record_to_fields(&reading).unwrap();
        assert_eq!(Value::Object(fields), json!({"sensor": "south"}));
    }

    #[test]
    fn test_record_from_fields_rejects_bad_shape() {
        let fields = Map::new();
        let result: FederationResult<Reading> = record_from_fields(1, fields);
        assert!(result.is_err());
    }
}
