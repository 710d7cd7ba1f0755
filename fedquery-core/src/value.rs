//! JSON value helpers shared by predicates, ordering and backends.
//!
//! - lookup_path: Dotted path access into a JSON object
//! - values_equal: Compare two JSON values for equality
//! - compare_values: Total order over JSON values
//! - safe_regex: Compile a bounded regex

use std::cmp::Ordering;

use regex::Regex;
use serde_json::{Map, Value};

/// Walk a dot-separated path (`detail.origin`) through nested objects.
///
/// `None` when any segment is missing or a non-object is reached early.
pub fn lookup_path<'a>(fields: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = fields.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Compare two JSON values for equality.
///
/// Numbers compare numerically, so `1` equals `1.0`.
#[inline]
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(_), Value::Number(_)) => compare_values(left, right) == Ordering::Equal,
        _ => left == right,
    }
}

/// Rank of a JSON value kind: null < bool < number < string < array < object.
pub fn kind_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Compare two JSON values.
///
/// Values of different kinds order by kind rank. Arrays and objects compare
/// by their serialized text, which is how SQLite orders the JSON text
/// `json_extract` returns for them.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        (Value::Number(a), Value::Number(b)) => match (a.as_i64(), b.as_i64()) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => {
                let a_f64 = a.as_f64().unwrap_or(0.0);
                let b_f64 = b.as_f64().unwrap_or(0.0);
                a_f64.total_cmp(&b_f64)
            }
        },
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            a.to_string().cmp(&b.to_string())
        }
        _ => kind_rank(a).cmp(&kind_rank(b)),
    }
}

/// Safely compile a regex with size limits to prevent ReDoS attacks.
pub fn safe_regex(pattern: &str) -> Result<Regex, regex::Error> {
    if pattern.len() > 1000 {
        return Err(regex::Error::Syntax(
            "Pattern too long (max 1000 chars)".to_string(),
        ));
    }
    regex::RegexBuilder::new(pattern)
        .size_limit(1 << 20)
        .build()
}
