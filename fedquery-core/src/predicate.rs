//! Record predicates.
//!
//! A `Predicate` is handed verbatim to every source; backends either
//! evaluate it in memory with [`Predicate::matches`] or compile it to their
//! own query language. Lookup strings follow the `field__op` convention,
//! e.g. `type__in` or `age__gte`.
//!
//! Scans over many records should [`Predicate::compile`] once and test each
//! record against the resulting [`CompiledPredicate`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FederationError, FederationResult};
use crate::record::{field_value, Record};
use crate::value::{compare_values, safe_regex, values_equal};

/// Boolean condition over named record fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Matches every record
    #[default]
    All,
    Eq(String, Value),
    Ne(String, Value),
    Lt(String, Value),
    Lte(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    In(String, Vec<Value>),
    /// `true` matches null or missing values, `false` matches present ones
    IsNull(String, bool),
    Contains(String, String),
    StartsWith(String, String),
    Regex(String, String),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Eq(field.into(), value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Ne(field.into(), value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Lt(field.into(), value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Lte(field.into(), value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Gt(field.into(), value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Predicate::Gte(field.into(), value.into())
    }

    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Predicate::In(field.into(), values)
    }

    /// Conjunction of `self` and `other`, flattening nested `And`s.
    pub fn and(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::All, p) | (p, Predicate::All) => p,
            (Predicate::And(mut left), Predicate::And(right)) => {
                left.extend(right);
                Predicate::And(left)
            }
            (Predicate::And(mut left), p) => {
                left.push(p);
                Predicate::And(left)
            }
            (p, Predicate::And(mut right)) => {
                right.insert(0, p);
                Predicate::And(right)
            }
            (left, right) => Predicate::And(vec![left, right]),
        }
    }

    pub fn or(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::Or(mut left), p) => {
                left.push(p);
                Predicate::Or(left)
            }
            (left, right) => Predicate::Or(vec![left, right]),
        }
    }

    pub fn negate(self) -> Self {
        match self {
            Predicate::Not(inner) => *inner,
            p => Predicate::Not(Box::new(p)),
        }
    }

    /// Build a predicate from a `field__op` lookup key.
    ///
    /// A key without a recognised suffix is an exact match on the whole key.
    pub fn lookup(key: &str, value: Value) -> FederationResult<Self> {
        let (field, op) = match key.rsplit_once("__") {
            Some((field, op)) if is_lookup_op(op) => (field, op),
            _ => (key, "exact"),
        };
        if field.is_empty() {
            return Err(FederationError::InvalidPredicate(format!(
                "Lookup '{}' has no field name",
                key
            )));
        }
        let field = field.replace("__", ".");

        let predicate = match op {
            "exact" => Predicate::Eq(field, value),
            "ne" => Predicate::Ne(field, value),
            "lt" => Predicate::Lt(field, value),
            "lte" => Predicate::Lte(field, value),
            "gt" => Predicate::Gt(field, value),
            "gte" => Predicate::Gte(field, value),
            "in" => match value {
                Value::Array(values) => Predicate::In(field, values),
                other => {
                    return Err(FederationError::InvalidPredicate(format!(
                        "'{}' expects an array, got {}",
                        key, other
                    )))
                }
            },
            "isnull" => match value {
                Value::Bool(flag) => Predicate::IsNull(field, flag),
                other => {
                    return Err(FederationError::InvalidPredicate(format!(
                        "'{}' expects a boolean, got {}",
                        key, other
                    )))
                }
            },
            "contains" | "startswith" | "regex" => {
                let Value::String(text) = value else {
                    return Err(FederationError::InvalidPredicate(format!(
                        "'{}' expects a string",
                        key
                    )));
                };
                match op {
                    "contains" => Predicate::Contains(field, text),
                    "startswith" => Predicate::StartsWith(field, text),
                    _ => {
                        safe_regex(&text).map_err(|e| {
                            FederationError::InvalidPredicate(format!("'{}': {}", key, e))
                        })?;
                        Predicate::Regex(field, text)
                    }
                }
            }
            _ => unreachable!("is_lookup_op covers every arm"),
        };
        Ok(predicate)
    }

    /// Parse a `field__op=value` expression; the value is read as JSON and
    /// falls back to a plain string.
    pub fn parse(expr: &str) -> FederationResult<Self> {
        let (key, raw) = expr.split_once('=').ok_or_else(|| {
            FederationError::InvalidPredicate(format!("Expected field=value, got '{}'", expr))
        })?;
        let raw = raw.trim();
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        Self::lookup(key.trim(), value)
    }

    /// Evaluate against a record.
    ///
    /// Compiles any regex on every call; see [`Predicate::compile`].
    pub fn matches<R: Record>(&self, record: &R) -> FederationResult<bool> {
        Ok(self.compile()?.matches(record))
    }

    /// Compile every regex pattern up front so matching cannot fail.
    pub fn compile(&self) -> FederationResult<CompiledPredicate> {
        let mut regexes = HashMap::new();
        self.collect_regexes(&mut regexes)?;
        Ok(CompiledPredicate {
            predicate: self.clone(),
            regexes: Arc::new(regexes),
        })
    }

    fn collect_regexes(&self, regexes: &mut HashMap<String, Regex>) -> FederationResult<()> {
        match self {
            Predicate::Regex(field, pattern) => {
                if !regexes.contains_key(pattern) {
                    let regex = safe_regex(pattern).map_err(|e| {
                        FederationError::InvalidPredicate(format!("regex on '{}': {}", field, e))
                    })?;
                    regexes.insert(pattern.clone(), regex);
                }
            }
            Predicate::And(parts) | Predicate::Or(parts) => {
                for part in parts {
                    part.collect_regexes(regexes)?;
                }
            }
            Predicate::Not(inner) => inner.collect_regexes(regexes)?,
            _ => {}
        }
        Ok(())
    }

    fn eval<R: Record>(&self, record: &R, regexes: &HashMap<String, Regex>) -> bool {
        match self {
            Predicate::All => true,
            Predicate::Eq(field, expected) => {
                let actual = field_value(record, field);
                if expected.is_null() {
                    actual.is_null()
                } else {
                    values_equal(&actual, expected)
                }
            }
            Predicate::Ne(field, expected) => {
                let actual = field_value(record, field);
                if expected.is_null() {
                    !actual.is_null()
                } else {
                    actual.is_null() || !values_equal(&actual, expected)
                }
            }
            Predicate::Lt(field, bound) => compare_present(record, field, bound, |o| o.is_lt()),
            Predicate::Lte(field, bound) => compare_present(record, field, bound, |o| o.is_le()),
            Predicate::Gt(field, bound) => compare_present(record, field, bound, |o| o.is_gt()),
            Predicate::Gte(field, bound) => compare_present(record, field, bound, |o| o.is_ge()),
            Predicate::In(field, candidates) => {
                let actual = field_value(record, field);
                !actual.is_null() && candidates.iter().any(|c| values_equal(&actual, c))
            }
            Predicate::IsNull(field, flag) => field_value(record, field).is_null() == *flag,
            Predicate::Contains(field, needle) => match field_value(record, field) {
                Value::String(text) => text.contains(needle.as_str()),
                _ => false,
            },
            Predicate::StartsWith(field, prefix) => match field_value(record, field) {
                Value::String(text) => text.starts_with(prefix.as_str()),
                _ => false,
            },
            Predicate::Regex(field, pattern) => {
                match (regexes.get(pattern), field_value(record, field)) {
                    (Some(regex), Value::String(text)) => regex.is_match(&text),
                    _ => false,
                }
            }
            Predicate::And(parts) => parts.iter().all(|part| part.eval(record, regexes)),
            Predicate::Or(parts) => parts.iter().any(|part| part.eval(record, regexes)),
            Predicate::Not(inner) => !inner.eval(record, regexes),
        }
    }
}

/// A predicate with its regex patterns already built.
#[derive(Debug, Clone)]
pub struct CompiledPredicate {
    predicate: Predicate,
    regexes: Arc<HashMap<String, Regex>>,
}

impl CompiledPredicate {
    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    pub fn matches<R: Record>(&self, record: &R) -> bool {
        self.predicate.eval(record, &self.regexes)
    }
}

fn is_lookup_op(op: &str) -> bool {
    matches!(
        op,
        "exact" | "ne" | "lt" | "lte" | "gt" | "gte" | "in" | "isnull" | "contains"
            | "startswith" | "regex"
    )
}

fn compare_present<R: Record>(
    record: &R,
    field: &str,
    bound: &Value,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> bool {
    let actual = field_value(record, field);
    if actual.is_null() || bound.is_null() {
        return false;
    }
    accept(compare_values(&actual, bound))
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::All => write!(f, "*"),
            Predicate::Eq(field, v) => write!(f, "{} = {}", field, v),
            Predicate::Ne(field, v) => write!(f, "{} != {}", field, v),
            Predicate::Lt(field, v) => write!(f, "{} < {}", field, v),
            Predicate::Lte(field, v) => write!(f, "{} <= {}", field, v),
            Predicate::Gt(field, v) => write!(f, "{} > {}", field, v),
            Predicate::Gte(field, v) => write!(f, "{} >= {}", field, v),
            Predicate::In(field, vs) => write!(f, "{} IN {}", field, Value::Array(vs.clone())),
            Predicate::IsNull(field, true) => write!(f, "{} IS NULL", field),
            Predicate::IsNull(field, false) => write!(f, "{} IS NOT NULL", field),
            Predicate::Contains(field, s) => write!(f, "{} CONTAINS {:?}", field, s),
            Predicate::StartsWith(field, s) => write!(f, "{} STARTS WITH {:?}", field, s),
            Predicate::Regex(field, s) => write!(f, "{} ~ {:?}", field, s),
            Predicate::And(parts) => write_joined(f, parts, " AND ", "*"),
            Predicate::Or(parts) => write_joined(f, parts, " OR ", "NOTHING"),
            Predicate::Not(inner) => write!(f, "NOT ({})", inner),
        }
    }
}

fn write_joined(
    f: &mut fmt::Formatter<'_>,
    parts: &[Predicate],
    separator: &str,
    empty: &str,
) -> fmt::Result {
    if parts.is_empty() {
        return write!(f, "{}", empty);
    }
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", separator)?;
        }
        write!(f, "({})", part)?;
    }
    Ok(())
}
