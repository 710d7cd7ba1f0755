//! Predicate and ordering compilation to SQLite.
//!
//! Every non-key field lives inside the `data` JSON column and is addressed
//! through `json_extract`. The primary key maps to the `id` column.

use fedquery_core::{
    FederationError, FederationResult, OrderingSpec, Predicate, Record, PK_ALIAS,
};
use rusqlite::types::Value as SqlValue;
use serde_json::Value;

/// A compiled `WHERE` fragment with its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFilter {
    pub clause: String,
    pub params: Vec<SqlValue>,
}

impl SqlFilter {
    fn new(clause: impl Into<String>) -> Self {
        Self {
            clause: clause.into(),
            params: Vec::new(),
        }
    }
}

/// Column expression for a field name.
enum Column {
    Key,
    Json(String),
}

impl Column {
    fn resolve<R: Record>(field: &str) -> FederationResult<Self> {
        if field == PK_ALIAS || field == R::PK_FIELD {
            return Ok(Column::Key);
        }
        let mut path = String::from("$");
        for part in field.split('.') {
            if part.is_empty() || part.contains('"') || part.contains('\'') {
                return Err(FederationError::InvalidPredicate(format!(
                    "Field '{}' cannot be addressed in SQL",
                    field
                )));
            }
            path.push_str(".\"");
            path.push_str(part);
            path.push('"');
        }
        Ok(Column::Json(path))
    }

    fn expr(&self) -> String {
        match self {
            Column::Key => "id".to_string(),
            Column::Json(path) => format!("json_extract(data, '{}')", path),
        }
    }

    /// SQL that is true only when the field holds a JSON string.
    fn is_text(&self) -> String {
        match self {
            Column::Key => "0".to_string(),
            Column::Json(path) => format!("json_type(data, '{}') = 'text'", path),
        }
    }

    /// Kind rank matching `value::kind_rank`: missing and null first, then
    /// booleans, numbers, text, arrays, objects.
    fn kind_rank(&self) -> Option<String> {
        match self {
            Column::Key => None,
            Column::Json(path) => Some(format!(
                "CASE json_type(data, '{}') \
                 WHEN 'true' THEN 1 WHEN 'false' THEN 1 \
                 WHEN 'integer' THEN 2 WHEN 'real' THEN 2 \
                 WHEN 'text' THEN 3 WHEN 'array' THEN 4 WHEN 'object' THEN 5 \
                 ELSE 0 END",
                path
            )),
        }
    }
}

/// Bind value for a JSON scalar; booleans become 0/1 like `json_extract`
/// returns them, containers bind as their JSON text.
pub fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Compile a predicate into a `WHERE` fragment.
pub fn compile_predicate<R: Record>(predicate: &Predicate) -> FederationResult<SqlFilter> {
    let filter = match predicate {
        Predicate::All => SqlFilter::new("1"),
        Predicate::Eq(field, value) => {
            let col = Column::resolve::<R>(field)?.expr();
            if value.is_null() {
                SqlFilter::new(format!("{} IS NULL", col))
            } else {
                bound(format!("{} = ?", col), value)
            }
        }
        Predicate::Ne(field, value) => {
            let col = Column::resolve::<R>(field)?.expr();
            if value.is_null() {
                SqlFilter::new(format!("{} IS NOT NULL", col))
            } else {
                bound(format!("({col} IS NULL OR {col} != ?)", col = col), value)
            }
        }
        Predicate::Lt(field, value) => comparison::<R>(field, "<", value)?,
        Predicate::Lte(field, value) => comparison::<R>(field, "<=", value)?,
        Predicate::Gt(field, value) => comparison::<R>(field, ">", value)?,
        Predicate::Gte(field, value) => comparison::<R>(field, ">=", value)?,
        Predicate::In(field, values) => {
            let candidates: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();
            if candidates.is_empty() {
                SqlFilter::new("0")
            } else {
                let col = Column::resolve::<R>(field)?.expr();
                let marks = vec!["?"; candidates.len()].join(", ");
                SqlFilter {
                    clause: format!("{} IN ({})", col, marks),
                    params: candidates.into_iter().map(to_sql_value).collect(),
                }
            }
        }
        Predicate::IsNull(field, is_null) => {
            let col = Column::resolve::<R>(field)?.expr();
            if *is_null {
                SqlFilter::new(format!("{} IS NULL", col))
            } else {
                SqlFilter::new(format!("{} IS NOT NULL", col))
            }
        }
        Predicate::Contains(field, needle) => {
            let col = Column::resolve::<R>(field)?;
            SqlFilter {
                clause: format!("({} AND instr({}, ?) > 0)", col.is_text(), col.expr()),
                params: vec![SqlValue::Text(needle.clone())],
            }
        }
        Predicate::StartsWith(field, prefix) => {
            let col = Column::resolve::<R>(field)?;
            SqlFilter {
                clause: format!(
                    "({} AND substr({}, 1, length(?)) = ?)",
                    col.is_text(),
                    col.expr()
                ),
                params: vec![SqlValue::Text(prefix.clone()), SqlValue::Text(prefix.clone())],
            }
        }
        Predicate::Regex(field, pattern) => {
            fedquery_core::value::safe_regex(pattern).map_err(|e| {
                FederationError::InvalidPredicate(format!("regex on '{}': {}", field, e))
            })?;
            let col = Column::resolve::<R>(field)?;
            SqlFilter {
                clause: format!("({} AND {} REGEXP ?)", col.is_text(), col.expr()),
                params: vec![SqlValue::Text(pattern.clone())],
            }
        }
        Predicate::And(parts) => join::<R>(parts, " AND ", "1")?,
        Predicate::Or(parts) => join::<R>(parts, " OR ", "0")?,
        Predicate::Not(inner) => {
            let inner = compile_predicate::<R>(inner)?;
            // NULL from a comparison counts as false, so its negation is true
            SqlFilter {
                clause: format!("NOT COALESCE(({}), 0)", inner.clause),
                params: inner.params,
            }
        }
    };
    Ok(filter)
}

fn bound(clause: String, value: &Value) -> SqlFilter {
    SqlFilter {
        clause,
        params: vec![to_sql_value(value)],
    }
}

fn comparison<R: Record>(field: &str, op: &str, value: &Value) -> FederationResult<SqlFilter> {
    if value.is_null() {
        return Ok(SqlFilter::new("0"));
    }
    let col = Column::resolve::<R>(field)?.expr();
    Ok(bound(format!("{} {} ?", col, op), value))
}

fn join<R: Record>(
    parts: &[Predicate],
    separator: &str,
    empty: &str,
) -> FederationResult<SqlFilter> {
    if parts.is_empty() {
        return Ok(SqlFilter::new(empty));
    }
    let mut clauses = Vec::with_capacity(parts.len());
    let mut params = Vec::new();
    for part in parts {
        let compiled = compile_predicate::<R>(part)?;
        clauses.push(format!("({})", compiled.clause));
        params.extend(compiled.params);
    }
    Ok(SqlFilter {
        clause: clauses.join(separator),
        params,
    })
}

/// Compile an ordering into an `ORDER BY` list ending in `id ASC`.
///
/// JSON fields sort by kind rank first, then by value, so mixed kinds and
/// containers order exactly as `value::compare_values` does.
pub fn compile_ordering<R: Record>(ordering: &OrderingSpec<R>) -> FederationResult<String> {
    let mut terms = Vec::with_capacity(2 * ordering.len() + 1);
    for key in ordering.keys() {
        let col = Column::resolve::<R>(key.field())?;
        let direction = if key.is_descending() { "DESC" } else { "ASC" };
        if let Some(rank) = col.kind_rank() {
            terms.push(format!("{} {}", rank, direction));
        }
        terms.push(format!("{} {}", col.expr(), direction));
    }
    terms.push("id ASC".to_string());
    Ok(terms.join(", "))
}
