//! SQLite record store.
//!
//! One table per database file: the primary key in `id`, every other field
//! of the record serialized as a JSON object in `data`.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use fedquery_core::{
    record_from_fields, record_to_fields, BoxedSourceQuery, FederationError, FederationResult,
    Record, RecordId,
};
use parking_lot::Mutex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::ValueRef;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::{Map, Value};

use super::source::SqliteSource;
use super::sql::SqlFilter;

/// Default number of rows fetched per cursor page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub(crate) fn backend(e: rusqlite::Error) -> FederationError {
    FederationError::Backend(e.to_string())
}

/// Shared handle to one SQLite database holding records.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    location: Arc<str>,
    page_size: usize,
    pages_read: Arc<AtomicUsize>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("location", &self.location)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> FederationResult<Self> {
        let location = path.as_ref().display().to_string();
        let conn = Connection::open(path).map_err(backend)?;
        Self::from_connection(conn, &location)
    }

    /// Private in-memory store
    pub fn open_in_memory() -> FederationResult<Self> {
        let conn = Connection::open_in_memory().map_err(backend)?;
        Self::from_connection(conn, ":memory:")
    }

    fn from_connection(conn: Connection, location: &str) -> FederationResult<Self> {
        register_regexp(&conn).map_err(backend)?;
        init_schema(&conn).map_err(backend)?;
        tracing::debug!("Opened SQLite store at {}", location);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location: Arc::from(location),
            page_size: DEFAULT_PAGE_SIZE,
            pages_read: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Rows fetched per cursor page; zero is raised to one.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        if page_size == 0 {
            tracing::warn!("Page size 0 for {} raised to 1", self.location);
        }
        self.page_size = page_size.max(1);
        self
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Cursor pages fetched from this store so far.
    pub fn pages_read(&self) -> usize {
        self.pages_read.load(AtomicOrdering::Relaxed)
    }

    pub(crate) fn note_page_read(&self) {
        self.pages_read.fetch_add(1, AtomicOrdering::Relaxed);
    }

    /// Store a record under its own primary key.
    pub fn insert<R: Record>(&self, record: &R) -> FederationResult<()> {
        let data = Value::Object(record_to_fields(record)?).to_string();
        self.conn
            .lock()
            .execute(
                "INSERT INTO records (id, data) VALUES (?1, ?2)",
                params![record.pk(), data],
            )
            .map_err(backend)?;
        Ok(())
    }

    /// Insert a record built from `fields`; SQLite assigns the key.
    pub fn create<R: Record>(&self, fields: Map<String, Value>) -> FederationResult<R> {
        // Validate the shape before writing anything
        let draft: R = record_from_fields(0, fields)?;
        let fields = record_to_fields(&draft)?;
        let data = Value::Object(fields.clone()).to_string();

        let conn = self.conn.lock();
        conn.execute("INSERT INTO records (data) VALUES (?1)", params![data])
            .map_err(backend)?;
        let pk = conn.last_insert_rowid();
        drop(conn);

        tracing::trace!("Created record {} in {}", pk, self.location);
        record_from_fields(pk, fields)
    }

    /// Remove a record by primary key, returning whether it existed.
    pub fn delete(&self, pk: RecordId) -> FederationResult<bool> {
        let removed = self
            .conn
            .lock()
            .execute("DELETE FROM records WHERE id = ?1", params![pk])
            .map_err(backend)?;
        Ok(removed > 0)
    }

    /// Fetch one record by primary key.
    pub fn find<R: Record>(&self, pk: RecordId) -> FederationResult<Option<R>> {
        let row: Option<String> = self
            .conn
            .lock()
            .query_row("SELECT data FROM records WHERE id = ?1", params![pk], |row| {
                row.get(0)
            })
            .optional()
            .map_err(backend)?;
        row.map(|data| decode(pk, &data)).transpose()
    }

    pub fn len(&self) -> FederationResult<usize> {
        self.count(&SqlFilter {
            clause: "1".to_string(),
            params: Vec::new(),
        })
    }

    pub fn is_empty(&self) -> FederationResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Unfiltered, unordered query over this store.
    pub fn source<R: Record>(&self) -> BoxedSourceQuery<R> {
        Box::new(SqliteSource::new(self.clone()))
    }

    pub(crate) fn count(&self, filter: &SqlFilter) -> FederationResult<usize> {
        let sql = format!("SELECT COUNT(*) FROM records WHERE {}", filter.clause);
        let count: i64 = self
            .conn
            .lock()
            .query_row(&sql, params_from_iter(filter.params.iter()), |row| row.get(0))
            .map_err(backend)?;
        Ok(count as usize)
    }

    pub(crate) fn exists(&self, filter: &SqlFilter) -> FederationResult<bool> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM records WHERE {})",
            filter.clause
        );
        self.conn
            .lock()
            .query_row(&sql, params_from_iter(filter.params.iter()), |row| row.get(0))
            .map_err(backend)
    }

    /// One page of matching records; the connection is held only while the
    /// page is read.
    pub(crate) fn select<R: Record>(
        &self,
        filter: &SqlFilter,
        order: &str,
        limit: usize,
        offset: usize,
    ) -> FederationResult<Vec<R>> {
        let sql = format!(
            "SELECT id, data FROM records WHERE {} ORDER BY {} LIMIT {} OFFSET {}",
            filter.clause, order, limit, offset
        );
        let rows: Vec<(RecordId, String)> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare_cached(&sql).map_err(backend)?;
            let mapped = stmt
                .query_map(params_from_iter(filter.params.iter()), |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })
                .map_err(backend)?;
            mapped.collect::<Result<Vec<_>, _>>().map_err(backend)?
        };
        rows.iter().map(|(id, data)| decode(*id, data)).collect()
    }
}

fn decode<R: Record>(pk: RecordId, data: &str) -> FederationResult<R> {
    let fields: Map<String, Value> = serde_json::from_str(data)?;
    record_from_fields(pk, fields)
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            data TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

/// `X REGEXP Y` support; non-text values never match.
fn register_regexp(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let regex = ctx.get_or_create_aux(0, |pattern| -> Result<_, BoxError> {
                Ok(fedquery_core::value::safe_regex(pattern.as_str()?)?)
            })?;
            let matched = match ctx.get_raw(1) {
                ValueRef::Text(bytes) => std::str::from_utf8(bytes)
                    .map(|text| regex.is_match(text))
                    .unwrap_or(false),
                _ => false,
            };
            Ok(matched)
        },
    )
}
