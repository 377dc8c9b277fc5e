//! SQLite-backed catalog store using `SQLx`.
//!
//! This module provides the durable [`CatalogStore`] implementation:
//! - Connection pooling (no `Arc<Mutex<>>`)
//! - Simple embedded schema (no migration files)
//! - Versioned writes: `UPDATE .. WHERE id = ? AND version = ?`, so a stale
//!   writer affects zero rows and surfaces as `Conflict`
//! - Expiry as one filtered `UPDATE`; reservation deadlines are stored as
//!   ISO-8601 text (`YYYY-MM-DD`), so SQL text comparison agrees with
//!   calendar order

use std::path::Path;

use async_trait::async_trait;
use chrono::NaiveDate;
use circulate_core::{
    Book, BookDetails, BookFilter, BookId, BookState, CatalogStore, CirculationError, Patron,
    Result,
};
use sqlx::{Row, SqlitePool};

const CURRENT_SCHEMA_VERSION: i64 = 1;

/// Database schema as SQL string - executed once on init
const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY CHECK(version = 1)
);

CREATE TABLE IF NOT EXISTS books (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    publisher TEXT,
    author TEXT,
    holder TEXT,
    reserved_until TEXT,
    leased INTEGER NOT NULL DEFAULT 0,
    version INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_books_holder ON books(holder);
CREATE INDEX IF NOT EXISTS idx_books_reserved_until ON books(reserved_until);
";

const BOOK_COLUMNS: &str = "id, title, publisher, author, holder, reserved_until, leased, version";

/// ISO-8601 calendar date, the only format written to `reserved_until`.
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Durable catalog store over a pooled SQLite database.
#[derive(Debug, Clone)]
pub struct CatalogDb {
    pool: SqlitePool,
}

impl CatalogDb {
    /// Get a reference to the underlying connection pool.
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open an existing catalog database at the given path.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the file cannot be opened, the schema cannot be
    /// initialized, or the schema version does not match.
    pub async fn open(path: &Path) -> Result<Self> {
        Self::open_internal(path, false).await
    }

    /// Create or open a catalog database, creating parent directories as
    /// needed.
    pub async fn create_or_open(path: &Path) -> Result<Self> {
        Self::open_internal(path, true).await
    }

    async fn open_internal(path: &Path, allow_create: bool) -> Result<Self> {
        if allow_create {
            if let Some(parent) = path.parent() {
                if !parent.exists() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        CirculationError::storage(format!(
                            "failed to create parent directory: {e}"
                        ))
                    })?;
                }
            }
        }

        let path_str = path.to_str().ok_or_else(|| {
            CirculationError::storage("database path contains invalid UTF-8")
        })?;

        let mode = if allow_create { "rwc" } else { "rw" };
        let db_url = if path.is_absolute() {
            format!("sqlite:///{path_str}?mode={mode}")
        } else {
            format!("sqlite:{path_str}?mode={mode}")
        };

        let pool = connect(&db_url).await?;
        init_schema(&pool).await?;
        check_schema_version(&pool).await?;

        tracing::debug!(path = %path.display(), "opened catalog database");
        Ok(Self { pool })
    }
}

// === PURE FUNCTIONS (row and date codecs) ===

fn encode_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parse a stored `YYYY-MM-DD` deadline.
fn parse_date(id: BookId, raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| CirculationError::CorruptRecord {
        id,
        reason: format!("invalid reserved_until date '{raw}': {e}"),
    })
}

/// Parse a database row into a `Book`, validating lifecycle invariants at
/// the storage boundary.
fn parse_book_row(row: &sqlx::sqlite::SqliteRow) -> Result<Book> {
    let id: i64 = row
        .try_get("id")
        .map_err(|e| CirculationError::storage(format!("failed to read id: {e}")))?;
    let id = BookId::new(id);

    let title: String = row
        .try_get("title")
        .map_err(|e| CirculationError::storage(format!("failed to read title: {e}")))?;
    let publisher: Option<String> = row
        .try_get("publisher")
        .map_err(|e| CirculationError::storage(format!("failed to read publisher: {e}")))?;
    let author: Option<String> = row
        .try_get("author")
        .map_err(|e| CirculationError::storage(format!("failed to read author: {e}")))?;
    let holder: Option<String> = row
        .try_get("holder")
        .map_err(|e| CirculationError::storage(format!("failed to read holder: {e}")))?;
    let reserved_until: Option<String> = row
        .try_get("reserved_until")
        .map_err(|e| CirculationError::storage(format!("failed to read reserved_until: {e}")))?;
    let leased: bool = row
        .try_get("leased")
        .map_err(|e| CirculationError::storage(format!("failed to read leased: {e}")))?;
    let version: i64 = row
        .try_get("version")
        .map_err(|e| CirculationError::storage(format!("failed to read version: {e}")))?;

    let until = reserved_until.map(|raw| parse_date(id, &raw)).transpose()?;
    let state = BookState::from_columns(id, holder.map(Patron::new), until, leased)?;

    Ok(Book {
        id,
        details: BookDetails {
            title,
            publisher,
            author,
        },
        state,
        version,
    })
}

/// Build the WHERE clause and bind values for a catalog filter.
fn build_filter_clauses(filter: &BookFilter) -> (String, Vec<String>) {
    let mut clauses: Vec<&'static str> = Vec::new();
    let mut values: Vec<String> = Vec::new();

    if let Some(fragment) = &filter.title_contains {
        clauses.push("instr(lower(title), lower(?)) > 0");
        values.push(fragment.clone());
    }
    if let Some(patron) = &filter.reserved_by {
        clauses.push("holder = ? AND leased = 0 AND reserved_until IS NOT NULL");
        values.push(patron.as_str().to_string());
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), values)
    }
}

// === IMPERATIVE SHELL (database side effects) ===

async fn connect(db_url: &str) -> Result<SqlitePool> {
    SqlitePool::connect(db_url)
        .await
        .map_err(|e| CirculationError::storage(format!("failed to connect to database: {e}")))
}

async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA)
        .execute(pool)
        .await
        .map_err(|e| CirculationError::storage(format!("failed to initialize schema: {e}")))?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(CURRENT_SCHEMA_VERSION)
        .execute(pool)
        .await
        .map_err(|e| CirculationError::storage(format!("failed to set schema version: {e}")))?;

    Ok(())
}

async fn check_schema_version(pool: &SqlitePool) -> Result<()> {
    let version: Option<i64> = sqlx::query("SELECT version FROM schema_version")
        .fetch_optional(pool)
        .await
        .map_err(|e| CirculationError::storage(format!("failed to read schema version: {e}")))?
        .map(|row| {
            row.try_get("version").map_err(|e| {
                CirculationError::storage(format!("failed to parse schema version: {e}"))
            })
        })
        .transpose()?;

    match version {
        Some(v) if v == CURRENT_SCHEMA_VERSION => Ok(()),
        Some(v) => Err(CirculationError::storage(format!(
            "schema version mismatch: database has version {v}, expected {CURRENT_SCHEMA_VERSION}"
        ))),
        None => Err(CirculationError::storage(
            "schema version not found; the database may be corrupted",
        )),
    }
}

#[async_trait]
impl CatalogStore for CatalogDb {
    async fn get(&self, id: BookId) -> Result<Option<Book>> {
        sqlx::query(&format!("SELECT {BOOK_COLUMNS} FROM books WHERE id = ?"))
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CirculationError::storage(format!("failed to query book: {e}")))
            .and_then(|opt_row| opt_row.map(|row| parse_book_row(&row)).transpose())
    }

    async fn list(&self, filter: &BookFilter) -> Result<Vec<Book>> {
        let (where_clause, values) = build_filter_clauses(filter);
        let sql = format!("SELECT {BOOK_COLUMNS} FROM books{where_clause} ORDER BY id");

        let mut query = sqlx::query(&sql);
        for value in values {
            query = query.bind(value);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| CirculationError::storage(format!("failed to query books: {e}")))?;

        rows.iter().map(parse_book_row).collect()
    }

    async fn insert(&self, details: BookDetails) -> Result<Book> {
        let id = sqlx::query("INSERT INTO books (title, publisher, author) VALUES (?, ?, ?)")
            .bind(&details.title)
            .bind(&details.publisher)
            .bind(&details.author)
            .execute(&self.pool)
            .await
            .map(|result| result.last_insert_rowid())
            .map_err(|e| CirculationError::storage(format!("failed to insert book: {e}")))?;

        Ok(Book {
            id: BookId::new(id),
            details,
            state: BookState::Available,
            version: 0,
        })
    }

    async fn update(&self, book: &Book, expected_version: i64) -> Result<Book> {
        let (holder, until, leased) = book.state.to_columns();

        let result = sqlx::query(
            "UPDATE books
             SET title = ?, publisher = ?, author = ?,
                 holder = ?, reserved_until = ?, leased = ?,
                 version = version + 1
             WHERE id = ? AND version = ?",
        )
        .bind(&book.details.title)
        .bind(&book.details.publisher)
        .bind(&book.details.author)
        .bind(holder.map(Patron::as_str))
        .bind(until.map(encode_date))
        .bind(leased)
        .bind(book.id.get())
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .map_err(|e| CirculationError::storage(format!("failed to update book: {e}")))?;

        if result.rows_affected() > 0 {
            return Ok(Book {
                version: expected_version.saturating_add(1),
                ..book.clone()
            });
        }

        // Zero rows: the id is gone, or another writer bumped the version.
        match self.get(book.id).await? {
            None => Err(CirculationError::NotFound(book.id)),
            Some(current) => Err(CirculationError::conflict(format!(
                "book {} was modified concurrently (expected version {expected_version}, found {})",
                book.id, current.version
            ))),
        }
    }

    async fn remove(&self, id: BookId) -> Result<bool> {
        sqlx::query("DELETE FROM books WHERE id = ?")
            .bind(id.get())
            .execute(&self.pool)
            .await
            .map(|result| result.rows_affected() > 0)
            .map_err(|e| CirculationError::storage(format!("failed to delete book: {e}")))
    }

    async fn expire_reservations(&self, as_of: NaiveDate) -> Result<u64> {
        // One filtered update: no per-record read-modify-write loop, so the
        // sweep-before-every-operation contract stays O(expired), not O(n).
        sqlx::query(
            "UPDATE books
             SET holder = NULL, reserved_until = NULL, version = version + 1
             WHERE leased = 0 AND reserved_until IS NOT NULL AND reserved_until < ?",
        )
        .bind(encode_date(as_of))
        .execute(&self.pool)
        .await
        .map(|result| result.rows_affected())
        .map_err(|e| CirculationError::storage(format!("failed to expire reservations: {e}")))
    }

    async fn holds_lease(&self, patron: &Patron) -> Result<bool> {
        sqlx::query("SELECT 1 FROM books WHERE leased = 1 AND holder = ? LIMIT 1")
            .bind(patron.as_str())
            .fetch_optional(&self.pool)
            .await
            .map(|row| row.is_some())
            .map_err(|e| CirculationError::storage(format!("failed to query leases: {e}")))
    }

    async fn release_reservations(&self, patron: &Patron) -> Result<u64> {
        sqlx::query(
            "UPDATE books
             SET holder = NULL, reserved_until = NULL, version = version + 1
             WHERE leased = 0 AND holder = ?",
        )
        .bind(patron.as_str())
        .execute(&self.pool)
        .await
        .map(|result| result.rows_affected())
        .map_err(|e| CirculationError::storage(format!("failed to release reservations: {e}")))
    }
}
