//! Catalog store abstraction.
//!
//! The store is the single source of truth for book records; the lifecycle
//! manager holds no cache across calls. Implementations must provide atomic
//! compare-and-update of a single record (versioned writes) - that is what
//! serializes concurrent operations on the same book.
//!
//! The trait lives in the domain layer so business logic depends on it, not
//! on any backend: [`MemoryCatalog`] here for tests and embedding, the
//! SQLite-backed store in the `circulate` crate for durable deployments.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Mutex;

use crate::book::{Book, BookDetails, BookId, BookState};
use crate::error::{CirculationError, Result};
use crate::identity::Patron;

// ============================================================================
// Filters
// ============================================================================

/// Filter for catalog scans. An empty filter matches every book.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookFilter {
    /// Case-insensitive substring match on the title.
    pub title_contains: Option<String>,
    /// Only books currently reserved (not leased) by this patron.
    pub reserved_by: Option<Patron>,
}

impl BookFilter {
    /// Match every book.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Match books whose title contains `fragment`, case-insensitively.
    #[must_use]
    pub fn title_contains(fragment: impl Into<String>) -> Self {
        Self {
            title_contains: Some(fragment.into()),
            ..Self::default()
        }
    }

    /// Match books with a pending reservation held by `patron`.
    #[must_use]
    pub fn reserved_by(patron: Patron) -> Self {
        Self {
            reserved_by: Some(patron),
            ..Self::default()
        }
    }

    /// Whether a book satisfies this filter.
    #[must_use]
    pub fn matches(&self, book: &Book) -> bool {
        if let Some(fragment) = &self.title_contains {
            if !book
                .details
                .title
                .to_lowercase()
                .contains(&fragment.to_lowercase())
            {
                return false;
            }
        }
        if let Some(patron) = &self.reserved_by {
            if !matches!(&book.state, BookState::Reserved { holder, .. } if holder == patron) {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// Store trait
// ============================================================================

/// Durable record storage for the catalog.
///
/// # Contract
///
/// - `update` is a compare-and-update: the write lands only if the stored
///   version equals `expected_version`, otherwise it fails with `Conflict`
///   and changes nothing. Successful writes bump the version.
/// - `expire_reservations` is a single filtered bulk update, not a
///   read-modify-write loop per record, so running it as a preamble to every
///   operation stays cheap.
/// - Implementations are shared across request tasks and must be safe to
///   call concurrently.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Point lookup by id.
    async fn get(&self, id: BookId) -> Result<Option<Book>>;

    /// Scan books matching `filter`, ordered by id.
    async fn list(&self, filter: &BookFilter) -> Result<Vec<Book>>;

    /// Add a new book; it starts `Available` at version 0.
    async fn insert(&self, details: BookDetails) -> Result<Book>;

    /// Versioned write of a single record.
    ///
    /// # Errors
    ///
    /// `NotFound` if the id is gone, `Conflict` if the stored version no
    /// longer equals `expected_version`.
    async fn update(&self, book: &Book, expected_version: i64) -> Result<Book>;

    /// Delete a record regardless of its lifecycle state.
    /// Returns whether a record was deleted.
    async fn remove(&self, id: BookId) -> Result<bool>;

    /// Clear every non-leased reservation with a deadline strictly before
    /// `as_of`. Returns how many reservations were dropped. Idempotent.
    async fn expire_reservations(&self, as_of: NaiveDate) -> Result<u64>;

    /// Whether any book is currently leased to `patron`.
    async fn holds_lease(&self, patron: &Patron) -> Result<bool>;

    /// Clear every reservation held by `patron` (leases untouched).
    /// Returns how many reservations were cleared.
    async fn release_reservations(&self, patron: &Patron) -> Result<u64>;
}

// ============================================================================
// In-memory implementation
// ============================================================================

#[derive(Debug, Default)]
struct Shelf {
    next_id: i64,
    books: BTreeMap<BookId, Book>,
}

/// In-memory catalog store.
///
/// Backs the test suites and small embedded uses. The whole shelf sits
/// behind one async mutex, so the compare-and-update contract holds
/// trivially; the bulk operations are linear scans, which is acceptable at
/// this backend's scale.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    shelf: Mutex<Shelf>,
}

impl MemoryCatalog {
    /// An empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn get(&self, id: BookId) -> Result<Option<Book>> {
        let shelf = self.shelf.lock().await;
        Ok(shelf.books.get(&id).cloned())
    }

    async fn list(&self, filter: &BookFilter) -> Result<Vec<Book>> {
        let shelf = self.shelf.lock().await;
        Ok(shelf
            .books
            .values()
            .filter(|book| filter.matches(book))
            .cloned()
            .collect())
    }

    async fn insert(&self, details: BookDetails) -> Result<Book> {
        let mut shelf = self.shelf.lock().await;
        shelf.next_id = shelf.next_id.saturating_add(1);
        let book = Book {
            id: BookId::new(shelf.next_id),
            details,
            state: BookState::Available,
            version: 0,
        };
        shelf.books.insert(book.id, book.clone());
        Ok(book)
    }

    async fn update(&self, book: &Book, expected_version: i64) -> Result<Book> {
        let mut shelf = self.shelf.lock().await;
        let stored = shelf
            .books
            .get_mut(&book.id)
            .ok_or(CirculationError::NotFound(book.id))?;
        if stored.version != expected_version {
            return Err(CirculationError::conflict(format!(
                "book {} was modified concurrently (expected version {expected_version}, found {})",
                book.id, stored.version
            )));
        }
        stored.details = book.details.clone();
        stored.state = book.state.clone();
        stored.version = expected_version.saturating_add(1);
        Ok(stored.clone())
    }

    async fn remove(&self, id: BookId) -> Result<bool> {
        let mut shelf = self.shelf.lock().await;
        Ok(shelf.books.remove(&id).is_some())
    }

    async fn expire_reservations(&self, as_of: NaiveDate) -> Result<u64> {
        let mut shelf = self.shelf.lock().await;
        let mut dropped = 0u64;
        for book in shelf.books.values_mut() {
            if book.state.is_expired(as_of) {
                book.state = BookState::Available;
                book.version = book.version.saturating_add(1);
                dropped = dropped.saturating_add(1);
            }
        }
        Ok(dropped)
    }

    async fn holds_lease(&self, patron: &Patron) -> Result<bool> {
        let shelf = self.shelf.lock().await;
        Ok(shelf
            .books
            .values()
            .any(|book| matches!(&book.state, BookState::Leased { holder } if holder == patron)))
    }

    async fn release_reservations(&self, patron: &Patron) -> Result<u64> {
        let mut shelf = self.shelf.lock().await;
        let mut cleared = 0u64;
        for book in shelf.books.values_mut() {
            if matches!(&book.state, BookState::Reserved { holder, .. } if holder == patron) {
                book.state = BookState::Available;
                book.version = book.version.saturating_add(1);
                cleared = cleared.saturating_add(1);
            }
        }
        Ok(cleared)
    }
}
