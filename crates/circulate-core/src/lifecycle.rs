//! Book lifecycle manager.
//!
//! Owns every mutation of a book's lifecycle fields. Each operation follows
//! the same shape:
//!
//! 1. **Sweep** - drop reservations whose deadline has passed, so no caller
//!    ever observes stale state (the sweep is a single filtered store
//!    update, retried once on a transient conflict).
//! 2. **Load** - read the record; unknown ids reject with `NotFound`.
//! 3. **Transition** - pure state-machine step on [`BookState`].
//! 4. **Write** - versioned compare-and-update; a concurrent writer on the
//!    same book surfaces as `Conflict`, never a silent overwrite.
//!
//! User-initiated writes are deliberately *not* retried on conflict: two
//! patrons racing for the same book should see exactly one winner, and a
//! blind retry would pick the winner by timing instead of by the state the
//! loser actually observed.
//!
//! Every public operation has a date-parameterized `*_on` / `*_as_of`
//! variant so tests can pin the calendar; the plain variants use today's
//! date (UTC).

use chrono::{NaiveDate, Utc};

use crate::book::{Book, BookDetails, BookId};
use crate::error::{CirculationError, Result};
use crate::identity::Patron;
use crate::store::{BookFilter, CatalogStore};

/// How long a fresh reservation lasts: it may still be picked up on the
/// next calendar day, and expires the day after that.
const RESERVATION_DAYS: u64 = 1;

/// The lifecycle manager. Generic over the catalog store so the domain
/// logic runs unchanged against the in-memory and SQLite backends.
#[derive(Debug)]
pub struct LifecycleManager<S> {
    store: S,
}

impl<S: CatalogStore> LifecycleManager<S> {
    /// Wrap a catalog store.
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Access the underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    // ========================================================================
    // Lifecycle operations
    // ========================================================================

    /// Reserve an available book for `patron` until tomorrow.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `Conflict` if the book is already
    /// reserved or leased (or a concurrent writer won the race).
    pub async fn reserve(&self, id: BookId, patron: Patron) -> Result<Book> {
        self.reserve_on(id, patron, Self::today()).await
    }

    /// [`reserve`](Self::reserve) with an explicit current date.
    pub async fn reserve_on(&self, id: BookId, patron: Patron, today: NaiveDate) -> Result<Book> {
        self.sweep_as_of(today).await?;
        let book = self.load(id).await?;
        let until = today
            .checked_add_days(chrono::Days::new(RESERVATION_DAYS))
            .unwrap_or(NaiveDate::MAX);
        let next = book.state.reserve(patron, until)?;
        self.store.update(&book.with_state(next), book.version).await
    }

    /// Promote a reservation to a lease (librarian hands the book over).
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `InvalidTransition` if the book is not
    /// reserved - including when the reservation expired before the lease
    /// was confirmed, since the sweep runs first.
    pub async fn lease(&self, id: BookId) -> Result<Book> {
        self.lease_on(id, Self::today()).await
    }

    /// [`lease`](Self::lease) with an explicit current date.
    pub async fn lease_on(&self, id: BookId, today: NaiveDate) -> Result<Book> {
        self.sweep_as_of(today).await?;
        let book = self.load(id).await?;
        let next = book.state.lease()?;
        self.store.update(&book.with_state(next), book.version).await
    }

    /// Take a book back onto the shelf. Idempotent: returning an
    /// already-available book succeeds and leaves it available.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `Conflict` on a lost write race.
    pub async fn return_book(&self, id: BookId) -> Result<Book> {
        self.return_book_on(id, Self::today()).await
    }

    /// [`return_book`](Self::return_book) with an explicit current date.
    pub async fn return_book_on(&self, id: BookId, today: NaiveDate) -> Result<Book> {
        self.sweep_as_of(today).await?;
        let book = self.load(id).await?;
        let next = book.state.give_back();
        self.store.update(&book.with_state(next), book.version).await
    }

    /// Cancel a reservation. Patrons may cancel their own; a privileged
    /// caller (librarian) may cancel any.
    ///
    /// # Errors
    ///
    /// `Forbidden` if a non-privileged patron targets someone else's
    /// reservation, `InvalidTransition` if the book is not reserved.
    pub async fn cancel_reservation(
        &self,
        id: BookId,
        patron: &Patron,
        privileged: bool,
    ) -> Result<Book> {
        self.cancel_reservation_on(id, patron, privileged, Self::today())
            .await
    }

    /// [`cancel_reservation`](Self::cancel_reservation) with an explicit
    /// current date.
    pub async fn cancel_reservation_on(
        &self,
        id: BookId,
        patron: &Patron,
        privileged: bool,
        today: NaiveDate,
    ) -> Result<Book> {
        self.sweep_as_of(today).await?;
        let book = self.load(id).await?;
        let next = book.state.cancel(patron, privileged)?;
        self.store.update(&book.with_state(next), book.version).await
    }

    // ========================================================================
    // Catalog queries
    // ========================================================================

    /// List books matching `filter`, sweeping expired reservations first so
    /// the returned states are never stale.
    pub async fn list_books(&self, filter: &BookFilter) -> Result<Vec<Book>> {
        self.list_books_on(filter, Self::today()).await
    }

    /// [`list_books`](Self::list_books) with an explicit current date.
    pub async fn list_books_on(&self, filter: &BookFilter, today: NaiveDate) -> Result<Vec<Book>> {
        self.sweep_as_of(today).await?;
        self.store.list(filter).await
    }

    /// Case-insensitive title search.
    pub async fn search(&self, fragment: &str) -> Result<Vec<Book>> {
        self.search_on(fragment, Self::today()).await
    }

    /// [`search`](Self::search) with an explicit current date.
    pub async fn search_on(&self, fragment: &str, today: NaiveDate) -> Result<Vec<Book>> {
        self.list_books_on(&BookFilter::title_contains(fragment), today)
            .await
    }

    /// Books currently reserved (not leased) by `patron`.
    pub async fn reservations_for(&self, patron: &Patron) -> Result<Vec<Book>> {
        self.reservations_for_on(patron, Self::today()).await
    }

    /// [`reservations_for`](Self::reservations_for) with an explicit
    /// current date.
    pub async fn reservations_for_on(
        &self,
        patron: &Patron,
        today: NaiveDate,
    ) -> Result<Vec<Book>> {
        self.list_books_on(&BookFilter::reserved_by(patron.clone()), today)
            .await
    }

    // ========================================================================
    // Catalog editing
    // ========================================================================

    /// Add a new book to the catalog; it starts `Available`.
    pub async fn add_book(&self, details: BookDetails) -> Result<Book> {
        self.sweep_as_of(Self::today()).await?;
        self.store.insert(details).await
    }

    /// Update a book's descriptive metadata. Lifecycle fields are untouched.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown id, `Conflict` on a lost write race.
    pub async fn update_details(&self, id: BookId, details: BookDetails) -> Result<Book> {
        self.sweep_as_of(Self::today()).await?;
        let book = self.load(id).await?;
        self.store
            .update(&book.with_details(details), book.version)
            .await
    }

    /// Remove a book from the catalog regardless of its lifecycle state.
    /// Returns whether a record was deleted.
    pub async fn remove_book(&self, id: BookId) -> Result<bool> {
        self.sweep_as_of(Self::today()).await?;
        self.store.remove(id).await
    }

    // ========================================================================
    // Account deletion gating
    // ========================================================================

    /// Whether `patron`'s account may be deleted. False while any book is
    /// leased to them; a pending reservation does not block deletion.
    pub async fn can_delete_account(&self, patron: &Patron) -> Result<bool> {
        self.can_delete_account_on(patron, Self::today()).await
    }

    /// [`can_delete_account`](Self::can_delete_account) with an explicit
    /// current date.
    pub async fn can_delete_account_on(&self, patron: &Patron, today: NaiveDate) -> Result<bool> {
        self.sweep_as_of(today).await?;
        Ok(!self.store.holds_lease(patron).await?)
    }

    /// Hook for the account-deletion workflow: clears every reservation the
    /// deleted patron still holds, so no record names a patron that no
    /// longer exists. Returns how many reservations were cleared.
    pub async fn on_account_deleted(&self, patron: &Patron) -> Result<u64> {
        let cleared = self.store.release_reservations(patron).await?;
        if cleared > 0 {
            tracing::info!(patron = %patron, cleared, "released reservations of deleted account");
        }
        Ok(cleared)
    }

    // ========================================================================
    // Expiry sweep
    // ========================================================================

    /// Drop every reservation whose deadline is strictly before today.
    pub async fn sweep(&self) -> Result<u64> {
        self.sweep_as_of(Self::today()).await
    }

    /// [`sweep`](Self::sweep) with an explicit current date.
    ///
    /// The sweep is idempotent, so a transient store conflict (another task
    /// sweeping or writing the same rows) is retried once before being
    /// surfaced.
    pub async fn sweep_as_of(&self, as_of: NaiveDate) -> Result<u64> {
        let dropped = match self.store.expire_reservations(as_of).await {
            Ok(dropped) => dropped,
            Err(err) if err.is_conflict() => {
                tracing::debug!(%as_of, "expiry sweep hit a write conflict, retrying once");
                self.store.expire_reservations(as_of).await?
            }
            Err(err) => return Err(err),
        };
        if dropped > 0 {
            tracing::debug!(%as_of, dropped, "expired overdue reservations");
        }
        Ok(dropped)
    }

    async fn load(&self, id: BookId) -> Result<Book> {
        self.store
            .get(id)
            .await?
            .ok_or(CirculationError::NotFound(id))
    }
}
