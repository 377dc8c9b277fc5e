//! Book aggregate and lifecycle state machine.
//!
//! A book is always in exactly one of three states:
//!
//! - `Available` - on the shelf, no holder
//! - `Reserved` - held for a patron until a calendar date
//! - `Leased` - checked out to a patron, no expiry
//!
//! The tagged [`BookState`] enum makes the lifecycle invariants structural:
//! a lease always names a holder, a reservation always carries both holder
//! and deadline, and the two never overlap. The flat nullable-column shape
//! used by storage backends is translated at the boundary via
//! [`BookState::from_columns`] / [`BookState::to_columns`], which is where
//! invariant violations in stored data are detected.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{CirculationError, Result};
use crate::identity::Patron;

// ============================================================================
// Identifiers & metadata
// ============================================================================

/// Unique, stable book identifier assigned by the catalog store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BookId(i64);

impl BookId {
    /// Wrap a raw store identifier.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw identifier.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for BookId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Descriptive catalog metadata, mutable by catalog-editing operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookDetails {
    /// Book title.
    pub title: String,
    /// Publisher name, if known.
    pub publisher: Option<String>,
    /// Author name, if known.
    pub author: Option<String>,
}

impl BookDetails {
    /// Details with only a title set.
    #[must_use]
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            publisher: None,
            author: None,
        }
    }
}

// ============================================================================
// Lifecycle state machine
// ============================================================================

/// Lifecycle state of a book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum BookState {
    /// On the shelf; anyone may reserve it.
    Available,
    /// Held for `holder`; must be converted to a lease on or before `until`.
    Reserved {
        /// The reserving patron.
        holder: Patron,
        /// Last calendar date on which the reservation is still valid.
        until: NaiveDate,
    },
    /// Checked out to `holder`; no expiry.
    Leased {
        /// The leasing patron.
        holder: Patron,
    },
}

impl BookState {
    /// Short lowercase state name used in error messages and storage.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Reserved { .. } => "reserved",
            Self::Leased { .. } => "leased",
        }
    }

    /// The patron currently holding the book, if any.
    #[must_use]
    pub const fn holder(&self) -> Option<&Patron> {
        match self {
            Self::Available => None,
            Self::Reserved { holder, .. } | Self::Leased { holder } => Some(holder),
        }
    }

    /// True if the book is on the shelf.
    #[must_use]
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }

    /// True if the book is reserved and not yet leased.
    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        matches!(self, Self::Reserved { .. })
    }

    /// True if the book is checked out.
    #[must_use]
    pub const fn is_leased(&self) -> bool {
        matches!(self, Self::Leased { .. })
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// Reserve an available book for `patron` until `until`.
    ///
    /// # Errors
    ///
    /// Returns `Conflict` if the book is already reserved or leased.
    pub fn reserve(&self, patron: Patron, until: NaiveDate) -> Result<Self> {
        match self {
            Self::Available => Ok(Self::Reserved {
                holder: patron,
                until,
            }),
            Self::Reserved { holder, .. } => Err(CirculationError::conflict(format!(
                "book is already reserved by {holder}"
            ))),
            Self::Leased { .. } => Err(CirculationError::conflict("book is already leased")),
        }
    }

    /// Promote a reservation to a lease.
    ///
    /// The reservation deadline is dropped: once leased, a book has no
    /// expiry, and a stale deadline must not resurface on a later return.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` if the book is not reserved.
    pub fn lease(&self) -> Result<Self> {
        match self {
            Self::Reserved { holder, .. } => Ok(Self::Leased {
                holder: holder.clone(),
            }),
            Self::Available | Self::Leased { .. } => Err(CirculationError::InvalidTransition {
                action: "lease",
                state: self.name(),
            }),
        }
    }

    /// Take the book back onto the shelf.
    ///
    /// Permissive by design: returning an already-available book is a no-op,
    /// so the operation is safe to repeat.
    #[must_use]
    pub const fn give_back(&self) -> Self {
        Self::Available
    }

    /// Cancel a reservation.
    ///
    /// Only the reserving patron may cancel, unless the caller is
    /// privileged (a librarian).
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` if a non-privileged patron tries to cancel
    /// someone else's reservation, `InvalidTransition` if the book is not
    /// reserved.
    pub fn cancel(&self, patron: &Patron, privileged: bool) -> Result<Self> {
        match self {
            Self::Reserved { holder, .. } if privileged || holder == patron => Ok(Self::Available),
            Self::Reserved { .. } => Err(CirculationError::forbidden(format!(
                "reservation is held by another patron, not {patron}"
            ))),
            Self::Available | Self::Leased { .. } => Err(CirculationError::InvalidTransition {
                action: "cancel a reservation on",
                state: self.name(),
            }),
        }
    }

    /// True if this is a reservation whose deadline has passed as of `as_of`.
    ///
    /// The comparison is strict: a reservation is still valid on its stored
    /// date and expires the day after. Leases never expire.
    #[must_use]
    pub fn is_expired(&self, as_of: NaiveDate) -> bool {
        match self {
            Self::Reserved { until, .. } => *until < as_of,
            Self::Available | Self::Leased { .. } => false,
        }
    }

    /// Demote an expired reservation to `Available`; otherwise unchanged.
    /// Idempotent.
    #[must_use]
    pub fn expire(&self, as_of: NaiveDate) -> Self {
        if self.is_expired(as_of) {
            Self::Available
        } else {
            self.clone()
        }
    }

    // ------------------------------------------------------------------
    // Storage boundary
    // ------------------------------------------------------------------

    /// Decode the flat nullable-column shape into a state, validating the
    /// lifecycle invariants.
    ///
    /// # Errors
    ///
    /// Returns `CorruptRecord` when the columns violate an invariant:
    /// a lease or reservation without a holder, a holder with neither,
    /// or a leased book still carrying a reservation deadline.
    pub fn from_columns(
        id: BookId,
        holder: Option<Patron>,
        reserved_until: Option<NaiveDate>,
        leased: bool,
    ) -> Result<Self> {
        let corrupt = |reason: &str| CirculationError::CorruptRecord {
            id,
            reason: reason.to_string(),
        };

        match (holder, reserved_until, leased) {
            (None, None, false) => Ok(Self::Available),
            (Some(holder), Some(until), false) => Ok(Self::Reserved { holder, until }),
            (Some(holder), None, true) => Ok(Self::Leased { holder }),
            (None, _, true) => Err(corrupt("leased with no holder")),
            (None, Some(_), false) => Err(corrupt("reservation with no holder")),
            (Some(_), None, false) => Err(corrupt("holder with neither reservation nor lease")),
            (Some(_), Some(_), true) => Err(corrupt("leased book still carries a reservation")),
        }
    }

    /// Encode the state as the flat column triple
    /// `(holder, reserved_until, leased)`.
    #[must_use]
    pub const fn to_columns(&self) -> (Option<&Patron>, Option<NaiveDate>, bool) {
        match self {
            Self::Available => (None, None, false),
            Self::Reserved { holder, until } => (Some(holder), Some(*until), false),
            Self::Leased { holder } => (Some(holder), None, true),
        }
    }
}

// ============================================================================
// Book aggregate
// ============================================================================

/// A catalog record: identity, metadata, lifecycle state, and version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Unique identifier.
    pub id: BookId,
    /// Descriptive metadata.
    pub details: BookDetails,
    /// Current lifecycle state.
    pub state: BookState,
    /// Optimistic-concurrency token; bumped by the store on every write.
    pub version: i64,
}

impl Book {
    /// Copy of this book with a different lifecycle state.
    ///
    /// The version is untouched: the store bumps it when the write lands.
    #[must_use]
    pub fn with_state(&self, state: BookState) -> Self {
        Self {
            state,
            ..self.clone()
        }
    }

    /// Copy of this book with different metadata.
    #[must_use]
    pub fn with_details(&self, details: BookDetails) -> Self {
        Self {
            details,
            ..self.clone()
        }
    }

    /// The patron currently holding the book, if any.
    #[must_use]
    pub const fn holder(&self) -> Option<&Patron> {
        self.state.holder()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn alice() -> Patron {
        Patron::new("alice")
    }

    fn bob() -> Patron {
        Patron::new("bob")
    }

    // ------------------------------------------------------------------
    // Reserve
    // ------------------------------------------------------------------

    #[test]
    fn reserve_available_succeeds() {
        let until = date(2024, 3, 16);
        let next = BookState::Available.reserve(alice(), until).unwrap();
        assert_eq!(
            next,
            BookState::Reserved {
                holder: alice(),
                until
            }
        );
    }

    #[test]
    fn reserve_reserved_is_conflict() {
        let state = BookState::Reserved {
            holder: alice(),
            until: date(2024, 3, 16),
        };
        let err = state.reserve(bob(), date(2024, 3, 17)).unwrap_err();
        assert!(err.is_conflict());
        // the reservation is untouched
        assert!(state.is_reserved());
    }

    #[test]
    fn reserve_leased_is_conflict() {
        let state = BookState::Leased { holder: alice() };
        assert!(state.reserve(bob(), date(2024, 3, 17)).unwrap_err().is_conflict());
    }

    // ------------------------------------------------------------------
    // Lease
    // ------------------------------------------------------------------

    #[test]
    fn lease_reserved_keeps_holder_and_drops_deadline() {
        let state = BookState::Reserved {
            holder: bob(),
            until: date(2024, 3, 16),
        };
        let next = state.lease().unwrap();
        assert_eq!(next, BookState::Leased { holder: bob() });
        let (_, until, _) = next.to_columns();
        assert!(until.is_none());
    }

    #[test]
    fn lease_available_is_invalid_transition() {
        let err = BookState::Available.lease().unwrap_err();
        assert!(matches!(
            err,
            CirculationError::InvalidTransition {
                action: "lease",
                state: "available"
            }
        ));
    }

    #[test]
    fn lease_leased_is_invalid_transition() {
        let state = BookState::Leased { holder: alice() };
        assert!(matches!(
            state.lease().unwrap_err(),
            CirculationError::InvalidTransition { state: "leased", .. }
        ));
    }

    // ------------------------------------------------------------------
    // Return
    // ------------------------------------------------------------------

    #[test]
    fn give_back_is_idempotent_from_every_state() {
        let states = [
            BookState::Available,
            BookState::Reserved {
                holder: alice(),
                until: date(2024, 3, 16),
            },
            BookState::Leased { holder: alice() },
        ];
        for state in states {
            assert_eq!(state.give_back(), BookState::Available);
        }
        assert_eq!(
            BookState::Available.give_back().give_back(),
            BookState::Available
        );
    }

    // ------------------------------------------------------------------
    // Cancel
    // ------------------------------------------------------------------

    #[test]
    fn owner_can_cancel_own_reservation() {
        let state = BookState::Reserved {
            holder: alice(),
            until: date(2024, 3, 16),
        };
        assert_eq!(state.cancel(&alice(), false).unwrap(), BookState::Available);
    }

    #[test]
    fn non_owner_cancel_is_forbidden() {
        let state = BookState::Reserved {
            holder: alice(),
            until: date(2024, 3, 16),
        };
        assert!(matches!(
            state.cancel(&bob(), false).unwrap_err(),
            CirculationError::Forbidden(_)
        ));
    }

    #[test]
    fn librarian_can_cancel_any_reservation() {
        let state = BookState::Reserved {
            holder: alice(),
            until: date(2024, 3, 16),
        };
        assert_eq!(state.cancel(&bob(), true).unwrap(), BookState::Available);
    }

    #[test]
    fn cancel_on_available_or_leased_is_invalid_transition() {
        for state in [BookState::Available, BookState::Leased { holder: alice() }] {
            assert!(matches!(
                state.cancel(&alice(), true).unwrap_err(),
                CirculationError::InvalidTransition { .. }
            ));
        }
    }

    // ------------------------------------------------------------------
    // Expiry
    // ------------------------------------------------------------------

    #[test]
    fn reservation_valid_on_its_stored_date() {
        let until = date(2024, 3, 16);
        let state = BookState::Reserved {
            holder: alice(),
            until,
        };
        assert!(!state.is_expired(until));
        assert_eq!(state.expire(until), state);
    }

    #[test]
    fn reservation_expires_the_day_after() {
        let state = BookState::Reserved {
            holder: alice(),
            until: date(2024, 3, 16),
        };
        assert!(state.is_expired(date(2024, 3, 17)));
        assert_eq!(state.expire(date(2024, 3, 17)), BookState::Available);
    }

    #[test]
    fn expiry_is_correct_across_month_and_year_boundaries() {
        // the original compared formatted date strings, which breaks here
        let state = BookState::Reserved {
            holder: alice(),
            until: date(2023, 12, 31),
        };
        assert!(!state.is_expired(date(2023, 12, 31)));
        assert!(state.is_expired(date(2024, 1, 1)));
    }

    #[test]
    fn leases_never_expire() {
        let state = BookState::Leased { holder: alice() };
        assert!(!state.is_expired(date(2999, 1, 1)));
        assert_eq!(state.expire(date(2999, 1, 1)), state);
    }

    #[test]
    fn expire_is_idempotent() {
        let state = BookState::Reserved {
            holder: alice(),
            until: date(2024, 3, 16),
        };
        let swept = state.expire(date(2024, 3, 18));
        assert_eq!(swept.expire(date(2024, 3, 18)), swept);
    }

    // ------------------------------------------------------------------
    // Storage boundary invariants
    // ------------------------------------------------------------------

    #[test]
    fn columns_round_trip_all_states() {
        let id = BookId::new(1);
        let states = [
            BookState::Available,
            BookState::Reserved {
                holder: alice(),
                until: date(2024, 3, 16),
            },
            BookState::Leased { holder: alice() },
        ];
        for state in states {
            let (holder, until, leased) = state.to_columns();
            let decoded =
                BookState::from_columns(id, holder.cloned(), until, leased).unwrap();
            assert_eq!(decoded, state);
        }
    }

    #[test]
    fn states_serialize_with_a_state_tag() {
        // the shape the presentation layer renders from
        let state = BookState::Reserved {
            holder: alice(),
            until: date(2024, 3, 16),
        };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["state"], "reserved");
        assert_eq!(json["holder"], "alice");
        assert_eq!(json["until"], "2024-03-16");

        let back: BookState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);

        assert_eq!(
            serde_json::to_value(&BookState::Available).unwrap()["state"],
            "available"
        );
    }

    #[test]
    fn lease_without_holder_is_corrupt() {
        let err = BookState::from_columns(BookId::new(7), None, None, true).unwrap_err();
        assert!(matches!(err, CirculationError::CorruptRecord { .. }));
    }

    #[test]
    fn reservation_without_holder_is_corrupt() {
        let err =
            BookState::from_columns(BookId::new(7), None, Some(date(2024, 3, 16)), false)
                .unwrap_err();
        assert!(matches!(err, CirculationError::CorruptRecord { .. }));
    }

    #[test]
    fn orphan_holder_is_corrupt() {
        let err = BookState::from_columns(BookId::new(7), Some(alice()), None, false).unwrap_err();
        assert!(matches!(err, CirculationError::CorruptRecord { .. }));
    }

    #[test]
    fn leased_with_reservation_deadline_is_corrupt() {
        let err = BookState::from_columns(
            BookId::new(7),
            Some(alice()),
            Some(date(2024, 3, 16)),
            true,
        )
        .unwrap_err();
        assert!(matches!(err, CirculationError::CorruptRecord { .. }));
    }
}
