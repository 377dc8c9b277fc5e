//! Error types for circulate-core.

use thiserror::Error;

use crate::book::BookId;

/// Core error type for lifecycle operations.
///
/// Every rejection a caller can observe is one of these variants:
/// - **`NotFound`**: the book id does not exist in the catalog
/// - **`InvalidTransition`**: the operation is not valid from the book's
///   current state (e.g. leasing an available book)
/// - **`Conflict`**: the state is already occupied, or a concurrent writer
///   got there first; the caller may retry
/// - **`Forbidden`**: ownership or privilege check failed
/// - **`CorruptRecord`**: a stored record violates the lifecycle invariants
/// - **`Storage`**: the underlying store failed
#[derive(Debug, Error)]
pub enum CirculationError {
    /// Book not found in the catalog
    #[error("book not found: {0}")]
    NotFound(BookId),

    /// Operation not valid from the book's current state
    #[error("cannot {action} a book that is {state}")]
    InvalidTransition {
        /// The attempted operation, e.g. "lease"
        action: &'static str,
        /// The state the book was in, e.g. "available"
        state: &'static str,
    },

    /// State already occupied, or lost a concurrent write race
    #[error("conflict: {0}")]
    Conflict(String),

    /// Ownership or privilege violation
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Stored record violates lifecycle invariants
    #[error("corrupt record for book {id}: {reason}")]
    CorruptRecord {
        /// The offending book id
        id: BookId,
        /// Which invariant the record breaks
        reason: String,
    },

    /// Underlying storage failure
    #[error("storage error: {0}")]
    Storage(String),
}

impl CirculationError {
    /// A conflict error with a formatted reason.
    #[must_use]
    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict(reason.into())
    }

    /// A forbidden error with a formatted reason.
    #[must_use]
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden(reason.into())
    }

    /// A storage error with a formatted reason.
    #[must_use]
    pub fn storage(reason: impl Into<String>) -> Self {
        Self::Storage(reason.into())
    }

    /// True if this error indicates a lost write race worth retrying.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

/// Result type alias for lifecycle operations.
pub type Result<T> = std::result::Result<T, CirculationError>;
