//! Patron identity types.
//!
//! Authentication lives outside this crate; the core only needs an opaque,
//! comparable identity for ownership checks and account-deletion gating.

use serde::{Deserialize, Serialize};

/// An identified library user who may reserve, lease, or hold books.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Patron(String);

impl Patron {
    /// Create a patron identity from an opaque user name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Patron {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Patron {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Source of the acting patron's identity.
///
/// Implemented by the excluded authentication layer; the lifecycle manager
/// itself never resolves identities, callers pass them in explicitly.
pub trait IdentityProvider: Send + Sync {
    /// The currently authenticated patron, if any.
    fn current(&self) -> Option<Patron>;
}
