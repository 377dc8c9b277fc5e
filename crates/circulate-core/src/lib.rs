//! Circulate-core - Book circulation lifecycle for a small library system
//!
//! This crate provides:
//! - The book lifecycle state machine (`Available` / `Reserved` / `Leased`)
//! - The lifecycle manager that owns every transition and the expiry sweep
//! - The catalog store abstraction with versioned (compare-and-update) writes
//! - An in-memory store for tests and embedding
//!
//! Authentication, page rendering, and transport are external collaborators;
//! callers hand in a [`Patron`] identity and render the typed results.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod book;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod store;

pub use book::{Book, BookDetails, BookId, BookState};
pub use error::{CirculationError, Result};
pub use identity::{IdentityProvider, Patron};
pub use lifecycle::LifecycleManager;
pub use store::{BookFilter, CatalogStore, MemoryCatalog};
