//! Circulate - durable storage shell for the book circulation core
//!
//! Pairs the pure lifecycle logic in `circulate-core` with a SQLite-backed
//! [`CatalogStore`]. Typical wiring:
//!
//! ```rust,no_run
//! use circulate::{CatalogDb, LifecycleManager};
//!
//! # async fn wire() -> circulate::Result<()> {
//! let db = CatalogDb::create_or_open(std::path::Path::new("catalog.db")).await?;
//! let manager = LifecycleManager::new(db);
//! # let _ = manager;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod db;

pub use circulate_core::{
    Book, BookDetails, BookFilter, BookId, BookState, CatalogStore, CirculationError,
    IdentityProvider, LifecycleManager, MemoryCatalog, Patron, Result,
};
pub use db::CatalogDb;
