//! Persistent migration state.
//!
//! SQLite-backed record of catalog entries and their pages. It is what makes
//! a populate run resumable:
//! - Entries and pages are created idempotently, so re-running discovery and
//!   scheduling never duplicates work
//! - Page status tells the transfer phase what is left to do
//! - Stored request ids let the report run long after the transfer

pub mod db;
pub mod error;
pub mod schema;
pub mod types;

pub use db::{SqliteStatusStore, StatusStore};
pub use types::{CatalogEntry, NewPage, PageDescriptor, PageStatus, TransferRunStats};
