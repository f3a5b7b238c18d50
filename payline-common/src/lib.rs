//! # payline common library
//!
//! Shared infrastructure for the payline ledger tools:
//! - Bootstrap configuration and root folder resolution
//! - Database initialization and declarative table schemas
//! - Reference, record and settlement models
//! - The row-store seam and its SQLite implementation

pub mod config;
pub mod db;
pub mod error;
pub mod store;
pub mod time;

pub use error::{Error, Result};
pub use store::{Filter, Row, RowStore, SqliteRowStore};
