//! # payline-etl
//!
//! Ledger migration and settlement pipeline:
//! - Reference resolution of free-text tokens to entity ids
//! - Ingestion of delimited sheets into canonical records
//! - Validation with row-level diagnostics
//! - Chunked persistence with per-record fallback
//! - Monthly settlement calculation, generation and locking
//! - JSON snapshots with checksum-verified rollback
//!
//! The `payline-etl` binary exposes each of these as a subcommand; the
//! [`commands`] module holds the functions behind them.

pub mod backup;
pub mod commands;
pub mod diagnostics;
pub mod error;
pub mod ingest;
pub mod persistence;
pub mod resolver;
pub mod settlement;
pub mod utils;
pub mod validation;

pub use crate::error::{EtlError, EtlResult};
