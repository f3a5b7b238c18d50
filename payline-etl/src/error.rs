//! Error types for payline-etl
//!
//! Fatal, run-level failures only. Row-level problems are collected as
//! [`crate::diagnostics::RowIssue`] values and never abort a run.

use thiserror::Error;

/// Pipeline error type
#[derive(Debug, Error)]
pub enum EtlError {
    /// Missing input, bad argument or unusable configuration (pre-flight)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Snapshot integrity check failed; live data was not touched
    #[error("Checksum mismatch in snapshot '{snapshot}': {}", tables.join(", "))]
    ChecksumMismatch {
        snapshot: String,
        tables: Vec<String>,
    },

    /// Settlement for the period is locked and may not be regenerated
    #[error("Settlement {0} is locked")]
    SettlementLocked(String),

    /// No snapshot with the requested name
    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    /// Delimited-text reader error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot or seed document encoding error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// payline-common error (storage, configuration)
    #[error("Common error: {0}")]
    Common(#[from] payline_common::Error),
}

/// Convenience result type for pipeline operations
pub type EtlResult<T> = Result<T, EtlError>;
