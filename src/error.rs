//! Error types for the counts store
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using CountsError
pub type Result<T> = std::result::Result<T, CountsError>;

/// Unified error type for counts store operations
#[derive(Debug, Error)]
pub enum CountsError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Durable File Errors
    // -------------------------------------------------------------------------
    #[error("Counts store file {} is corrupt: {reason}", path.display())]
    Corruption { path: PathBuf, reason: String },

    #[error(
        "Neither counts store file is usable ({} and {}). \
         Delete both files to rebuild the counts store from the transaction history",
        first.display(),
        second.display()
    )]
    NoValidStoreFile { first: PathBuf, second: PathBuf },

    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Ordering Errors
    // -------------------------------------------------------------------------
    #[error("Cannot rotate backwards: requested tx {requested}, store is at tx {current}")]
    BackwardRotation { requested: u64, current: u64 },

    #[error("Transaction {tx_id} was already applied (gap-free watermark is {gap_free})")]
    WatermarkViolation { tx_id: u64, gap_free: u64 },

    // -------------------------------------------------------------------------
    // Snapshot Errors
    // -------------------------------------------------------------------------
    #[error("A counts snapshot is already in progress")]
    SnapshotInProgress,

    #[error("Timed out waiting for tx {tx_id} to be applied (gap-free watermark is {gap_free})")]
    SnapshotTimeout { tx_id: u64, gap_free: u64 },

    // -------------------------------------------------------------------------
    // Health Errors
    // -------------------------------------------------------------------------
    #[error("Counts store is unhealthy: {0}")]
    Unhealthy(String),

    #[error("Counts store is read-only: {0}")]
    ReadOnly(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CountsError {
    /// Build a corruption error for the given file
    pub fn corruption(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        CountsError::Corruption {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<bincode::Error> for CountsError {
    fn from(e: bincode::Error) -> Self {
        CountsError::Serialization(e.to_string())
    }
}
