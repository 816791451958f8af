//! Error types for logvfs
//!
//! Provides a unified error type for the log, the index collaborators and
//! the cluster layer.

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for logvfs operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors (reader/writer collaborators, propagated unchanged)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Log Errors
    // -------------------------------------------------------------------------
    #[error(
        "Data corruption{}: {reason}",
        .address.map(|a| format!(" at address {a}")).unwrap_or_default()
    )]
    DataCorruption { address: Option<u64>, reason: String },

    #[error("Address {address} is beyond the log's high address {high_address}")]
    InvalidAddress { address: u64, high_address: u64 },

    #[error("Loggable of {size} bytes does not fit into a segment of {max} bytes")]
    RecordTooLarge { size: u64, max: u64 },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Log is closed")]
    LogClosed,

    #[error("Log failed: a torn append could not be rolled back")]
    LogFailed,

    // -------------------------------------------------------------------------
    // Index Errors
    // -------------------------------------------------------------------------
    #[error("Cursor is closed")]
    CursorClosed,

    // -------------------------------------------------------------------------
    // Cluster Errors
    // -------------------------------------------------------------------------
    #[error("No current cluster")]
    NoCurrentCluster,

    #[error("Cluster iterator is closed")]
    IteratorClosed,

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    // -------------------------------------------------------------------------
    // Virtual File System Errors
    // -------------------------------------------------------------------------
    #[error("File already exists: {0}")]
    FileExists(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Backup Errors
    // -------------------------------------------------------------------------
    #[error("Backup interrupted")]
    BackupInterrupted,
}

impl StoreError {
    /// Corruption of the log record at `address`
    pub fn corruption(address: u64, reason: impl Into<String>) -> Self {
        StoreError::DataCorruption {
            address: Some(address),
            reason: reason.into(),
        }
    }

    /// Corruption of decoded data with no log address (keys, clusters)
    pub fn corrupted(reason: impl Into<String>) -> Self {
        StoreError::DataCorruption {
            address: None,
            reason: reason.into(),
        }
    }

    /// Whether this error reports a structurally invalid record or cluster
    pub fn is_corruption(&self) -> bool {
        matches!(self, StoreError::DataCorruption { .. })
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}
