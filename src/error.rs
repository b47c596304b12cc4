//! Error types for partkv
//!
//! Provides a unified error type for all operations.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::TableFormat;

/// Result type alias using PartKvError
pub type Result<T> = std::result::Result<T, PartKvError>;

/// Unified error type for partkv operations
#[derive(Debug, Error)]
pub enum PartKvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Construction Errors (fatal, never retried)
    // -------------------------------------------------------------------------
    #[error("Storage initialization failed: {message}")]
    InitializationFailure {
        message: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Store path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    // -------------------------------------------------------------------------
    // Registry Errors
    // -------------------------------------------------------------------------
    #[error("Partition {0} already exists")]
    DuplicatePartition(i32),

    #[error("Partition {0} is not open in this engine")]
    UnknownPartition(i32),

    #[error("Engine is not open")]
    EngineNotOpen,

    #[error("Engine has been dropped")]
    EngineDropped,

    // -------------------------------------------------------------------------
    // Partition Storage Errors
    // -------------------------------------------------------------------------
    #[error("Partition {partition_id} was created as {found:?}, refusing to open it as {expected:?}")]
    FormatMismatch {
        partition_id: i32,
        expected: TableFormat,
        found: TableFormat,
    },

    #[error("Partition {0} is closed")]
    PartitionClosed(i32),

    #[error("Partition data corruption detected: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PartKvError {
    /// Wrap an I/O failure hit while bringing the engine up
    pub(crate) fn init(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::InitializationFailure {
            message: message.into(),
            source,
        }
    }
}
