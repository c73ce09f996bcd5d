//! Error types for sqldeps operations.
//!
//! Errors fall into two groups:
//!
//! - **`Error`**: failures of the index infrastructure (snapshot I/O,
//!   serialization, configuration).
//! - **`ScanError`**: a single file could not be scanned. These are collected
//!   and reported but never halt indexing of other files, and they never
//!   erase what the index already knows about the failing file.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for sqldeps operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for sqldeps operations.
#[derive(Debug, Error)]
pub enum Error {
    /// File system operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration file or values
    #[error("configuration error: {0}")]
    Config(String),

    /// Writing the snapshot to its store failed
    #[error("persist error: {0}")]
    Persist(String),

    /// A file scan failed
    #[error(transparent)]
    Scan(#[from] ScanError),
}

/// A file that the external scanner could not turn into definitions and
/// references.
#[derive(Debug, Clone, Error)]
#[error("{}: {message}", .path.display())]
pub struct ScanError {
    /// Path of the file that failed
    pub path: PathBuf,
    /// Human-readable reason
    pub message: String,
}

impl ScanError {
    /// Create a scan error for a file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}
