//! Seam for the external SQL extractor.
//!
//! Tokenizing, statement splitting, and walking the AST all happen behind
//! [`FileScanner`]. The index only sees the typed records it returns.

use async_trait::async_trait;

use crate::error::ScanError;
use crate::types::ScanResult;

/// Produces the definitions and references of one SQL file.
#[async_trait]
pub trait FileScanner: Send + Sync {
    /// Scan `path`.
    ///
    /// The `file_path` of returned records may be left empty; the manager
    /// attributes every record to `path` when applying the result.
    ///
    /// # Errors
    ///
    /// Returns a [`ScanError`] if the file cannot be read or parsed. The
    /// manager keeps whatever it already knew about the file in that case.
    async fn scan(&self, path: &str) -> Result<ScanResult, ScanError>;
}
