//! Where snapshot bytes live.
//!
//! The manager only ever reads or replaces the whole snapshot, so a store is
//! two operations. [`FileSnapshotStore`] writes crash-safely with the
//! temp-file-then-rename pattern; [`MemorySnapshotStore`] keeps the bytes in
//! memory for tests and embedders that persist elsewhere.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::Result;

/// Storage backend for persisted snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Read the current snapshot. `Ok(None)` when none has been written.
    async fn read(&self) -> Result<Option<Vec<u8>>>;

    /// Replace the snapshot with `bytes`.
    ///
    /// Implementations must not leave a partially written snapshot behind
    /// on failure.
    async fn write(&self, bytes: &[u8]) -> Result<()>;
}

/// Snapshot stored as a single file on disk.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    /// Store the snapshot at `path`. Parent directories are created on the
    /// first write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the snapshot file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn read(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No snapshot on disk");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let temp_path = make_temp_path(&self.path);

        if let Err(e) = write_synced(&temp_path, bytes).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        if let Err(e) = tokio::fs::rename(&temp_path, &self.path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        debug!(path = %self.path.display(), bytes = bytes.len(), "Wrote snapshot");
        Ok(())
    }
}

/// Write `bytes` to a fresh file and sync it to disk before returning.
async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await
}

/// `index.json` → `index.json.tmp`; `index` → `index.tmp`.
fn make_temp_path(path: &Path) -> PathBuf {
    let mut temp_path = path.to_path_buf();
    let extension = match path.extension() {
        Some(ext) => {
            let mut ext = ext.to_os_string();
            ext.push(".tmp");
            ext
        }
        None => std::ffi::OsString::from("tmp"),
    };
    temp_path.set_extension(extension);
    temp_path
}

/// Snapshot held in memory.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    bytes: Mutex<Option<Vec<u8>>>,
    writes: AtomicUsize,
}

impl MemorySnapshotStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `bytes`.
    #[must_use]
    pub fn with_contents(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: Mutex::new(Some(bytes.into())),
            writes: AtomicUsize::new(0),
        }
    }

    /// Copy of the current contents.
    pub async fn contents(&self) -> Option<Vec<u8>> {
        self.bytes.lock().await.clone()
    }

    /// Number of successful writes so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn read(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.bytes.lock().await.clone())
    }

    async fn write(&self, bytes: &[u8]) -> Result<()> {
        *self.bytes.lock().await = Some(bytes.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
