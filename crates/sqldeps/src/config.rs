//! Index configuration.
//!
//! Settings live in `.sqldeps/config.yaml` under the workspace root. Every
//! key is optional:
//!
//! ```yaml
//! snapshot-path: .sqldeps/index.json
//! persist-delay-ms: 1500
//! max-snapshot-bytes: 4194304
//! max-retry-delay-ms: 60000
//! scan-concurrency: 8
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::debug;

use crate::error::{Error, Result};

/// Directory under the workspace root that holds sqldeps state.
pub const SQLDEPS_DIR_NAME: &str = ".sqldeps";

/// Configuration file name inside [`SQLDEPS_DIR_NAME`].
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Default snapshot file name inside [`SQLDEPS_DIR_NAME`].
pub const SNAPSHOT_FILE_NAME: &str = "index.json";

/// Settings for [`IndexManager`](crate::IndexManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct IndexConfig {
    /// Snapshot location, relative to the workspace root unless absolute
    pub snapshot_path: PathBuf,

    /// Quiet period before a scheduled persist fires
    pub persist_delay_ms: u64,

    /// Snapshots larger than this (estimated) evict their oldest files
    pub max_snapshot_bytes: usize,

    /// Upper bound on the backoff between failed persist attempts
    pub max_retry_delay_ms: u64,

    /// Files scanned at once by `index_files`
    pub scan_concurrency: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            snapshot_path: Path::new(SQLDEPS_DIR_NAME).join(SNAPSHOT_FILE_NAME),
            persist_delay_ms: 1500,
            max_snapshot_bytes: 4 * 1024 * 1024,
            max_retry_delay_ms: 60_000,
            scan_concurrency: 8,
        }
    }
}

impl IndexConfig {
    /// Load and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read and `Error::Config` if
    /// it is not valid YAML or holds invalid values.
    pub async fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).await?;
        let config: Self =
            serde_yaml::from_str(&content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `<root>/.sqldeps/config.yaml`, falling back to defaults when the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// See [`IndexConfig::load`].
    pub async fn load_for_workspace(root: &Path) -> Result<Self> {
        let path = root.join(SQLDEPS_DIR_NAME).join(CONFIG_FILE_NAME);
        if !fs::try_exists(&path).await? {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(&path).await
    }

    /// Reject values the manager cannot work with.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` naming the offending key.
    pub fn validate(&self) -> Result<()> {
        if self.scan_concurrency == 0 {
            return Err(Error::Config("scan-concurrency must be at least 1".to_string()));
        }
        if self.max_snapshot_bytes == 0 {
            return Err(Error::Config("max-snapshot-bytes must be positive".to_string()));
        }
        if self.snapshot_path.as_os_str().is_empty() {
            return Err(Error::Config("snapshot-path must not be empty".to_string()));
        }
        Ok(())
    }

    /// Snapshot location resolved against `root`.
    #[must_use]
    pub fn resolve_snapshot_path(&self, root: &Path) -> PathBuf {
        if self.snapshot_path.is_absolute() {
            self.snapshot_path.clone()
        } else {
            root.join(&self.snapshot_path)
        }
    }

    /// Debounce delay as a [`Duration`].
    #[must_use]
    pub fn persist_delay(&self) -> Duration {
        Duration::from_millis(self.persist_delay_ms)
    }

    /// Retry backoff ceiling as a [`Duration`].
    #[must_use]
    pub fn max_retry_delay(&self) -> Duration {
        Duration::from_millis(self.max_retry_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults() {
        let config = IndexConfig::default();

        assert_eq!(config.persist_delay(), Duration::from_millis(1500));
        assert_eq!(config.max_snapshot_bytes, 4_194_304);
        assert_eq!(config.max_retry_delay(), Duration::from_secs(60));
        assert_eq!(config.scan_concurrency, 8);
        assert_eq!(config.snapshot_path, Path::new(".sqldeps/index.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_yaml_keeps_other_defaults() {
        let config: IndexConfig = serde_yaml::from_str("persist-delay-ms: 250\n").unwrap();

        assert_eq!(config.persist_delay_ms, 250);
        assert_eq!(config.scan_concurrency, 8);
    }

    #[test]
    fn relative_snapshot_path_resolves_against_root() {
        let config = IndexConfig::default();

        assert_eq!(
            config.resolve_snapshot_path(Path::new("/ws")),
            Path::new("/ws/.sqldeps/index.json")
        );
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config = IndexConfig {
            scan_concurrency: 0,
            ..IndexConfig::default()
        };

        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("scan-concurrency"));
    }

    #[tokio::test]
    async fn missing_config_file_yields_defaults() {
        let dir = TempDir::new().unwrap();

        let config = IndexConfig::load_for_workspace(dir.path()).await.unwrap();

        assert_eq!(config, IndexConfig::default());
    }

    #[tokio::test]
    async fn loads_config_from_workspace() {
        let dir = TempDir::new().unwrap();
        let config_dir = dir.path().join(SQLDEPS_DIR_NAME);
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(
            config_dir.join(CONFIG_FILE_NAME),
            "snapshot-path: cache/deps.json\nmax-snapshot-bytes: 1024\n",
        )
        .unwrap();

        let config = IndexConfig::load_for_workspace(dir.path()).await.unwrap();

        assert_eq!(config.snapshot_path, Path::new("cache/deps.json"));
        assert_eq!(config.max_snapshot_bytes, 1024);
    }

    #[tokio::test]
    async fn invalid_yaml_is_a_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "scan-concurrency: [not, a, number]\n").unwrap();

        let err = IndexConfig::load(&path).await.unwrap_err();

        assert!(matches!(err, Error::Config(_)));
    }
}
