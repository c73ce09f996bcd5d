//! CLI command implementations.

mod display;

pub mod cycles;
pub mod ingest;
pub mod remove;
pub mod report;
pub mod status;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use sqldeps::{FileSnapshotStore, IndexConfig, IndexManager};

/// Open the index of `workspace` using its configuration, or defaults.
async fn open_index(workspace: &Path) -> anyhow::Result<IndexManager> {
    let config = IndexConfig::load_for_workspace(workspace)
        .await
        .with_context(|| format!("failed to load configuration for {}", workspace.display()))?;
    let snapshot_path = config.resolve_snapshot_path(workspace);
    tracing::debug!(path = %snapshot_path.display(), "Using snapshot");

    let store = Arc::new(FileSnapshotStore::new(snapshot_path));
    IndexManager::open(config, store)
        .await
        .context("failed to open workspace index")
}
