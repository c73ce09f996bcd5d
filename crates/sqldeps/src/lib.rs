//! # sqldeps: SQL Workspace Dependency Index
//!
//! sqldeps keeps a cross-file map of the tables, views, and CTEs a SQL
//! workspace declares and the places that use them. From that map it derives
//! a dependency graph that flags definitions nobody uses ("orphaned") and
//! references that resolve to nothing in the workspace ("missing").
//!
//! ## Design
//!
//! - **Incremental** - one changed file costs work proportional to that file,
//!   never a rescan of the workspace
//! - **Consistent** - re-indexing a file replaces its entries, so repeated
//!   or out-of-order events never leave duplicates behind
//! - **Bounded persistence** - snapshots are debounced and capped in size
//! - **Scanner agnostic** - SQL parsing lives behind [`FileScanner`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use sqldeps::{Definition, DefinitionKind, FileSnapshotStore, IndexConfig, IndexManager, Reference};
//! use std::sync::Arc;
//!
//! # async fn example() -> sqldeps::Result<()> {
//! let store = Arc::new(FileSnapshotStore::new(".sqldeps/index.json"));
//! let manager = IndexManager::open(IndexConfig::default(), store).await?;
//!
//! manager
//!     .update_file(
//!         "models/orders.sql",
//!         vec![Definition::new("orders", DefinitionKind::Table, "", 1)],
//!         vec![Reference::new("customers", "", 12)],
//!     )
//!     .await;
//!
//! let graph = manager.graph().await;
//! println!("missing: {:?}", graph.stats.missing_definitions);
//!
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

mod config;
mod error;
mod graph;
mod index;
mod key;
mod manager;
mod scanner;
mod snapshot;
mod stats;
mod store;
mod types;

pub use config::{CONFIG_FILE_NAME, IndexConfig, SNAPSHOT_FILE_NAME, SQLDEPS_DIR_NAME};
pub use error::{Error, Result, ScanError};
pub use graph::{
    DependencyEdge, FileEdge, GraphBuilder, WorkspaceDependencyGraph, WorkspaceStats, build_graph,
};
pub use index::WorkspaceIndex;
pub use key::{TableKey, normalize_key};
pub use manager::{IndexManager, IndexRunStats, PersistOutcome, PersistStats};
pub use scanner::FileScanner;
pub use snapshot::{
    DefinitionEntry, ReferenceEntry, SNAPSHOT_VERSION, Snapshot, decode as decode_snapshot,
    estimate_serialized_index_size_bytes,
};
pub use stats::{
    DefinitionDetail, DetailedWorkspaceStats, IndexStatus, IndexStatusLevel,
    MissingDefinitionDetail, build_detailed_workspace_stats, build_index_status,
    classify_index_status,
};
pub use store::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
pub use types::{Definition, DefinitionKind, Reference, ScanResult};
