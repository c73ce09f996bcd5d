//! Owner of the live index and its persistence.
//!
//! [`IndexManager`] is a cheaply cloneable handle. All clones share one
//! index, one debounce timer, and one snapshot store.
//!
//! # Concurrency
//!
//! - The index sits behind a `tokio::sync::RwLock`. Updates take the write
//!   lock and swap a file's entries without awaiting, so readers see each
//!   file either fully old or fully new.
//! - At most one persist timer is pending per manager. Scheduling again
//!   aborts it and starts a new one tagged with a higher generation; a timer
//!   that wakes up with a stale generation does nothing.
//! - Persists are serialized by a write lock. The snapshot is captured under
//!   the index read lock, which is released before any I/O.
//!
//! Timers are tokio tasks, so scheduling must happen inside a tokio runtime.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::{Arc, Mutex as SyncMutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::IndexConfig;
use crate::error::{Error, Result, ScanError};
use crate::graph::{GraphBuilder, WorkspaceDependencyGraph};
use crate::index::WorkspaceIndex;
use crate::scanner::FileScanner;
use crate::snapshot::{self, Snapshot};
use crate::stats::{
    DetailedWorkspaceStats, IndexStatus, build_detailed_workspace_stats, build_index_status,
};
use crate::store::SnapshotStore;
use crate::types::{Definition, Reference, ScanResult};

/// Floor for retry backoff so a zero persist delay cannot spin.
const MIN_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Result of one successful persist.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistOutcome {
    /// Size of the snapshot written
    pub bytes_written: usize,
    /// Files left out of the snapshot to fit the size cap, oldest first
    pub evicted_files: Vec<String>,
}

/// Running persistence counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistStats {
    /// Successful writes
    pub writes: u64,
    /// Failed writes
    pub failures: u64,
    /// Failures since the last successful write
    pub consecutive_failures: u32,
    /// Message of the most recent failure
    pub last_error: Option<String>,
    /// Outcome of the most recent successful write
    pub last_outcome: Option<PersistOutcome>,
}

/// Summary of an [`IndexManager::index_files`] run.
#[derive(Debug, Default)]
pub struct IndexRunStats {
    /// Files scanned and applied
    pub files_indexed: usize,
    /// Files whose scan failed; their previous entries were kept
    pub failures: Vec<ScanError>,
    /// Wall time of the run
    pub duration: Duration,
}

#[derive(Debug, Default)]
struct TimerState {
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

struct Shared {
    index: RwLock<WorkspaceIndex>,
    store: Arc<dyn SnapshotStore>,
    config: IndexConfig,
    timer: SyncMutex<TimerState>,
    write_lock: Mutex<()>,
    persist_stats: SyncMutex<PersistStats>,
}

impl Shared {
    fn lock_timer(&self) -> MutexGuard<'_, TimerState> {
        self.timer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_stats(&self) -> MutexGuard<'_, PersistStats> {
        self.persist_stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let timer = self.timer.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = timer.pending.take() {
            handle.abort();
        }
    }
}

/// Handle to a workspace index and its persistence.
#[derive(Clone)]
pub struct IndexManager {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for IndexManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexManager")
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}

impl IndexManager {
    /// A manager over an empty index. Nothing is read from `store`.
    #[must_use]
    pub fn new(config: IndexConfig, store: Arc<dyn SnapshotStore>) -> Self {
        Self::with_initial_index(config, store, WorkspaceIndex::new())
    }

    /// A manager over the snapshot in `store`, or an empty index if there
    /// is no usable snapshot.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `config` is invalid. Snapshot problems
    /// are never errors; they produce a cold start.
    pub async fn open(config: IndexConfig, store: Arc<dyn SnapshotStore>) -> Result<Self> {
        config.validate()?;
        let index = read_snapshot(store.as_ref()).await.unwrap_or_default();
        info!(
            files = index.file_count(),
            definitions = index.definition_count(),
            references = index.reference_count(),
            "Opened workspace index"
        );
        Ok(Self::with_initial_index(config, store, index))
    }

    fn with_initial_index(
        config: IndexConfig,
        store: Arc<dyn SnapshotStore>,
        index: WorkspaceIndex,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                index: RwLock::new(index),
                store,
                config,
                timer: SyncMutex::new(TimerState::default()),
                write_lock: Mutex::new(()),
                persist_stats: SyncMutex::new(PersistStats::default()),
            }),
        }
    }

    /// Settings this manager runs with.
    #[must_use]
    pub fn config(&self) -> &IndexConfig {
        &self.shared.config
    }

    // === Mutation ===

    /// Replace everything known about `path` with the given entries and
    /// schedule a persist.
    ///
    /// Every entry is attributed to `path`. Entries with a blank name are
    /// dropped with a warning. Calling this twice with the same input leaves
    /// the index as if it had been called once.
    pub async fn update_file(
        &self,
        path: &str,
        definitions: Vec<Definition>,
        references: Vec<Reference>,
    ) {
        self.apply_update(path, definitions, references).await;
        self.schedule_persist();
    }

    async fn apply_update(
        &self,
        path: &str,
        definitions: Vec<Definition>,
        references: Vec<Reference>,
    ) {
        let definitions = retain_named(path, definitions, |d| d.name.as_str());
        let references = retain_named(path, references, |r| r.table_name.as_str());
        let (definition_count, reference_count) = (definitions.len(), references.len());

        self.shared
            .index
            .write()
            .await
            .replace_file(path, definitions, references, Utc::now());

        debug!(
            path,
            definitions = definition_count,
            references = reference_count,
            "Updated file in index"
        );
    }

    /// Forget everything known about `path`. Returns `false`, and changes
    /// nothing, if the file was not indexed.
    pub async fn remove_file(&self, path: &str) -> bool {
        let removed = self.shared.index.write().await.remove_file(path, Utc::now());
        if removed {
            debug!(path, "Removed file from index");
            self.schedule_persist();
        } else {
            debug!(path, "Ignoring removal of file that is not indexed");
        }
        removed
    }

    /// Scan one file and apply the result.
    ///
    /// # Errors
    ///
    /// Returns the scanner's error. The file's previous entries stay in the
    /// index untouched.
    pub async fn rescan_file(
        &self,
        scanner: &dyn FileScanner,
        path: &str,
    ) -> std::result::Result<(), ScanError> {
        match scanner.scan(path).await {
            Ok(ScanResult {
                definitions,
                references,
            }) => {
                self.update_file(path, definitions, references).await;
                Ok(())
            }
            Err(e) => {
                warn!(path, error = %e, "Scan failed, keeping previous entries");
                Err(e)
            }
        }
    }

    /// Scan many files, at most `scan_concurrency` at a time, and apply each
    /// result as it arrives. A single persist is scheduled at the end.
    pub async fn index_files<I>(&self, scanner: &dyn FileScanner, paths: I) -> IndexRunStats
    where
        I: IntoIterator<Item = String>,
    {
        let started = Instant::now();
        let concurrency = self.shared.config.scan_concurrency.max(1);

        let mut scans = stream::iter(paths)
            .map(|path| async move {
                let result = scanner.scan(&path).await;
                (path, result)
            })
            .buffer_unordered(concurrency);

        let mut stats = IndexRunStats::default();
        while let Some((path, result)) = scans.next().await {
            match result {
                Ok(scan) => {
                    self.apply_update(&path, scan.definitions, scan.references)
                        .await;
                    stats.files_indexed += 1;
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "Scan failed, keeping previous entries");
                    stats.failures.push(e);
                }
            }
        }

        if stats.files_indexed > 0 {
            self.schedule_persist();
        }

        stats.duration = started.elapsed();
        info!(
            files = stats.files_indexed,
            failures = stats.failures.len(),
            duration_ms = stats.duration.as_millis(),
            "Indexed files"
        );
        stats
    }

    // === Persistence ===

    /// Schedule a persist after the configured delay.
    pub fn schedule_persist(&self) {
        self.schedule_persist_after(self.shared.config.persist_delay());
    }

    /// Schedule a persist after `delay`, replacing any pending one.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn schedule_persist_after(&self, delay: Duration) {
        let mut timer = self.shared.lock_timer();
        timer.generation += 1;
        let generation = timer.generation;

        if let Some(previous) = timer.pending.take() {
            previous.abort();
        }

        let shared = Arc::downgrade(&self.shared);
        timer.pending = Some(tokio::spawn(run_persist_timer(shared, generation, delay)));
    }

    /// Whether a scheduled persist has not fired yet.
    #[must_use]
    pub fn has_pending_persist(&self) -> bool {
        self.shared.lock_timer().pending.is_some()
    }

    /// Write a snapshot now.
    ///
    /// When the estimated size exceeds `max_snapshot_bytes`, the least
    /// recently updated files are left out of the snapshot until it fits.
    /// The live index is never modified.
    ///
    /// # Errors
    ///
    /// Returns `Error::Persist` if the store rejects the write and
    /// `Error::Json` if serialization fails.
    pub async fn persist_now(&self) -> Result<PersistOutcome> {
        let _write = self.shared.write_lock.lock().await;

        let max_bytes = self.shared.config.max_snapshot_bytes;
        let (encoded, evicted_files) = {
            let index = self.shared.index.read().await;
            encode_within_cap(&index, max_bytes)
        };

        if !evicted_files.is_empty() {
            info!(
                evicted_files = evicted_files.len(),
                max_bytes,
                "Snapshot over size cap, leaving out least recently updated files"
            );
        }

        let written = match encoded {
            Ok((bytes, file_count)) => self
                .shared
                .store
                .write(&bytes)
                .await
                .map(|()| (bytes.len(), file_count)),
            Err(e) => Err(e),
        };

        let mut stats = self.shared.lock_stats();
        match written {
            Ok((bytes_written, file_count)) => {
                let outcome = PersistOutcome {
                    bytes_written,
                    evicted_files,
                };
                stats.writes += 1;
                stats.consecutive_failures = 0;
                stats.last_outcome = Some(outcome.clone());
                debug!(
                    bytes = bytes_written,
                    files = file_count,
                    "Persisted index snapshot"
                );
                Ok(outcome)
            }
            Err(e) => {
                stats.failures += 1;
                stats.consecutive_failures = stats.consecutive_failures.saturating_add(1);
                stats.last_error = Some(e.to_string());
                warn!(
                    error = %e,
                    consecutive_failures = stats.consecutive_failures,
                    "Failed to persist index snapshot"
                );
                Err(Error::Persist(e.to_string()))
            }
        }
    }

    /// Cancel any pending timer and persist immediately.
    ///
    /// # Errors
    ///
    /// See [`IndexManager::persist_now`].
    pub async fn flush(&self) -> Result<PersistOutcome> {
        self.cancel_pending_persist();
        self.persist_now().await
    }

    /// Final best-effort flush. Failures are logged, not returned.
    pub async fn shutdown(&self) {
        match self.flush().await {
            Ok(outcome) => debug!(bytes = outcome.bytes_written, "Flushed index on shutdown"),
            Err(e) => warn!(error = %e, "Failed to flush index on shutdown"),
        }
    }

    /// Read the snapshot from this manager's store without touching the
    /// live index. `None` when there is no usable snapshot.
    pub async fn load(&self) -> Option<WorkspaceIndex> {
        read_snapshot(self.shared.store.as_ref()).await
    }

    /// Counters for persistence attempts.
    #[must_use]
    pub fn persist_stats(&self) -> PersistStats {
        self.shared.lock_stats().clone()
    }

    /// Estimated serialized size of `index`, without serializing it.
    #[must_use]
    pub fn estimate_serialized_index_size_bytes(index: &WorkspaceIndex) -> usize {
        snapshot::estimate_serialized_index_size_bytes(index)
    }

    fn cancel_pending_persist(&self) {
        let mut timer = self.shared.lock_timer();
        timer.generation += 1;
        if let Some(handle) = timer.pending.take() {
            handle.abort();
        }
    }

    fn retry_delay(&self, consecutive_failures: u32) -> Duration {
        let factor = 2_u32.saturating_pow(consecutive_failures);
        self.shared
            .config
            .persist_delay()
            .saturating_mul(factor)
            .max(MIN_RETRY_DELAY)
            .min(self.shared.config.max_retry_delay())
    }

    // === Reads ===

    /// Run `f` with read access to the index.
    pub async fn with_index<R>(&self, f: impl FnOnce(&WorkspaceIndex) -> R) -> R {
        f(&*self.shared.index.read().await)
    }

    /// Dependency graph of the current index.
    pub async fn graph(&self) -> WorkspaceDependencyGraph {
        GraphBuilder::build(&*self.shared.index.read().await)
    }

    /// Freshness of the index right now.
    pub async fn index_status(&self) -> IndexStatus {
        self.index_status_at(Utc::now()).await
    }

    /// Freshness of the index as of `now`.
    pub async fn index_status_at(&self, now: DateTime<Utc>) -> IndexStatus {
        build_index_status(Some(&*self.shared.index.read().await), now)
    }

    /// Graph stats with orphaned and missing details.
    pub async fn detailed_stats(&self) -> DetailedWorkspaceStats {
        let index = self.shared.index.read().await;
        let graph = GraphBuilder::build(&index);
        build_detailed_workspace_stats(&graph, Some(&index))
    }
}

/// Body of a persist timer task.
///
/// Once the delay has passed and the generation is still current, the task
/// detaches itself from the timer slot so a reschedule cannot abort a write
/// in progress. Failed writes are retried with exponential backoff until one
/// succeeds, a newer schedule or flush takes over, or every manager handle
/// is gone. Only a weak reference is held while waiting.
async fn run_persist_timer(weak: Weak<Shared>, generation: u64, delay: Duration) {
    tokio::time::sleep(delay).await;

    {
        let Some(shared) = weak.upgrade() else {
            return;
        };
        let mut timer = shared.lock_timer();
        if timer.generation != generation {
            return;
        }
        timer.pending = None;
    }

    loop {
        let backoff = {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let manager = IndexManager { shared };
            if manager.persist_now().await.is_ok() {
                return;
            }
            let failures = manager.shared.lock_stats().consecutive_failures;
            manager.retry_delay(failures)
        };
        debug!(retry_in_ms = backoff.as_millis(), "Scheduling persist retry");
        tokio::time::sleep(backoff).await;

        let Some(shared) = weak.upgrade() else {
            debug!("Index manager dropped, abandoning persist retry");
            return;
        };
        let superseded = {
            let timer = shared.lock_timer();
            timer.generation != generation || timer.pending.is_some()
        };
        if superseded {
            return;
        }
    }
}

/// Files to leave out so the estimated snapshot fits in `max_bytes`,
/// least recently updated first.
fn select_evictions(index: &WorkspaceIndex, max_bytes: usize) -> Vec<String> {
    let mut estimate = snapshot::estimate_serialized_index_size_bytes(index);
    if estimate <= max_bytes {
        return Vec::new();
    }

    let mut evicted = Vec::new();
    for (path, bytes) in index.files_by_recency() {
        if estimate <= max_bytes {
            break;
        }
        estimate = estimate.saturating_sub(bytes);
        evicted.push(path.to_string());
    }
    evicted
}

/// Encode a snapshot of `index` that fits in `max_bytes`.
///
/// Starts from the estimate-based evictions, then leaves out further files,
/// oldest first, while the encoded bytes are still over the cap. Returns the
/// bytes with their file count, and the evicted paths.
fn encode_within_cap(
    index: &WorkspaceIndex,
    max_bytes: usize,
) -> (Result<(Vec<u8>, usize)>, Vec<String>) {
    let mut evicted = select_evictions(index, max_bytes);
    let by_recency = index.files_by_recency();
    let mut remaining = by_recency.iter().skip(evicted.len()).map(|(path, _)| *path);

    loop {
        let snapshot = {
            let excluded: HashSet<&str> = evicted.iter().map(String::as_str).collect();
            Snapshot::capture(index, &excluded)
        };
        let bytes = match snapshot.encode() {
            Ok(bytes) => bytes,
            Err(e) => return (Err(e), evicted),
        };
        if bytes.len() <= max_bytes {
            return (Ok((bytes, snapshot.file_count)), evicted);
        }
        let Some(path) = remaining.next() else {
            warn!(
                bytes = bytes.len(),
                max_bytes, "Empty snapshot is still over the size cap"
            );
            return (Ok((bytes, snapshot.file_count)), evicted);
        };
        debug!(
            path,
            bytes = bytes.len(),
            max_bytes,
            "Encoded snapshot over size cap, leaving out another file"
        );
        evicted.push(path.to_string());
    }
}

async fn read_snapshot(store: &dyn SnapshotStore) -> Option<WorkspaceIndex> {
    match store.read().await {
        Ok(Some(bytes)) => snapshot::decode(&bytes),
        Ok(None) => {
            debug!("No snapshot found, starting cold");
            None
        }
        Err(e) => {
            warn!(error = %e, "Failed to read snapshot, starting cold");
            None
        }
    }
}

fn retain_named<T>(path: &str, entries: Vec<T>, name: impl Fn(&T) -> &str) -> Vec<T> {
    let before = entries.len();
    let kept: Vec<T> = entries
        .into_iter()
        .filter(|entry| !name(entry).trim().is_empty())
        .collect();
    if kept.len() < before {
        warn!(path, dropped = before - kept.len(), "Dropped entries with blank names");
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySnapshotStore;
    use crate::types::DefinitionKind;

    fn manager() -> IndexManager {
        IndexManager::new(IndexConfig::default(), Arc::new(MemorySnapshotStore::new()))
    }

    #[tokio::test]
    async fn blank_names_never_reach_the_index() {
        let manager = manager();

        manager
            .update_file(
                "a.sql",
                vec![
                    Definition::new("", DefinitionKind::Table, "", 1),
                    Definition::new("orders", DefinitionKind::Table, "", 2),
                ],
                vec![Reference::new("  ", "", 3)],
            )
            .await;

        manager
            .with_index(|index| {
                assert_eq!(index.definition_count(), 1);
                assert_eq!(index.reference_count(), 0);
            })
            .await;
    }

    #[tokio::test]
    async fn retry_delay_doubles_and_caps() {
        let config = IndexConfig {
            persist_delay_ms: 100,
            max_retry_delay_ms: 500,
            ..IndexConfig::default()
        };
        let manager = IndexManager::new(config, Arc::new(MemorySnapshotStore::new()));

        assert_eq!(manager.retry_delay(1), Duration::from_millis(200));
        assert_eq!(manager.retry_delay(2), Duration::from_millis(400));
        assert_eq!(manager.retry_delay(3), Duration::from_millis(500));
        assert_eq!(manager.retry_delay(40), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn zero_delay_retry_is_floored() {
        let config = IndexConfig {
            persist_delay_ms: 0,
            ..IndexConfig::default()
        };
        let manager = IndexManager::new(config, Arc::new(MemorySnapshotStore::new()));

        assert_eq!(manager.retry_delay(1), MIN_RETRY_DELAY);
    }

    #[tokio::test]
    async fn select_evictions_takes_oldest_first() {
        let manager = manager();
        for name in ["old.sql", "mid.sql", "new.sql"] {
            manager
                .update_file(
                    name,
                    vec![Definition::new("t", DefinitionKind::Table, "", 1)],
                    vec![],
                )
                .await;
        }

        let evicted = manager
            .with_index(|index| {
                let full = snapshot::estimate_serialized_index_size_bytes(index);
                select_evictions(index, full - 1)
            })
            .await;

        assert_eq!(evicted, vec!["old.sql".to_string()]);
    }

    #[tokio::test]
    async fn select_evictions_is_empty_under_the_cap() {
        let manager = manager();
        manager.update_file("a.sql", vec![], vec![]).await;

        let evicted = manager
            .with_index(|index| select_evictions(index, usize::MAX))
            .await;

        assert!(evicted.is_empty());
    }

    #[tokio::test]
    async fn encode_within_cap_leaves_out_every_file_under_a_tiny_cap() {
        let manager = manager();
        for name in ["a.sql", "b.sql", "c.sql"] {
            manager
                .update_file(
                    name,
                    vec![Definition::new("t", DefinitionKind::Table, "", 1)],
                    vec![],
                )
                .await;
        }

        let (encoded, evicted) = manager
            .with_index(|index| encode_within_cap(index, 10))
            .await;

        assert_eq!(evicted, vec!["a.sql", "b.sql", "c.sql"]);
        let (bytes, file_count) = encoded.unwrap();
        assert_eq!(file_count, 0);
        assert_eq!(snapshot::decode(&bytes).unwrap().file_count(), 0);
    }

    #[tokio::test]
    async fn flush_cancels_pending_timer() {
        let manager = manager();
        manager.update_file("a.sql", vec![], vec![]).await;
        assert!(manager.has_pending_persist());

        manager.flush().await.unwrap();

        assert!(!manager.has_pending_persist());
        assert_eq!(manager.persist_stats().writes, 1);
    }
}
