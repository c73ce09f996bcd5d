//! Persisted snapshot format.
//!
//! A snapshot is a single JSON document:
//!
//! ```json
//! {
//!   "version": 1,
//!   "lastUpdated": 1760000000000,
//!   "fileCount": 2,
//!   "definitions": [{"key": "sales.orders", "name": "Orders", "schema": "Sales",
//!                    "kind": "table", "filePath": "a.sql", "lineNumber": 3}],
//!   "references":  [{"key": "sales.orders", "tableName": "orders", "schema": "sales",
//!                    "filePath": "b.sql", "lineNumber": 12}],
//!   "files": ["a.sql", "b.sql"]
//! }
//! ```
//!
//! `lastUpdated` is milliseconds since the Unix epoch. `files` is optional and
//! lists indexed paths least recently updated first. Entries are written in a
//! stable order so identical indexes produce identical bytes.
//!
//! Decoding never fails loudly: a missing, corrupt, or version-mismatched
//! snapshot decodes to `None`, which callers treat as a cold start.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};

use crate::error::Result;
use crate::index::WorkspaceIndex;
use crate::key::TableKey;
use crate::types::{Definition, DefinitionKind, Reference};

/// Current snapshot schema version. Snapshots with any other version are
/// ignored on load.
pub const SNAPSHOT_VERSION: u32 = 1;

// Fixed JSON text around each entry's strings (field names, quotes,
// punctuation, a `null` schema and a short line number), rounded up.
const DEFINITION_OVERHEAD: usize = 80;
const REFERENCE_OVERHEAD: usize = 72;
const FILE_OVERHEAD: usize = 3;
const SNAPSHOT_HEADER_BYTES: usize = 112;

/// On-disk snapshot document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Schema version, see [`SNAPSHOT_VERSION`]
    pub version: u32,
    /// Epoch milliseconds of the last index change; 0 if never updated
    pub last_updated: i64,
    /// Number of indexed files in this snapshot
    pub file_count: usize,
    /// Every definition entry
    pub definitions: Vec<DefinitionEntry>,
    /// Every reference entry
    pub references: Vec<ReferenceEntry>,
    /// Indexed files, least recently updated first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

/// One persisted definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionEntry {
    /// Normalized key at the time of writing
    pub key: TableKey,
    /// Name as written in the source
    pub name: String,
    /// Schema qualifier
    pub schema: Option<String>,
    /// Declared kind
    pub kind: DefinitionKind,
    /// Declaring file
    pub file_path: String,
    /// 1-based line
    pub line_number: u32,
}

/// One persisted reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceEntry {
    /// Normalized key at the time of writing
    pub key: TableKey,
    /// Referenced name as written in the source
    pub table_name: String,
    /// Schema qualifier
    pub schema: Option<String>,
    /// Referencing file
    pub file_path: String,
    /// 1-based line
    pub line_number: u32,
}

impl Snapshot {
    /// Capture `index`, leaving out every entry attributed to a file in
    /// `excluded`.
    #[must_use]
    pub fn capture(index: &WorkspaceIndex, excluded: &HashSet<&str>) -> Self {
        let mut definitions: Vec<DefinitionEntry> = index
            .definition_map()
            .iter()
            .flat_map(|(key, defs)| defs.iter().map(move |def| (key, def)))
            .filter(|(_, def)| !excluded.contains(def.file_path.as_str()))
            .map(|(key, def)| DefinitionEntry {
                key: key.clone(),
                name: def.name.clone(),
                schema: def.schema.clone(),
                kind: def.kind,
                file_path: def.file_path.clone(),
                line_number: def.line_number,
            })
            .collect();
        definitions.sort_by(|a, b| {
            (&a.key, &a.file_path, a.line_number, &a.name)
                .cmp(&(&b.key, &b.file_path, b.line_number, &b.name))
        });

        let mut references: Vec<ReferenceEntry> = index
            .reference_map()
            .iter()
            .flat_map(|(key, refs)| refs.iter().map(move |reference| (key, reference)))
            .filter(|(_, reference)| !excluded.contains(reference.file_path.as_str()))
            .map(|(key, reference)| ReferenceEntry {
                key: key.clone(),
                table_name: reference.table_name.clone(),
                schema: reference.schema.clone(),
                file_path: reference.file_path.clone(),
                line_number: reference.line_number,
            })
            .collect();
        references.sort_by(|a, b| {
            (&a.key, &a.file_path, a.line_number, &a.table_name)
                .cmp(&(&b.key, &b.file_path, b.line_number, &b.table_name))
        });

        let files: Vec<String> = index
            .indexed_files()
            .into_iter()
            .filter(|path| !excluded.contains(path))
            .map(str::to_string)
            .collect();

        Self {
            version: SNAPSHOT_VERSION,
            last_updated: index.last_updated().map_or(0, |t| t.timestamp_millis()),
            file_count: files.len(),
            definitions,
            references,
            files,
        }
    }

    /// Serialize to compact JSON.
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` if serialization fails.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Rebuild a live index from this snapshot.
    ///
    /// Entries with a blank name are dropped; they can only come from a
    /// hand-edited or corrupted file.
    #[must_use]
    pub fn into_index(self) -> WorkspaceIndex {
        let total = self.definitions.len() + self.references.len();

        let definitions: Vec<Definition> = self
            .definitions
            .into_iter()
            .filter(|entry| !entry.name.trim().is_empty())
            .map(|entry| Definition {
                name: entry.name,
                schema: entry.schema,
                kind: entry.kind,
                file_path: entry.file_path,
                line_number: entry.line_number,
            })
            .collect();
        let references: Vec<Reference> = self
            .references
            .into_iter()
            .filter(|entry| !entry.table_name.trim().is_empty())
            .map(|entry| Reference {
                table_name: entry.table_name,
                schema: entry.schema,
                file_path: entry.file_path,
                line_number: entry.line_number,
            })
            .collect();

        let dropped = total - definitions.len() - references.len();
        if dropped > 0 {
            warn!(dropped, "Dropped snapshot entries with blank names");
        }

        let last_updated = match self.last_updated {
            0 => None,
            millis => DateTime::<Utc>::from_timestamp_millis(millis),
        };

        WorkspaceIndex::restore(self.files, definitions, references, last_updated)
    }
}

/// Decode snapshot bytes into an index.
///
/// Returns `None` for anything that is not a well-formed snapshot of the
/// current version.
#[must_use]
pub fn decode(bytes: &[u8]) -> Option<WorkspaceIndex> {
    #[derive(Deserialize)]
    struct VersionProbe {
        version: Option<u32>,
    }

    let probe: VersionProbe = match serde_json::from_slice(bytes) {
        Ok(probe) => probe,
        Err(e) => {
            warn!(error = %e, "Snapshot is not valid JSON, starting cold");
            return None;
        }
    };

    if probe.version != Some(SNAPSHOT_VERSION) {
        info!(
            found = ?probe.version,
            expected = SNAPSHOT_VERSION,
            "Snapshot version mismatch, starting cold"
        );
        return None;
    }

    match serde_json::from_slice::<Snapshot>(bytes) {
        Ok(snapshot) => Some(snapshot.into_index()),
        Err(e) => {
            warn!(error = %e, "Snapshot is corrupt, starting cold");
            None
        }
    }
}

/// Cheap upper-bound-ish estimate of the serialized snapshot size.
///
/// Sums per-file estimates that the index maintains as files are updated, so
/// the cost is O(files) and no JSON is produced.
#[must_use]
pub fn estimate_serialized_index_size_bytes(index: &WorkspaceIndex) -> usize {
    SNAPSHOT_HEADER_BYTES + index.estimated_entry_bytes()
}

pub(crate) fn estimate_definition_bytes(definition: &Definition, key: &TableKey) -> usize {
    DEFINITION_OVERHEAD
        + json_string_len(key.as_str())
        + json_string_len(&definition.name)
        + definition.schema.as_deref().map_or(0, json_string_len)
        + json_string_len(&definition.file_path)
}

pub(crate) fn estimate_reference_bytes(reference: &Reference, key: &TableKey) -> usize {
    REFERENCE_OVERHEAD
        + json_string_len(key.as_str())
        + json_string_len(&reference.table_name)
        + reference.schema.as_deref().map_or(0, json_string_len)
        + json_string_len(&reference.file_path)
}

pub(crate) fn estimate_file_bytes(path: &str) -> usize {
    FILE_OVERHEAD + json_string_len(path)
}

/// Length of `s` once escaped by `serde_json`, without the quotes.
fn json_string_len(s: &str) -> usize {
    s.len()
        + s.bytes()
            .map(|b| match b {
                b'"' | b'\\' | b'\n' | b'\r' | b'\t' | 0x08 | 0x0c => 1,
                0x00..=0x1f => 5,
                _ => 0,
            })
            .sum::<usize>()
}
