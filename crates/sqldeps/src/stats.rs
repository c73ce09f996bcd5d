//! Index freshness and detailed diagnostics.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

use crate::graph::{WorkspaceDependencyGraph, WorkspaceStats};
use crate::index::WorkspaceIndex;
use crate::types::{DefinitionKind, Reference};

/// Younger than this is fresh.
const FRESH_MINUTES: i64 = 10;
/// Younger than this (and not fresh) is stale; anything older is old.
const STALE_MINUTES: i64 = 60;

/// How current the index is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexStatusLevel {
    /// Updated less than ten minutes ago
    Fresh,
    /// Updated less than an hour ago
    Stale,
    /// Updated an hour or more ago
    Old,
    /// Never built
    Missing,
}

impl IndexStatusLevel {
    /// Lowercase label.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Stale => "stale",
            Self::Old => "old",
            Self::Missing => "missing",
        }
    }
}

impl fmt::Display for IndexStatusLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status line for a toolbar or terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStatus {
    /// Short label, e.g. "Indexed 5m ago"
    pub text: String,
    /// Multi-line detail suitable for a tooltip
    pub title: String,
    /// Freshness class
    pub level: IndexStatusLevel,
}

/// Classify freshness from raw inputs.
///
/// Total over its inputs: `None` means the index was never built, and a
/// `last_updated` in the future counts as zero age.
#[must_use]
pub fn classify_index_status(
    now: DateTime<Utc>,
    last_updated: Option<DateTime<Utc>>,
    file_count: usize,
) -> IndexStatus {
    let Some(last_updated) = last_updated else {
        return IndexStatus {
            text: "Not indexed".to_string(),
            title: "SQL dependency index\nNo index has been built for this workspace yet."
                .to_string(),
            level: IndexStatusLevel::Missing,
        };
    };

    let minutes = (now - last_updated).num_minutes().max(0);
    let level = if minutes < FRESH_MINUTES {
        IndexStatusLevel::Fresh
    } else if minutes < STALE_MINUTES {
        IndexStatusLevel::Stale
    } else {
        IndexStatusLevel::Old
    };

    let age = relative_age(minutes);
    let text = format!("Indexed {age}");
    let title = format!(
        "SQL dependency index\nFiles: {file_count}\nLast updated: {}\nAge: {age}\nStatus: {level}",
        last_updated.format("%Y-%m-%d %H:%M:%S UTC"),
    );

    IndexStatus { text, title, level }
}

fn relative_age(minutes: i64) -> String {
    match minutes {
        m if m < 1 => "just now".to_string(),
        m if m < 60 => format!("{m}m ago"),
        m if m < 24 * 60 => format!("{}h ago", m / 60),
        m => format!("{}d ago", m / (24 * 60)),
    }
}

/// Status of `index` as of `now`.
#[must_use]
pub fn build_index_status(index: Option<&WorkspaceIndex>, now: DateTime<Utc>) -> IndexStatus {
    match index {
        Some(index) => classify_index_status(now, index.last_updated(), index.file_count()),
        None => classify_index_status(now, None, 0),
    }
}

/// One definition of an orphaned key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionDetail {
    /// Name in source casing, schema-qualified when present
    pub display_name: String,
    /// Declared kind
    #[serde(rename = "type")]
    pub kind: DefinitionKind,
    /// Declaring file
    pub file_path: String,
    /// 1-based line
    pub line_number: u32,
}

/// A referenced key that nothing defines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingDefinitionDetail {
    /// The missing key
    pub table_name: String,
    /// Every reference to it
    pub references: Vec<Reference>,
    /// `references.len()`
    pub reference_count: usize,
    /// Distinct referencing files in first-seen order
    pub referencing_files: Vec<String>,
}

/// Graph stats expanded with per-entry details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailedWorkspaceStats {
    /// Stats of the graph the details were built from
    pub stats: WorkspaceStats,
    /// One entry per definition under each orphaned key
    pub orphaned_details: Vec<DefinitionDetail>,
    /// One entry per missing key
    pub missing_details: Vec<MissingDefinitionDetail>,
}

/// Expand `graph`'s classifications with entries from `index`.
///
/// Without an index the details are empty.
#[must_use]
pub fn build_detailed_workspace_stats(
    graph: &WorkspaceDependencyGraph,
    index: Option<&WorkspaceIndex>,
) -> DetailedWorkspaceStats {
    let Some(index) = index else {
        return DetailedWorkspaceStats {
            stats: graph.stats.clone(),
            orphaned_details: Vec::new(),
            missing_details: Vec::new(),
        };
    };

    let orphaned_details = graph
        .stats
        .orphaned_definitions
        .iter()
        .flat_map(|key| index.definitions(key))
        .map(|def| DefinitionDetail {
            display_name: def.display_name(),
            kind: def.kind,
            file_path: def.file_path.clone(),
            line_number: def.line_number,
        })
        .collect();

    let missing_details = graph
        .stats
        .missing_definitions
        .iter()
        .map(|key| {
            let references = index.references(key).to_vec();
            let mut seen = HashSet::new();
            let referencing_files: Vec<String> = references
                .iter()
                .filter(|reference| seen.insert(reference.file_path.as_str()))
                .map(|reference| reference.file_path.clone())
                .collect();
            MissingDefinitionDetail {
                table_name: key.to_string(),
                reference_count: references.len(),
                references,
                referencing_files,
            }
        })
        .collect();

    DetailedWorkspaceStats {
        stats: graph.stats.clone(),
        orphaned_details,
        missing_details,
    }
}
