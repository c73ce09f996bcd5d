//! `sqldeps ingest` command implementation.
//!
//! Input is JSONL, one record per scanned file:
//!
//! ```text
//! {"filePath": "models/orders.sql", "definitions": [...], "references": [...]}
//! {"filePath": "models/old.sql", "removed": true}
//! ```
//!
//! Malformed lines are skipped and reported; the rest are applied in order.

use std::fmt;
use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use serde::Deserialize;
use sqldeps::{Definition, Reference};

use super::display::print_warnings;
use super::open_index;

/// One line of scan output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    /// File the record describes
    pub file_path: String,
    /// The file no longer exists and should leave the index
    #[serde(default)]
    pub removed: bool,
    /// Objects the file declares
    #[serde(default)]
    pub definitions: Vec<Definition>,
    /// Objects the file uses
    #[serde(default)]
    pub references: Vec<Reference>,
}

/// A line that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    /// 1-based line number
    pub line_number: usize,
    /// Why it was skipped
    pub reason: String,
}

impl fmt::Display for SkippedLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line_number, self.reason)
    }
}

/// Parse every line of `content`, collecting the lines that fail.
pub fn parse_scan_records(content: &str) -> (Vec<ScanRecord>, Vec<SkippedLine>) {
    let mut records = Vec::new();
    let mut skipped = Vec::new();

    for (index, line) in content.lines().enumerate() {
        let line_number = index + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<ScanRecord>(line) {
            Ok(record) if record.file_path.trim().is_empty() => skipped.push(SkippedLine {
                line_number,
                reason: "record has an empty filePath".to_string(),
            }),
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(line_number, error = %e, "Skipping malformed scan record");
                skipped.push(SkippedLine {
                    line_number,
                    reason: e.to_string(),
                });
            }
        }
    }

    (records, skipped)
}

/// Run the ingest command.
pub async fn run(workspace: &Path, input: &Path) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("failed to read {}", input.display()))?;
    let (records, skipped) = parse_scan_records(&content);

    let manager = open_index(workspace).await?;

    let (mut updated, mut removed) = (0_usize, 0_usize);
    for record in records {
        if record.removed {
            if manager.remove_file(&record.file_path).await {
                removed += 1;
            }
        } else {
            manager
                .update_file(&record.file_path, record.definitions, record.references)
                .await;
            updated += 1;
        }
    }

    let outcome = manager.flush().await.context("failed to write index snapshot")?;

    println!(
        "{} {} files, removed {}",
        "Indexed".green().bold(),
        updated,
        removed
    );
    if !outcome.evicted_files.is_empty() {
        println!(
            "  {}: {} least recently updated files left out of the snapshot",
            "Note".yellow().bold(),
            outcome.evicted_files.len()
        );
    }
    print_warnings(&skipped);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqldeps::DefinitionKind;

    #[test]
    fn parses_updates_and_removals() {
        let content = r#"
{"filePath": "a.sql", "definitions": [{"name": "orders", "kind": "table", "lineNumber": 1}]}
{"filePath": "b.sql", "references": [{"tableName": "orders", "schema": "sales", "lineNumber": 4}]}
{"filePath": "c.sql", "removed": true}
"#;

        let (records, skipped) = parse_scan_records(content);

        assert!(skipped.is_empty());
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].definitions[0].kind, DefinitionKind::Table);
        assert_eq!(records[1].references[0].schema.as_deref(), Some("sales"));
        assert!(records[2].removed);
        assert!(records[2].definitions.is_empty());
    }

    #[test]
    fn malformed_lines_are_skipped_with_line_numbers() {
        let content = "{\"filePath\": \"a.sql\"}\n{not json}\n\n{\"filePath\": \"\"}\n{\"filePath\": \"b.sql\"}\n";

        let (records, skipped) = parse_scan_records(content);

        assert_eq!(records.len(), 2);
        let lines: Vec<usize> = skipped.iter().map(|s| s.line_number).collect();
        assert_eq!(lines, vec![2, 4]);
        assert!(skipped[1].to_string().contains("empty filePath"));
    }

    #[test]
    fn unknown_kind_is_reported() {
        let content = r#"{"filePath": "a.sql", "definitions": [{"name": "t", "kind": "index", "lineNumber": 1}]}"#;

        let (records, skipped) = parse_scan_records(content);

        assert!(records.is_empty());
        assert_eq!(skipped.len(), 1);
    }
}
