//! Integration tests for the sqldeps CLI.
//!
//! These run the built binary against a temporary workspace.

use rstest::{fixture, rstest};
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

// ============================================================================
// Test Fixtures
// ============================================================================

/// Provides a fresh temporary workspace for each test
#[fixture]
fn workspace() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

fn run_sqldeps(workspace: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sqldeps"))
        .arg("--workspace")
        .arg(workspace)
        .args(args)
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to execute sqldeps binary")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn write_scan(workspace: &Path, name: &str, lines: &[&str]) -> std::path::PathBuf {
    let path = workspace.join(name);
    std::fs::write(&path, lines.join("\n")).expect("Failed to write scan file");
    path
}

const SCAN: &[&str] = &[
    r#"{"filePath": "customers.sql", "definitions": [{"name": "customers", "kind": "table", "lineNumber": 1}]}"#,
    r#"{"filePath": "orders.sql", "definitions": [{"name": "orders", "kind": "table", "lineNumber": 1}], "references": [{"tableName": "Customers", "lineNumber": 9}, {"tableName": "shipments", "lineNumber": 12}]}"#,
];

// ============================================================================
// Tests
// ============================================================================

#[rstest]
fn status_without_index_reports_not_indexed(workspace: TempDir) {
    let output = run_sqldeps(workspace.path(), &["status"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains("Not indexed"));
}

#[rstest]
fn ingest_writes_snapshot_and_report_lists_diagnostics(workspace: TempDir) {
    let scan = write_scan(workspace.path(), "scan.jsonl", SCAN);

    let output = run_sqldeps(workspace.path(), &["ingest", scan.to_str().unwrap()]);
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(workspace.path().join(".sqldeps/index.json").exists());

    let output = run_sqldeps(workspace.path(), &["report", "--json"]);
    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["stats"]["totalFiles"], 2);
    assert_eq!(report["stats"]["orphanedDefinitions"][0], "orders");
    assert_eq!(report["stats"]["missingDefinitions"][0], "shipments");
    assert_eq!(report["missingDetails"][0]["referencingFiles"][0], "orders.sql");

    let output = run_sqldeps(workspace.path(), &["status"]);
    assert!(stdout(&output).contains("Indexed just now"));
}

#[rstest]
fn ingest_skips_malformed_lines(workspace: TempDir) {
    let scan = write_scan(
        workspace.path(),
        "scan.jsonl",
        &[SCAN[0], "{this is not json", SCAN[1]],
    );

    let output = run_sqldeps(workspace.path(), &["ingest", scan.to_str().unwrap()]);

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("skipped 1 malformed lines"));
    assert!(out.contains("line 2"));
}

#[rstest]
fn remove_drops_file_from_index(workspace: TempDir) {
    let scan = write_scan(workspace.path(), "scan.jsonl", SCAN);
    run_sqldeps(workspace.path(), &["ingest", scan.to_str().unwrap()]);

    let output = run_sqldeps(workspace.path(), &["remove", "orders.sql", "nope.sql"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("not indexed"));

    let output = run_sqldeps(workspace.path(), &["report", "--json"]);
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["stats"]["totalFiles"], 1);
    assert_eq!(report["stats"]["orphanedDefinitions"][0], "customers");
}

#[rstest]
fn cycles_are_reported(workspace: TempDir) {
    let scan = write_scan(
        workspace.path(),
        "scan.jsonl",
        &[
            r#"{"filePath": "a.sql", "definitions": [{"name": "a", "kind": "view", "lineNumber": 1}], "references": [{"tableName": "b", "lineNumber": 2}]}"#,
            r#"{"filePath": "b.sql", "definitions": [{"name": "b", "kind": "view", "lineNumber": 1}], "references": [{"tableName": "a", "lineNumber": 2}]}"#,
        ],
    );
    run_sqldeps(workspace.path(), &["ingest", scan.to_str().unwrap()]);

    let output = run_sqldeps(workspace.path(), &["cycles"]);

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("a.sql"));
    assert!(out.contains("b.sql"));
}

#[rstest]
fn missing_input_file_fails_with_error(workspace: TempDir) {
    let output = run_sqldeps(workspace.path(), &["ingest", "does-not-exist.jsonl"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("error"));
}
