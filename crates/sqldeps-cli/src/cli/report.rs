//! `sqldeps report` command implementation.

use std::path::Path;

use colored::Colorize;
use sqldeps::{DefinitionDetail, DetailedWorkspaceStats, MissingDefinitionDetail};

use super::display::print_bullets;
use super::open_index;

/// Run the report command.
pub async fn run(workspace: &Path, json: bool) -> anyhow::Result<()> {
    let manager = open_index(workspace).await?;
    let detailed = manager.detailed_stats().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&detailed)?);
        return Ok(());
    }

    print_summary(&detailed);
    println!();
    print_orphaned(&detailed.orphaned_details);
    println!();
    print_missing(&detailed.missing_details);

    Ok(())
}

fn print_summary(detailed: &DetailedWorkspaceStats) {
    let stats = &detailed.stats;

    println!("{}", "SQL Workspace Dependencies".cyan().bold());
    println!();
    println!(
        "  {}: {}",
        "Files".white().bold(),
        stats.total_files.to_string().green()
    );
    println!(
        "  {}: {} ({} tables, {} views, {} CTEs)",
        "Definitions".white().bold(),
        stats.total_definitions.to_string().green(),
        stats.tables,
        stats.views,
        stats.ctes
    );
    println!(
        "  {}: {}",
        "References".white().bold(),
        stats.total_references.to_string().green()
    );
    println!(
        "  {}: {}",
        "Resolved".white().bold(),
        stats.resolved_keys.to_string().green()
    );
    if !stats.circular_dependencies.is_empty() {
        println!(
            "  {}: {} (run `sqldeps cycles`)",
            "Cycles".white().bold(),
            stats.circular_dependencies.len().to_string().red()
        );
    }
}

fn print_orphaned(details: &[DefinitionDetail]) {
    println!(
        "  {} {}",
        "Orphaned definitions".yellow().bold(),
        format!("({})", details.len()).dimmed()
    );
    let lines: Vec<String> = details
        .iter()
        .map(|d| format!("{} {} ({}:{})", d.kind, d.display_name, d.file_path, d.line_number))
        .collect();
    print_bullets(&lines, "none");
}

fn print_missing(details: &[MissingDefinitionDetail]) {
    println!(
        "  {} {}",
        "Missing definitions".red().bold(),
        format!("({})", details.len()).dimmed()
    );
    if details.is_empty() {
        println!("    {}", "none".dimmed());
        return;
    }

    for detail in details {
        println!(
            "    {} {} {}",
            "•".dimmed(),
            detail.table_name.white().bold(),
            format!(
                "{} references in {} files",
                detail.reference_count,
                detail.referencing_files.len()
            )
            .dimmed()
        );
        for file in &detail.referencing_files {
            println!("        {}", file.dimmed());
        }
    }
}
