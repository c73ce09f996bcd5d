//! `sqldeps cycles` command implementation.

use std::path::Path;

use colored::Colorize;

use super::display::print_bullets;
use super::open_index;

/// Run the cycles command.
pub async fn run(workspace: &Path) -> anyhow::Result<()> {
    let manager = open_index(workspace).await?;
    let cycles = manager.graph().await.stats.circular_dependencies;

    if cycles.is_empty() {
        println!("{}", "No circular dependencies detected.".green());
        return Ok(());
    }

    println!(
        "Found {} circular dependencies:",
        cycles.len().to_string().red().bold()
    );
    println!();

    // Each entry is a group of files that reach each other, not an ordered path.
    for (i, files) in cycles.iter().enumerate() {
        println!(
            "  {} {} ({} files):",
            "Cycle".yellow().bold(),
            i + 1,
            files.len()
        );
        print_bullets(files, "");
    }

    Ok(())
}
