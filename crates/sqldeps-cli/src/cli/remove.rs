//! `sqldeps remove` command implementation.

use std::path::Path;

use anyhow::Context;
use colored::Colorize;

use super::open_index;

/// Run the remove command.
pub async fn run(workspace: &Path, paths: &[String]) -> anyhow::Result<()> {
    let manager = open_index(workspace).await?;

    for path in paths {
        if manager.remove_file(path).await {
            println!("  {} {}", "removed".green(), path);
        } else {
            println!("  {} {}", "not indexed".dimmed(), path);
        }
    }

    manager
        .flush()
        .await
        .context("failed to write index snapshot")?;
    Ok(())
}
