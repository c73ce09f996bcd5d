//! `sqldeps status` command implementation.

use std::path::Path;

use colored::Colorize;

use super::display::level_label;
use super::open_index;

/// Run the status command.
pub async fn run(workspace: &Path) -> anyhow::Result<()> {
    let manager = open_index(workspace).await?;
    let status = manager.index_status().await;

    println!("{}", level_label(status.level, &status.text).bold());
    for line in status.title.lines().skip(1) {
        println!("  {}", line.dimmed());
    }

    Ok(())
}
