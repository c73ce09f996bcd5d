//! Common display utilities for CLI commands.

use colored::{ColoredString, Colorize};
use sqldeps::IndexStatusLevel;

use super::ingest::SkippedLine;

const MAX_DISPLAY_ITEMS: usize = 10;

/// Print items as bullets, truncated after `MAX_DISPLAY_ITEMS`.
pub fn print_bullets<T: AsRef<str>>(items: &[T], empty_message: &str) {
    if items.is_empty() {
        println!("    {}", empty_message.dimmed());
        return;
    }

    for item in items.iter().take(MAX_DISPLAY_ITEMS) {
        println!("    {} {}", "•".dimmed(), item.as_ref());
    }

    if items.len() > MAX_DISPLAY_ITEMS {
        println!(
            "    {} ... and {} more",
            "•".dimmed(),
            items.len() - MAX_DISPLAY_ITEMS
        );
    }
}

/// Color a freshness label by level.
pub fn level_label(level: IndexStatusLevel, text: &str) -> ColoredString {
    match level {
        IndexStatusLevel::Fresh => text.green(),
        IndexStatusLevel::Stale => text.yellow(),
        IndexStatusLevel::Old => text.red(),
        IndexStatusLevel::Missing => text.dimmed(),
    }
}

/// Report input lines that were skipped.
pub fn print_warnings(skipped: &[SkippedLine]) {
    if skipped.is_empty() {
        return;
    }

    println!(
        "  {}: skipped {} malformed lines",
        "Warning".yellow().bold(),
        skipped.len()
    );
    let lines: Vec<String> = skipped.iter().map(ToString::to_string).collect();
    print_bullets(&lines, "");
}
