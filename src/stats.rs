//! Index statistics.
//!
//! Reads the persisted index artifact (not the live agent) and prints
//! totals, per-category counts, and when the artifact was last written.
//! Used by `librarian stats` to check that ingestion is keeping up.

use anyhow::{Context, Result};
use librarian_core::models::IndexEntry;
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::Config;
use crate::index::read_artifact;
use crate::status::format_number;

/// Per-category breakdown.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CategoryStats {
    pub entries: usize,
    pub bytes: u64,
    pub linked: usize,
}

#[derive(Debug, Default)]
pub struct IndexStats {
    pub total: usize,
    pub bytes: u64,
    pub categories: BTreeMap<String, CategoryStats>,
    pub missing_files: usize,
    pub newest_modified: Option<i64>,
}

impl IndexStats {
    pub fn from_entries<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = &'a IndexEntry>,
    {
        let mut stats = IndexStats::default();
        for entry in entries {
            stats.total += 1;
            stats.bytes += entry.size;
            let cat = stats.categories.entry(entry.category.clone()).or_default();
            cat.entries += 1;
            cat.bytes += entry.size;
            if !entry.related_files.is_empty() {
                cat.linked += 1;
            }
            if !entry.library_path.exists() {
                stats.missing_files += 1;
            }
            let ts = entry.modified.timestamp();
            stats.newest_modified = Some(stats.newest_modified.map_or(ts, |n| n.max(ts)));
        }
        stats
    }
}

/// Run the stats command: read the index artifact and print a summary.
pub fn run_stats(config: &Config) -> Result<()> {
    let path = &config.library.index_file;
    let entries = read_artifact(path)
        .with_context(|| format!("cannot read index {}", path.display()))?
        .unwrap_or_default();
    let stats = IndexStats::from_entries(entries.values());

    let (size, written) = artifact_info(path);

    println!("Librarian Index Stats");
    println!("=====================");
    println!();
    println!("  Index:       {}", path.display());
    println!("  Size:        {}", format_bytes(size));
    println!(
        "  Written:     {}",
        written.map_or_else(|| "never".to_string(), format_ts_relative)
    );
    println!("  Library:     {}", config.library.root.display());
    println!();
    println!("  Documents:   {}", format_number(stats.total as u64));
    println!("  Content:     {}", format_bytes(stats.bytes));
    if let Some(ts) = stats.newest_modified {
        println!("  Newest:      {}", format_ts_relative(ts));
    }
    if stats.missing_files > 0 {
        println!("  Missing:     {} library files", stats.missing_files);
    }

    if !stats.categories.is_empty() {
        println!();
        println!("  By category:");
        println!(
            "  {:<20} {:>8} {:>10} {:>8}",
            "CATEGORY", "DOCS", "SIZE", "LINKED"
        );
        println!("  {}", "-".repeat(50));
        for (name, c) in &stats.categories {
            println!(
                "  {:<20} {:>8} {:>10} {:>8}",
                name,
                format_number(c.entries as u64),
                format_bytes(c.bytes),
                c.linked
            );
        }
    }

    println!();
    Ok(())
}

/// Size and mtime (unix seconds) of the artifact, if it exists.
fn artifact_info(path: &Path) -> (u64, Option<i64>) {
    match std::fs::metadata(path) {
        Ok(m) => {
            let written = m
                .modified()
                .ok()
                .map(|t| chrono::DateTime::<chrono::Utc>::from(t).timestamp());
            (m.len(), written)
        }
        Err(_) => (0, None),
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
