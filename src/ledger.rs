//! Idempotency ledger: source path → last processed modification time.
//!
//! A file is reprocessed if and only if its current mtime differs from the
//! recorded value. The ledger is flushed to disk after every successful
//! mark, so a crash loses at most the in-flight file's record.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::fsutil::{self, format_mtime};

#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

fn key(source: &Path) -> String {
    source.to_string_lossy().to_string()
}

impl Ledger {
    /// Load the ledger artifact. A missing or unreadable artifact yields an
    /// empty ledger and a warning.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match read_entries(&path) {
            Ok(Some(entries)) => entries,
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %format!("{e:#}"),
                    "could not load ledger, starting fresh"
                );
                BTreeMap::new()
            }
        };
        Self { path, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `source` was processed at `mtime`, its current modification
    /// time as captured by the caller.
    pub fn is_processed(&self, source: &Path, mtime: &DateTime<Utc>) -> bool {
        self.entries.get(&key(source)).map(String::as_str) == Some(format_mtime(mtime).as_str())
    }

    /// Record `source` at `mtime` and flush.
    ///
    /// The in-memory record is kept even if the flush fails; the next
    /// successful flush writes it.
    pub fn mark_processed(&mut self, source: &Path, mtime: &DateTime<Utc>) -> Result<()> {
        self.entries.insert(key(source), format_mtime(mtime));
        self.flush()
    }

    pub fn flush(&self) -> Result<()> {
        fsutil::write_json_atomic(&self.path, &self.entries)
            .with_context(|| format!("failed to write ledger {}", self.path.display()))
    }
}

fn read_entries(path: &Path) -> Result<Option<BTreeMap<String, String>>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parsed = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(parsed))
}
