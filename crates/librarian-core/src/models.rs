//! Core data models shared by the watcher, the ingestion pipeline, and the
//! index store.
//!
//! [`IndexEntry`] is the record persisted in the JSON index artifact. Its
//! serialized field names are camelCase because the artifact is read by
//! consumers outside this crate.

use std::fmt;
use std::path::PathBuf;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::normalize::entry_id;

/// Why a file reached the ingestion queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// First time the event source reported this path.
    Added,
    /// The path was reported before and has settled after new writes.
    Changed,
    /// Forced reprocessing from a full reindex; bypasses the ledger.
    Rescan,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Added => "added",
            EventKind::Changed => "changed",
            EventKind::Rescan => "rescan",
        }
    }

    /// Forced events are processed even when the ledger says the file is
    /// unchanged.
    pub fn is_forced(self) -> bool {
        matches!(self, EventKind::Rescan)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stabilized "file ready" notification.
///
/// Events are immutable values; the event source only ever sends them and
/// the ingestion worker only ever receives them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: EventKind,
}

impl FileEvent {
    pub fn new(path: impl Into<PathBuf>, kind: EventKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Inputs for building an [`IndexEntry`].
///
/// The id is not part of the parts: it is always derived from `filename`.
#[derive(Debug, Clone)]
pub struct EntryParts {
    pub original_path: PathBuf,
    pub library_path: PathBuf,
    pub filename: String,
    pub title: String,
    pub category: String,
    pub source: Option<String>,
    pub size: u64,
    pub sha256: Option<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub source_folder: String,
    pub related_files: Vec<String>,
    pub keywords: Vec<String>,
    pub first_paragraph: String,
}

/// One ingested document in the index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub id: String,
    pub original_path: PathBuf,
    pub library_path: PathBuf,
    pub filename: String,
    pub title: String,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    #[serde(default)]
    pub source_folder: String,
    #[serde(default)]
    pub related_files: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub first_paragraph: String,
}

impl IndexEntry {
    /// Build and validate an entry. The id is derived from the filename and
    /// any self-reference in `related_files` is dropped.
    pub fn new(parts: EntryParts) -> Result<Self> {
        if parts.filename.trim().is_empty() {
            bail!("index entry filename must not be empty");
        }
        if parts.filename.contains('/') || parts.filename.contains('\\') {
            bail!(
                "index entry filename must be a single path component: {}",
                parts.filename
            );
        }
        if parts.category.trim().is_empty() {
            bail!("index entry for {} has no category", parts.filename);
        }
        if !parts.library_path.ends_with(&parts.filename) {
            bail!(
                "library path {} does not end with {}",
                parts.library_path.display(),
                parts.filename
            );
        }

        let id = entry_id(&parts.filename);
        if id.is_empty() {
            bail!("could not derive an id from {}", parts.filename);
        }

        let mut entry = Self {
            id,
            original_path: parts.original_path,
            library_path: parts.library_path,
            filename: parts.filename,
            title: parts.title,
            category: parts.category,
            source: parts.source,
            size: parts.size,
            sha256: parts.sha256,
            created: parts.created,
            modified: parts.modified,
            source_folder: parts.source_folder,
            related_files: Vec::new(),
            keywords: parts.keywords,
            first_paragraph: parts.first_paragraph,
        };
        entry.set_related(parts.related_files);
        Ok(entry)
    }

    /// Replace the related ids, dropping duplicates and self-references.
    pub fn set_related(&mut self, ids: Vec<String>) {
        let mut related: Vec<String> = ids.into_iter().filter(|id| *id != self.id).collect();
        related.sort();
        related.dedup();
        self.related_files = related;
    }

    /// Add a link to `id`. Returns `true` if the list changed.
    pub fn add_related(&mut self, id: &str) -> bool {
        if id == self.id {
            return false;
        }
        match self.related_files.binary_search_by(|r| r.as_str().cmp(id)) {
            Ok(_) => false,
            Err(pos) => {
                self.related_files.insert(pos, id.to_string());
                true
            }
        }
    }

    /// Remove a link to `id`. Returns `true` if the list changed.
    pub fn remove_related(&mut self, id: &str) -> bool {
        let before = self.related_files.len();
        self.related_files.retain(|r| r != id);
        before != self.related_files.len()
    }
}
