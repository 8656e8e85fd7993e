//! Index store: entry id → [`IndexEntry`], persisted as one JSON object.
//!
//! The worker loop is the only writer. `persist` rewrites the whole map
//! through an atomic rename, so the artifact on disk is always the last
//! complete snapshot.

use anyhow::{Context, Result};
use librarian_core::models::IndexEntry;
use librarian_core::relate::{find_related, SimilarityRule};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::fsutil;

/// Totals published to the status reporter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSummary {
    pub total: usize,
    pub by_category: BTreeMap<String, usize>,
}

#[derive(Debug)]
pub struct IndexStore {
    path: PathBuf,
    entries: BTreeMap<String, IndexEntry>,
}

impl IndexStore {
    /// Load the artifact at `path`. Never fails: a missing artifact is an
    /// empty index and an unreadable one is logged and replaced by an empty
    /// index on the next persist.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match read_artifact(&path) {
            Ok(Some(entries)) => entries,
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %format!("{e:#}"),
                    "could not load index, starting empty"
                );
                BTreeMap::new()
            }
        };

        let missing = entries
            .values()
            .filter(|e| !e.library_path.exists())
            .count();
        if missing > 0 {
            tracing::warn!(
                path = %path.display(),
                missing,
                "index entries reference library files that no longer exist"
            );
        }

        Self { path, entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&IndexEntry> {
        self.entries.get(id)
    }

    /// Insert or replace by id. Returns the replaced entry.
    pub fn upsert(&mut self, entry: IndexEntry) -> Option<IndexEntry> {
        self.entries.insert(entry.id.clone(), entry)
    }

    /// Compute `entry.related_files` against the current index and upsert it.
    ///
    /// With `symmetric`, every other entry of the same category gains a
    /// back-link when it matches and loses a stale one when it no longer
    /// does. Returns the ids linked to the new entry.
    pub fn upsert_linked(
        &mut self,
        mut entry: IndexEntry,
        rule: SimilarityRule,
        symmetric: bool,
    ) -> Vec<String> {
        let related = find_related(
            &entry.filename,
            &entry.category,
            self.entries.values(),
            rule,
        );
        entry.set_related(related.clone());

        if symmetric {
            for other in self.entries.values_mut() {
                if other.id == entry.id || other.category != entry.category {
                    continue;
                }
                if related.contains(&other.id) {
                    other.add_related(&entry.id);
                } else {
                    other.remove_related(&entry.id);
                }
            }
        }

        self.upsert(entry);
        related
    }

    pub fn summary(&self) -> IndexSummary {
        let mut by_category = BTreeMap::new();
        for entry in self.entries.values() {
            *by_category.entry(entry.category.clone()).or_insert(0) += 1;
        }
        IndexSummary {
            total: self.entries.len(),
            by_category,
        }
    }

    /// Write the whole map atomically.
    pub fn persist(&self) -> Result<()> {
        fsutil::write_json_atomic(&self.path, &self.entries)
            .with_context(|| format!("failed to write index {}", self.path.display()))
    }
}

/// Parse an index artifact. `Ok(None)` when it does not exist.
pub fn read_artifact(path: &Path) -> Result<Option<BTreeMap<String, IndexEntry>>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: BTreeMap<String, IndexEntry> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    // Keys are derived, so rekey by id in case the file was edited by hand.
    let entries = parsed.into_values().map(|e| (e.id.clone(), e)).collect();
    Ok(Some(entries))
}
