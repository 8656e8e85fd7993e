//! Per-file ingestion pipeline.
//!
//! One event runs four stages to completion: read → classify/normalize →
//! store → index. The ledger is marked only after the index snapshot that
//! contains the new entry has been persisted, so a crash at any point
//! leaves the file eligible for reprocessing.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use librarian_core::classify::Classifier;
use librarian_core::extract::Extractor;
use librarian_core::models::{EntryParts, FileEvent, IndexEntry};
use librarian_core::normalize::{normalize_filename, stem_of};
use librarian_core::relate::SimilarityRule;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::{IngestError, Stage};
use crate::fsutil;
use crate::index::IndexStore;
use crate::ledger::Ledger;
use crate::library::LibraryStore;
use crate::sources::SourceSet;

/// Mutable state owned by the worker loop.
#[derive(Debug)]
pub struct LibraryState {
    pub index: IndexStore,
    pub ledger: Ledger,
}

impl LibraryState {
    pub fn load(config: &Config) -> Self {
        let index = IndexStore::load(&config.library.index_file);
        let ledger = Ledger::load(&config.library.ledger_file);
        tracing::info!(
            entries = index.len(),
            ledger = ledger.len(),
            "loaded library state"
        );
        Self { index, ledger }
    }

    /// Persist both artifacts. Both are attempted even if the first fails.
    pub fn flush(&self) -> Result<()> {
        let index = self.index.persist();
        let ledger = self.ledger.flush();
        index.and(ledger)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Processed {
        id: String,
        category: String,
        library_path: PathBuf,
        related: Vec<String>,
        replaced: bool,
    },
    /// The ledger already records the file at its current mtime.
    Skipped,
}

pub struct Pipeline {
    sources: Arc<SourceSet>,
    classifier: Classifier,
    extractor: Extractor,
    rule: SimilarityRule,
    symmetric: bool,
    library: LibraryStore,
    file_timeout: Option<Duration>,
}

impl Pipeline {
    pub fn from_config(config: &Config, sources: Arc<SourceSet>) -> Result<Self> {
        Ok(Self {
            sources,
            classifier: config.classifier()?,
            extractor: config.extractor(),
            rule: config.similarity_rule(),
            symmetric: config.relations.symmetric,
            library: LibraryStore::new(fsutil::absolutize(&config.library.root)?),
            file_timeout: config.agent.file_timeout_secs.map(Duration::from_secs),
        })
    }

    /// Create the library root and one directory per category.
    pub fn bootstrap(&self) -> Result<()> {
        self.library
            .ensure_layout(self.classifier.categories())
            .with_context(|| format!("failed to bootstrap {}", self.library.root().display()))
    }

    /// Category for `path`: a source pin wins, then the pattern table
    /// matched against the full source path.
    pub fn categorize(&self, path: &Path) -> String {
        match self.sources.source_for(path).and_then(|s| s.category.as_ref()) {
            Some(pinned) => pinned.clone(),
            None => self.classifier.classify(path).to_string(),
        }
    }

    /// Run one event through the pipeline, reporting each stage as it
    /// starts.
    pub async fn ingest<F>(
        &self,
        state: &mut LibraryState,
        event: &FileEvent,
        today: NaiveDate,
        mut on_stage: F,
    ) -> Result<Outcome, IngestError>
    where
        F: FnMut(Stage),
    {
        let path = event.path.as_path();

        on_stage(Stage::Reading);
        let mtime = fsutil::mtime(path).map_err(|e| IngestError::failed(Stage::Reading, path, e))?;
        if !event.kind.is_forced() && state.ledger.is_processed(path, &mtime) {
            tracing::debug!(path = %path.display(), kind = %event.kind, "unchanged, skipping");
            return Ok(Outcome::Skipped);
        }
        let bytes = self
            .bounded(Stage::Reading, path, async {
                tokio::fs::read(path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))
            })
            .await?;
        let metadata = std::fs::metadata(path).ok();
        let created = metadata
            .as_ref()
            .and_then(|m| m.created().ok())
            .map(fsutil::to_utc)
            .unwrap_or(mtime);
        let permissions = metadata.map(|m| m.permissions());

        on_stage(Stage::Classifying);
        let meta = {
            let content = String::from_utf8_lossy(&bytes);
            self.extractor.extract(&content, &stem_of(path))
        };
        let filename = normalize_filename(&meta.title, path, today);
        let category = self.categorize(path);
        let source = self.sources.source_for(path).map(|s| s.name.clone());
        let source_folder = path
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let sha256 = format!("{:x}", Sha256::digest(&bytes));
        let size = bytes.len() as u64;

        on_stage(Stage::Storing);
        let library = self.library.clone();
        let (cat, name) = (category.clone(), filename.clone());
        let library_path = store_blocking(path, self.file_timeout, move || {
            library.place(&bytes, permissions.as_ref(), &cat, &name)
        })
        .await?;

        on_stage(Stage::Indexing);
        let entry = IndexEntry::new(EntryParts {
            original_path: path.to_path_buf(),
            library_path: library_path.clone(),
            filename,
            title: meta.title,
            category: category.clone(),
            source,
            size,
            sha256: Some(sha256),
            created,
            modified: mtime,
            source_folder,
            related_files: Vec::new(),
            keywords: meta.keywords,
            first_paragraph: meta.preview,
        })
        .map_err(|e| IngestError::failed(Stage::Indexing, path, e))?;

        let id = entry.id.clone();
        let previous = state.index.get(&id).cloned();
        let entry = match &previous {
            // Re-ingesting the same document keeps its original creation time.
            Some(prev) => IndexEntry {
                created: prev.created.min(entry.created),
                ..entry
            },
            None => entry,
        };
        let related = state.index.upsert_linked(entry, self.rule, self.symmetric);

        state
            .index
            .persist()
            .map_err(|e| IngestError::failed(Stage::Indexing, path, e))?;
        state
            .ledger
            .mark_processed(path, &mtime)
            .map_err(|e| IngestError::failed(Stage::Indexing, path, e))?;

        tracing::info!(
            path = %path.display(),
            id = %id,
            category = %category,
            related = related.len(),
            kind = %event.kind,
            "ingested"
        );
        Ok(Outcome::Processed {
            id,
            category,
            library_path,
            related,
            replaced: previous.is_some(),
        })
    }

    async fn bounded<T, Fut>(&self, stage: Stage, path: &Path, fut: Fut) -> Result<T, IngestError>
    where
        Fut: Future<Output = Result<T>>,
    {
        let result = match self.file_timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(r) => r,
                Err(_) => {
                    return Err(IngestError::TimedOut {
                        stage,
                        path: path.to_path_buf(),
                        timeout: limit,
                    })
                }
            },
            None => fut.await,
        };
        result.map_err(|e| IngestError::failed(stage, path, e))
    }
}

/// Run a library write on the blocking pool, bounded by `limit`.
///
/// A blocking write cannot be cancelled. On timeout the write is still
/// joined before `TimedOut` is returned, so the library never changes after
/// the failure has been reported.
async fn store_blocking<T, F>(path: &Path, limit: Option<Duration>, write: F) -> Result<T, IngestError>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let mut handle = tokio::task::spawn_blocking(write);
    let joined = match limit {
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                tracing::warn!(path = %path.display(), "store timed out, waiting for the write to settle");
                let _ = handle.await;
                return Err(IngestError::TimedOut {
                    stage: Stage::Storing,
                    path: path.to_path_buf(),
                    timeout: limit,
                });
            }
        },
        None => handle.await,
    };
    joined
        .map_err(|e| anyhow!("copy task failed: {e}"))
        .and_then(|written| written)
        .map_err(|e| IngestError::failed(Stage::Storing, path, e))
}

/// Today's date in local time, used for undated documents.
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}
