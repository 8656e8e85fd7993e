//! Event source: backlog scan plus debounced live watching.
//!
//! Both halves feed the same bounded channel of [`FileEvent`]s. A path is
//! reported as `added` the first time either half sees it and `changed`
//! afterwards. Live notifications are only forwarded once the debouncer's
//! quiet interval has elapsed with no further writes.

use anyhow::{Context, Result};
use librarian_core::models::{EventKind, FileEvent};
use notify_debouncer_mini::notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebounceEventResult, DebouncedEventKind, Debouncer};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use walkdir::WalkDir;

use crate::sources::{Source, SourceSet};

/// Remembers which paths have been emitted so far.
#[derive(Debug, Default)]
pub struct EventTracker {
    seen: HashSet<PathBuf>,
}

impl EventTracker {
    pub fn observe(&mut self, path: &Path) -> EventKind {
        if self.seen.insert(path.to_path_buf()) {
            EventKind::Added
        } else {
            EventKind::Changed
        }
    }
}

type SharedTracker = Arc<Mutex<EventTracker>>;

fn observe(tracker: &SharedTracker, path: &Path) -> EventKind {
    let mut guard = match tracker.lock() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    };
    guard.observe(path)
}

/// Every matching file under `source`, sorted.
///
/// Unreadable directory entries are logged and skipped.
pub fn scan_source(sources: &SourceSet, source: &Source) -> Vec<PathBuf> {
    scan_dir(sources, source, &source.root)
}

fn scan_dir(sources: &SourceSet, source: &Source, dir: &Path) -> Vec<PathBuf> {
    let mut walker = WalkDir::new(dir);
    if !source.recursive {
        walker = walker.max_depth(1);
    }

    let mut paths = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(source = %source.name, error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        // Nested roots: the innermost source owns the file.
        let owned = sources
            .source_for(path)
            .is_some_and(|owner| owner.name == source.name);
        if owned && sources.accepts(path) {
            paths.push(path.to_path_buf());
        }
    }
    paths.sort();
    paths
}

/// Paths of every matching file across all sources, root by root.
pub fn scan_backlog(sources: &SourceSet) -> Vec<PathBuf> {
    let mut all = Vec::new();
    for source in sources.iter() {
        if !source.exists() {
            tracing::warn!(
                source = %source.name,
                path = %source.root.display(),
                "source root does not exist, skipping scan"
            );
            continue;
        }
        all.extend(scan_source(sources, source));
    }
    all
}

/// Live watching for a set of sources. Dropping the handle stops it.
pub struct EventSource {
    sources: Arc<SourceSet>,
    tracker: SharedTracker,
    tx: mpsc::Sender<FileEvent>,
    _debouncer: Debouncer<RecommendedWatcher>,
    watched: usize,
}

impl EventSource {
    /// Arm a debounced watch on every source root.
    ///
    /// A root that cannot be watched is logged and skipped; the others keep
    /// working. Fails only if the underlying watcher cannot be created.
    pub fn start(
        sources: Arc<SourceSet>,
        debounce: Duration,
        tx: mpsc::Sender<FileEvent>,
    ) -> Result<Self> {
        let tracker: SharedTracker = Arc::default();

        let cb_sources = Arc::clone(&sources);
        let cb_tracker = Arc::clone(&tracker);
        let cb_tx = tx.clone();
        let mut debouncer = new_debouncer(debounce, move |result: DebounceEventResult| {
            match result {
                Ok(events) => {
                    for event in events {
                        // AnyContinuous means writes are still in progress.
                        if !matches!(event.kind, DebouncedEventKind::Any) {
                            continue;
                        }
                        forward(&cb_sources, &cb_tracker, &cb_tx, &event.path);
                    }
                }
                Err(e) => tracing::warn!(error = ?e, "watcher error"),
            }
        })
        .context("failed to create file watcher")?;

        let mut watched = 0;
        for source in sources.iter() {
            let mode = if source.recursive {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };
            match debouncer.watcher().watch(&source.root, mode) {
                Ok(()) => {
                    watched += 1;
                    tracing::info!(
                        source = %source.name,
                        path = %source.root.display(),
                        recursive = source.recursive,
                        "watching"
                    );
                }
                Err(e) => tracing::error!(
                    source = %source.name,
                    path = %source.root.display(),
                    error = %e,
                    "failed to watch source root"
                ),
            }
        }

        Ok(Self {
            sources,
            tracker,
            tx,
            _debouncer: debouncer,
            watched,
        })
    }

    /// Number of roots successfully armed.
    pub fn watched(&self) -> usize {
        self.watched
    }

    /// Handle for the initial backlog scan, sharing this source's
    /// added/changed bookkeeping.
    pub fn backlog(&self) -> Backlog {
        Backlog {
            sources: Arc::clone(&self.sources),
            tracker: Arc::clone(&self.tracker),
            tx: self.tx.clone(),
        }
    }
}

/// Pending emission of every pre-existing file.
pub struct Backlog {
    sources: Arc<SourceSet>,
    tracker: SharedTracker,
    tx: mpsc::Sender<FileEvent>,
}

impl Backlog {
    /// Send a ready event for every pre-existing file. Blocks on a full
    /// queue, so call it off the async runtime. Returns the number sent.
    pub fn emit(self) -> usize {
        let mut sent = 0;
        for path in scan_backlog(&self.sources) {
            let kind = observe(&self.tracker, &path);
            if self.tx.blocking_send(FileEvent::new(path, kind)).is_err() {
                tracing::debug!("event queue closed, stopping backlog scan");
                break;
            }
            sent += 1;
        }
        sent
    }
}

fn forward(
    sources: &SourceSet,
    tracker: &SharedTracker,
    tx: &mpsc::Sender<FileEvent>,
    path: &Path,
) {
    // Removed files produce no event.
    let candidates = if path.is_file() {
        vec![path.to_path_buf()]
    } else if path.is_dir() && !sources.is_ignored(path) {
        // A directory moved into a watched tree reports only itself.
        match sources.source_for(path) {
            Some(source) if source.recursive => scan_dir(sources, source, path),
            _ => Vec::new(),
        }
    } else {
        Vec::new()
    };

    for path in candidates {
        if !sources.accepts(&path) {
            continue;
        }
        let kind = observe(tracker, &path);
        tracing::debug!(path = %path.display(), kind = %kind, "file ready");
        if tx.blocking_send(FileEvent::new(path, kind)).is_err() {
            tracing::debug!("event queue closed, dropping notification");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, SourceConfig};
    use std::time::Instant;
    use tempfile::TempDir;

    fn set_for(root: &Path, recursive: bool) -> SourceSet {
        let mut config = Config::default();
        let mut source = SourceConfig::from_root(root);
        source.recursive = recursive;
        config.sources.push(source);
        SourceSet::from_config(&config).unwrap()
    }

    fn write(path: &Path, body: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn test_tracker_added_then_changed() {
        let mut tracker = EventTracker::default();
        assert_eq!(tracker.observe(Path::new("/a.md")), EventKind::Added);
        assert_eq!(tracker.observe(Path::new("/a.md")), EventKind::Changed);
        assert_eq!(tracker.observe(Path::new("/b.md")), EventKind::Added);
    }

    #[test]
    fn test_backlog_is_sorted_and_filtered() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("zeta.md"), "# Z");
        write(&tmp.path().join("ops/alpha.md"), "# A");
        write(&tmp.path().join("ops/skip.txt"), "x");
        write(&tmp.path().join(".git/HEAD.md"), "x");

        let set = set_for(tmp.path(), true);
        let root = set.iter().next().unwrap().root.clone();
        let found = scan_backlog(&set);
        assert_eq!(found, vec![root.join("ops/alpha.md"), root.join("zeta.md")]);
    }

    #[test]
    fn test_backlog_shallow_source() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("top.md"), "# T");
        write(&tmp.path().join("nested/deep.md"), "# D");

        let set = set_for(tmp.path(), false);
        let found = scan_backlog(&set);
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("top.md"));
    }

    #[test]
    fn test_backlog_skips_missing_root() {
        let tmp = TempDir::new().unwrap();
        let set = set_for(&tmp.path().join("missing"), true);
        assert!(scan_backlog(&set).is_empty());
    }

    #[test]
    fn test_backlog_events_are_added() {
        let tmp = TempDir::new().unwrap();
        write(&tmp.path().join("a.md"), "# A");
        write(&tmp.path().join("b.md"), "# B");

        let set = Arc::new(set_for(tmp.path(), true));
        let (tx, mut rx) = mpsc::channel(8);
        let source = EventSource::start(set, Duration::from_millis(50), tx).unwrap();
        assert_eq!(source.watched(), 1);
        assert_eq!(source.backlog().emit(), 2);

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert!(first.path.ends_with("a.md"));
        assert!(second.path.ends_with("b.md"));
        assert_eq!(first.kind, EventKind::Added);
        assert_eq!(second.kind, EventKind::Added);
    }

    #[test]
    fn test_unwatchable_root_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.sources.push(SourceConfig::from_root(tmp.path()));
        config
            .sources
            .push(SourceConfig::from_root(&tmp.path().join("missing")));
        let set = Arc::new(SourceSet::from_config(&config).unwrap());

        let (tx, _rx) = mpsc::channel(8);
        let source = EventSource::start(set, Duration::from_millis(50), tx).unwrap();
        assert_eq!(source.watched(), 1);
    }

    async fn next_event(rx: &mut mpsc::Receiver<FileEvent>, wait: Duration) -> Option<FileEvent> {
        tokio::time::timeout(wait, rx.recv()).await.ok().flatten()
    }

    #[tokio::test]
    async fn test_live_write_emits_once_after_quiet_interval() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("ops")).unwrap();
        let set = Arc::new(set_for(tmp.path(), true));
        let root = set.iter().next().unwrap().root.clone();

        let debounce = Duration::from_millis(300);
        let (tx, mut rx) = mpsc::channel(8);
        let _source = EventSource::start(set, debounce, tx).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let written = Instant::now();
        write(&root.join("ops/live.md"), "# Live");

        let event = next_event(&mut rx, Duration::from_secs(5))
            .await
            .expect("no event for live write");
        assert!(written.elapsed() >= debounce, "event arrived before quiet interval");
        assert_eq!(event.path, root.join("ops/live.md"));
        assert_eq!(event.kind, EventKind::Added);

        assert!(next_event(&mut rx, Duration::from_secs(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_repeated_writes_collapse_into_one_event() {
        let tmp = TempDir::new().unwrap();
        let set = Arc::new(set_for(tmp.path(), true));
        let root = set.iter().next().unwrap().root.clone();
        let doc = root.join("burst.md");

        let debounce = Duration::from_millis(500);
        let (tx, mut rx) = mpsc::channel(8);
        let _source = EventSource::start(set, debounce, tx).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        for i in 0..8 {
            write(&doc, &format!("# Burst\n\nrevision {i}\n"));
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert!(rx.try_recv().is_err(), "event emitted while writes continue");
        }
        let stopped = Instant::now();

        let event = next_event(&mut rx, Duration::from_secs(5))
            .await
            .expect("no event after writes stopped");
        assert!(stopped.elapsed() + Duration::from_millis(100) >= debounce);
        assert_eq!(event.path, doc);

        assert!(next_event(&mut rx, Duration::from_secs(1)).await.is_none());
    }

    #[tokio::test]
    async fn test_directory_moved_in_emits_its_files() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("watched");
        std::fs::create_dir_all(&root).unwrap();
        write(&tmp.path().join("staging/batch/one.md"), "# One");
        write(&tmp.path().join("staging/batch/skip.txt"), "x");

        let set = Arc::new(set_for(&root, true));
        let root = set.iter().next().unwrap().root.clone();
        let (tx, mut rx) = mpsc::channel(8);
        let _source = EventSource::start(set, Duration::from_millis(200), tx).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        std::fs::rename(tmp.path().join("staging/batch"), root.join("batch")).unwrap();

        let event = next_event(&mut rx, Duration::from_secs(5))
            .await
            .expect("no event for moved directory");
        assert_eq!(event.path, root.join("batch/one.md"));
        assert!(next_event(&mut rx, Duration::from_secs(1)).await.is_none());
    }
}
