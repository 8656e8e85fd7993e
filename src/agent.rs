//! Agent lifecycle: startup, the single-writer worker loop, periodic
//! status and rescan timers, and graceful shutdown.
//!
//! ```text
//! Starting → Watching → (Reading → Classifying → Storing → Indexing) → Watching
//!          → ... → ShuttingDown → Stopped
//! ```
//!
//! All mutation of the index and ledger happens inside [`run_worker`]. The
//! event source, the rescan timer, and the backlog scan only send
//! [`FileEvent`]s; the status reporter only reads counters and the
//! published [`IndexSummary`].

use anyhow::{Context, Result};
use chrono::Utc;
use librarian_core::models::{EventKind, FileEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};

use crate::config::Config;
use crate::index::IndexSummary;
use crate::ingest::{today, LibraryState, Outcome, Pipeline};
use crate::sources::SourceSet;
use crate::status::{self, format_number, AgentState, AgentStats};
use crate::watcher::{scan_backlog, EventSource};

/// Bound of the event queue between the event source and the worker.
const QUEUE_CAPACITY: usize = 256;

/// Everything the worker needs, built from config.
struct Prepared {
    sources: Arc<SourceSet>,
    pipeline: Pipeline,
    state: LibraryState,
}

/// Bootstrap the library tree and load persisted state.
fn prepare(config: &Config) -> Result<Prepared> {
    config.require_sources()?;

    let root = &config.library.root;
    std::fs::create_dir_all(root)
        .with_context(|| format!("failed to create library root {}", root.display()))?;

    let mut sources = SourceSet::from_config(config)?;
    // The library and the artifacts may live inside a watched root.
    sources.ignore(root)?;
    sources.ignore(&config.library.index_file)?;
    sources.ignore(&config.library.ledger_file)?;
    let sources = Arc::new(sources);

    let pipeline = Pipeline::from_config(config, Arc::clone(&sources))?;
    pipeline.bootstrap()?;
    let state = LibraryState::load(config);

    Ok(Prepared {
        sources,
        pipeline,
        state,
    })
}

/// Consume events until the queue closes or `shutdown` flips.
///
/// The shutdown flag is checked before each event is taken, never while a
/// file is in flight, so the current file always finishes all four stages.
pub async fn run_worker(
    pipeline: &Pipeline,
    state: &mut LibraryState,
    mut rx: mpsc::Receiver<FileEvent>,
    mut shutdown: watch::Receiver<bool>,
    stats: &AgentStats,
    summary: &watch::Sender<IndexSummary>,
) {
    stats.set_state(AgentState::Watching);
    summary.send_replace(state.index.summary());

    loop {
        if *shutdown.borrow() {
            break;
        }
        let event = tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        handle_event(pipeline, state, &event, stats, summary).await;
        stats.set_state(AgentState::Watching);
    }
}

async fn handle_event(
    pipeline: &Pipeline,
    state: &mut LibraryState,
    event: &FileEvent,
    stats: &AgentStats,
    summary: &watch::Sender<IndexSummary>,
) {
    let result = pipeline
        .ingest(state, event, today(), |stage| stats.set_state(stage.into()))
        .await;

    match result {
        Ok(Outcome::Processed { .. }) => {
            stats.record_processed(Utc::now());
            summary.send_replace(state.index.summary());
        }
        Ok(Outcome::Skipped) => stats.record_skipped(),
        Err(e) => {
            stats.record_error();
            tracing::error!(
                path = %e.path().display(),
                stage = %e.stage(),
                error = %e,
                "failed to ingest file"
            );
            // An indexing failure may still have changed the in-memory index.
            summary.send_replace(state.index.summary());
        }
    }
}

/// Enqueue a forced rescan of every source every `every`.
async fn run_rescan_timer(
    sources: Arc<SourceSet>,
    every: Duration,
    tx: mpsc::Sender<FileEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let scan_sources = Arc::clone(&sources);
                let paths = match tokio::task::spawn_blocking(move || {
                    scan_backlog(&scan_sources)
                })
                .await
                {
                    Ok(paths) => paths,
                    Err(e) => {
                        tracing::warn!(error = %e, "periodic rescan failed");
                        continue;
                    }
                };
                tracing::info!(files = paths.len(), "periodic rescan");
                for path in paths {
                    if tx.send(FileEvent::new(path, EventKind::Rescan)).await.is_err() {
                        return;
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

/// Resolve on SIGTERM or SIGINT (Ctrl-C elsewhere).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::select! {
            _ = sigterm.recv() => {},
            _ = sigint.recv() => {},
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    Ok(())
}

/// Run the long-lived agent until a termination signal arrives.
pub async fn run_watch(config: &Config) -> Result<()> {
    let stats = Arc::new(AgentStats::default());
    tracing::info!(state = %AgentState::Starting, "starting librarian agent");

    let Prepared {
        sources,
        pipeline,
        state,
    } = prepare(config)?;

    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (summary_tx, summary_rx) = watch::channel(state.index.summary());

    let events = EventSource::start(Arc::clone(&sources), config.watch.debounce(), tx.clone())?;
    if events.watched() == 0 {
        tracing::warn!("no source root could be watched; only rescans will find files");
    }

    // Watches are armed first so nothing written during the scan is missed.
    let backlog = events.backlog();
    let _backlog_task = tokio::task::spawn_blocking(move || {
        let queued = backlog.emit();
        tracing::info!(queued, "backlog scan complete");
    });

    let reporter = tokio::spawn(status::run_reporter(
        Arc::clone(&stats),
        summary_rx,
        Duration::from_secs(config.agent.status_interval_secs),
        shutdown_rx.clone(),
    ));

    let rescan = config.agent.reindex_interval_secs.map(|secs| {
        tokio::spawn(run_rescan_timer(
            Arc::clone(&sources),
            Duration::from_secs(secs),
            tx.clone(),
            shutdown_rx.clone(),
        ))
    });
    drop(tx);

    // The state sits behind a lock only so a panicking worker does not take
    // the final flush down with it; the worker holds it for its whole run.
    let shared = Arc::new(Mutex::new(state));
    let mut worker = {
        let shared = Arc::clone(&shared);
        let stats = Arc::clone(&stats);
        tokio::spawn(async move {
            let mut state = shared.lock().await;
            run_worker(&pipeline, &mut state, rx, shutdown_rx, &stats, &summary_tx).await;
        })
    };

    let signal = async {
        if let Err(e) = wait_for_shutdown_signal().await {
            tracing::error!(error = %format!("{e:#}"), "cannot listen for termination signals");
            std::future::pending::<()>().await;
        }
    };

    let worker_result = tokio::select! {
        result = &mut worker => result,
        _ = signal => {
            tracing::info!("termination signal received");
            let _ = shutdown_tx.send(true);
            worker.await
        }
    };
    if let Err(e) = worker_result {
        tracing::error!(error = %e, "ingestion worker stopped unexpectedly");
    }

    stats.set_state(AgentState::ShuttingDown);
    tracing::info!(state = %AgentState::ShuttingDown, "shutting down");
    let _ = shutdown_tx.send(true);
    drop(events);

    let state = shared.lock().await;
    if let Err(e) = state.flush() {
        tracing::error!(error = %format!("{e:#}"), "final flush failed");
    }

    let _ = reporter.await;
    if let Some(rescan) = rescan {
        let _ = rescan.await;
    }

    status::log_status(&stats.snapshot(), &state.index.summary());
    stats.set_state(AgentState::Stopped);
    tracing::info!(state = %AgentState::Stopped, "stopped");
    Ok(())
}

/// Result of a one-shot reindex.
#[derive(Debug, Clone)]
pub struct ReindexReport {
    pub scanned: usize,
    pub processed: u64,
    pub skipped: u64,
    pub errors: u64,
    pub summary: IndexSummary,
}

/// Force every matching file through the worker once, flush, and report.
pub async fn run_reindex(config: &Config) -> Result<ReindexReport> {
    let Prepared {
        sources,
        pipeline,
        mut state,
    } = prepare(config)?;
    let stats = AgentStats::default();

    let scan_sources = Arc::clone(&sources);
    let paths = tokio::task::spawn_blocking(move || scan_backlog(&scan_sources))
        .await
        .context("backlog scan failed")?;
    let scanned = paths.len();

    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let (summary_tx, _summary_rx) = watch::channel(state.index.summary());

    let producer = tokio::spawn(async move {
        for path in paths {
            if tx.send(FileEvent::new(path, EventKind::Rescan)).await.is_err() {
                break;
            }
        }
    });

    run_worker(&pipeline, &mut state, rx, shutdown_rx, &stats, &summary_tx).await;
    producer.await.context("reindex producer failed")?;
    state.flush()?;

    let snap = stats.snapshot();
    Ok(ReindexReport {
        scanned,
        processed: snap.processed,
        skipped: snap.skipped,
        errors: snap.errors,
        summary: state.index.summary(),
    })
}

pub fn print_reindex_report(config: &Config, report: &ReindexReport) {
    println!("reindex");
    println!("  scanned:   {} files", format_number(report.scanned as u64));
    println!("  processed: {}", format_number(report.processed));
    println!("  skipped:   {}", format_number(report.skipped));
    println!("  errors:    {}", format_number(report.errors));
    println!(
        "  indexed:   {} ({})",
        format_number(report.summary.total as u64),
        status::format_categories(&report.summary)
    );
    println!("  index:     {}", config.library.index_file.display());
    println!("ok");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceConfig;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn config_for(tmp: &TempDir) -> (Config, PathBuf) {
        let docs = tmp.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        let docs = docs.canonicalize().unwrap();

        let mut config = Config::default();
        config.library.root = tmp.path().join("library");
        config.library.index_file = tmp.path().join("state/index.json");
        config.library.ledger_file = tmp.path().join("state/ledger.json");
        config.sources.push(SourceConfig::from_root(&docs));
        (config, docs)
    }

    fn write(path: &Path, body: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    #[tokio::test]
    async fn test_worker_drains_queue_in_order() {
        let tmp = TempDir::new().unwrap();
        let (config, docs) = config_for(&tmp);
        write(&docs.join("ops/a.md"), "# Alpha Notes\n");
        write(&docs.join("ops/b.md"), "# Beta Notes\n");

        let Prepared {
            pipeline, mut state, ..
        } = prepare(&config).unwrap();
        let stats = AgentStats::default();
        let (summary_tx, summary_rx) = watch::channel(IndexSummary::default());
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (tx, rx) = mpsc::channel(8);

        tx.send(FileEvent::new(docs.join("ops/a.md"), EventKind::Added))
            .await
            .unwrap();
        tx.send(FileEvent::new(docs.join("ops/b.md"), EventKind::Added))
            .await
            .unwrap();
        tx.send(FileEvent::new(docs.join("ops/a.md"), EventKind::Changed))
            .await
            .unwrap();
        tx.send(FileEvent::new(docs.join("ops/gone.md"), EventKind::Added))
            .await
            .unwrap();
        drop(tx);

        run_worker(&pipeline, &mut state, rx, shutdown_rx, &stats, &summary_tx).await;

        let snap = stats.snapshot();
        assert_eq!(snap.processed, 2);
        assert_eq!(snap.skipped, 1);
        assert_eq!(snap.errors, 1);
        assert_eq!(snap.state, AgentState::Watching);
        assert_eq!(state.index.len(), 2);
        assert_eq!(summary_rx.borrow().by_category.get("ops"), Some(&2));
    }

    #[tokio::test]
    async fn test_worker_stops_before_next_event_on_shutdown() {
        let tmp = TempDir::new().unwrap();
        let (config, docs) = config_for(&tmp);
        write(&docs.join("a.md"), "# A\n");

        let Prepared {
            pipeline, mut state, ..
        } = prepare(&config).unwrap();
        let stats = AgentStats::default();
        let (summary_tx, _summary_rx) = watch::channel(IndexSummary::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (tx, rx) = mpsc::channel(8);

        shutdown_tx.send(true).unwrap();
        tx.send(FileEvent::new(docs.join("a.md"), EventKind::Added))
            .await
            .unwrap();

        run_worker(&pipeline, &mut state, rx, shutdown_rx, &stats, &summary_tx).await;
        assert_eq!(stats.snapshot().processed, 0);
        assert!(state.index.is_empty());
    }

    #[tokio::test]
    async fn test_reindex_forces_every_file() {
        let tmp = TempDir::new().unwrap();
        let (config, docs) = config_for(&tmp);
        write(&docs.join("ops/notes.md"), "# OCR Pipeline Failure Investigation\nocr error\n");
        write(&docs.join("records/scan.md"), "# Scan Log\n");
        write(&docs.join("ignore.txt"), "not markdown");

        let first = run_reindex(&config).await.unwrap();
        assert_eq!(first.scanned, 2);
        assert_eq!(first.processed, 2);
        assert_eq!(first.errors, 0);

        // A second run reprocesses instead of skipping, without duplicating.
        let second = run_reindex(&config).await.unwrap();
        assert_eq!(second.processed, 2);
        assert_eq!(second.skipped, 0);
        assert_eq!(second.summary.total, 2);
        assert_eq!(second.summary.by_category.get("recovery"), Some(&1));

        let expected = format!(
            "ops/{}_ocr-pipeline-failure-investigation.md",
            today().format("%Y-%m-%d")
        );
        assert!(config.library.root.join(expected).exists());
    }

    #[tokio::test]
    async fn test_library_inside_root_is_not_rescanned() {
        let tmp = TempDir::new().unwrap();
        let (mut config, docs) = config_for(&tmp);
        config.library.root = docs.join("library");
        write(&docs.join("ops/notes.md"), "# Notes\n");

        run_reindex(&config).await.unwrap();
        let second = run_reindex(&config).await.unwrap();
        assert_eq!(second.scanned, 1);
        assert_eq!(second.summary.total, 1);
    }

    #[test]
    fn test_prepare_requires_sources() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.library.root = tmp.path().join("library");
        assert!(prepare(&config).is_err());
    }
}
