//! Agent state, counters, and the periodic status report.
//!
//! The worker loop is the only writer of [`AgentStats`]; the reporter reads
//! the atomics and the latest [`IndexSummary`] published on a watch channel,
//! so it never touches the index itself.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::error::Stage;
use crate::index::IndexSummary;

/// Lifecycle state of the agent.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum AgentState {
    Starting = 0,
    Watching = 1,
    Reading = 2,
    Classifying = 3,
    Storing = 4,
    Indexing = 5,
    ShuttingDown = 6,
    Stopped = 7,
}

impl AgentState {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentState::Starting => "starting",
            AgentState::Watching => "watching",
            AgentState::Reading => "reading",
            AgentState::Classifying => "classifying",
            AgentState::Storing => "storing",
            AgentState::Indexing => "indexing",
            AgentState::ShuttingDown => "shutting-down",
            AgentState::Stopped => "stopped",
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => AgentState::Starting,
            1 => AgentState::Watching,
            2 => AgentState::Reading,
            3 => AgentState::Classifying,
            4 => AgentState::Storing,
            5 => AgentState::Indexing,
            6 => AgentState::ShuttingDown,
            _ => AgentState::Stopped,
        }
    }
}

impl From<Stage> for AgentState {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::Reading => AgentState::Reading,
            Stage::Classifying => AgentState::Classifying,
            Stage::Storing => AgentState::Storing,
            Stage::Indexing => AgentState::Indexing,
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Run counters shared between the worker and the reporter.
#[derive(Debug)]
pub struct AgentStats {
    state: AtomicU8,
    processed: AtomicU64,
    skipped: AtomicU64,
    errors: AtomicU64,
    /// Unix seconds of the last processed file, 0 when none.
    last_run: AtomicI64,
}

impl Default for AgentStats {
    fn default() -> Self {
        Self {
            state: AtomicU8::new(AgentState::Starting as u8),
            processed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            last_run: AtomicI64::new(0),
        }
    }
}

impl AgentStats {
    pub fn state(&self) -> AgentState {
        AgentState::from_u8(self.state.load(Ordering::Relaxed))
    }

    pub fn set_state(&self, state: AgentState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    pub fn record_processed(&self, at: DateTime<Utc>) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.last_run.store(at.timestamp(), Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let last = self.last_run.load(Ordering::Relaxed);
        StatsSnapshot {
            state: self.state(),
            processed: self.processed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            last_run: (last > 0)
                .then(|| DateTime::from_timestamp(last, 0))
                .flatten(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub state: AgentState,
    pub processed: u64,
    pub skipped: u64,
    pub errors: u64,
    pub last_run: Option<DateTime<Utc>>,
}

/// `ops=3 technical=12`
pub fn format_categories(summary: &IndexSummary) -> String {
    if summary.by_category.is_empty() {
        return "-".to_string();
    }
    summary
        .by_category
        .iter()
        .map(|(name, count)| format!("{name}={}", format_number(*count as u64)))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn log_status(stats: &StatsSnapshot, summary: &IndexSummary) {
    let last_run = stats
        .last_run
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "never".to_string());
    tracing::info!(
        state = %stats.state,
        processed = stats.processed,
        skipped = stats.skipped,
        errors = stats.errors,
        indexed = summary.total,
        categories = %format_categories(summary),
        last_run = %last_run,
        "status"
    );
}

/// Log a status line every `every` until `shutdown` flips.
pub async fn run_reporter(
    stats: Arc<AgentStats>,
    summary: watch::Receiver<IndexSummary>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let current = summary.borrow().clone();
                log_status(&stats.snapshot(), &current);
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}
