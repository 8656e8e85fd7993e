//! Typed failures of the per-file ingestion pipeline.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Pipeline stage a file was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Reading,
    Classifying,
    Storing,
    Indexing,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Reading => "reading",
            Stage::Classifying => "classifying",
            Stage::Storing => "storing",
            Stage::Indexing => "indexing",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{stage} {}: {source:#}", .path.display())]
    Failed {
        stage: Stage,
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("{stage} {} timed out after {}s", .path.display(), .timeout.as_secs())]
    TimedOut {
        stage: Stage,
        path: PathBuf,
        timeout: Duration,
    },
}

impl IngestError {
    pub fn failed(stage: Stage, path: impl Into<PathBuf>, source: impl Into<anyhow::Error>) -> Self {
        IngestError::Failed {
            stage,
            path: path.into(),
            source: source.into(),
        }
    }

    pub fn stage(&self) -> Stage {
        match self {
            IngestError::Failed { stage, .. } | IngestError::TimedOut { stage, .. } => *stage,
        }
    }

    pub fn path(&self) -> &std::path::Path {
        match self {
            IngestError::Failed { path, .. } | IngestError::TimedOut { path, .. } => path,
        }
    }
}
