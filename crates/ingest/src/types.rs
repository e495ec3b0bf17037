use serde::Serialize;
use std::io;
use std::path::PathBuf;

use monitor_core::{LimitEvent, UsageRecord};

/// Everything one pull produced: new records, limit notices, and counters.
#[derive(Debug, Default)]
pub struct PullBatch {
    pub records: Vec<UsageRecord>,
    pub limit_events: Vec<LimitEvent>,
    pub stats: PullStats,
}

/// Per-pull counters surfaced to the monitor state for diagnostics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PullStats {
    pub files_scanned: usize,
    pub files_skipped: usize,
    pub lines_parsed: u64,
    pub lines_skipped: u64,
    pub parse_errors: u64,
    pub invalid_records: u64,
    pub issues: Vec<SourceIssue>,
}

/// Non-fatal problem tied to a single file.
#[derive(Debug, Clone, Serialize)]
pub struct SourceIssue {
    pub file_path: String,
    pub message: String,
}

/// Errors that make a whole source unusable for the current pull.
#[derive(Debug)]
pub enum SourceError {
    MissingRoot(PathBuf),
    Io(io::Error),
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRoot(path) => write!(f, "source directory missing: {}", path.display()),
            Self::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for SourceError {}

impl From<io::Error> for SourceError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, SourceError>;
