use std::collections::{HashMap, HashSet};
use std::env;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use monitor_core::Platform;

use crate::parser::{FileParse, absorb, parse_file};
use crate::tail::FileCursor;
use crate::types::{PullBatch, Result, SourceError, SourceIssue};

pub const CLAUDE_CONFIG_DIR_ENV: &str = "CLAUDE_CONFIG_DIR";

/// Resolve the Claude projects root: explicit env override, then the
/// XDG-style location, then the legacy dot directory.
pub fn default_claude_root() -> PathBuf {
    if let Ok(dir) = env::var(CLAUDE_CONFIG_DIR_ENV) {
        return PathBuf::from(dir);
    }
    let home = env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."));
    let config = home.join(".config").join("claude").join("projects");
    if config.is_dir() {
        return config;
    }
    let legacy = home.join(".claude").join("projects");
    if legacy.is_dir() {
        return legacy;
    }
    config
}

/// Read-only tail over the Claude provider's own `*.jsonl` project logs.
pub struct ClaudeSource {
    root: PathBuf,
    cursors: HashMap<PathBuf, FileCursor>,
    warned_models: HashSet<String>,
}

impl ClaudeSource {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            cursors: HashMap::new(),
            warned_models: HashSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Pull records appended since the previous call. Idempotent across
    /// overlapping windows; duplicates are the dedup filter's problem.
    pub fn pull_new_records(&mut self) -> Result<PullBatch> {
        if !self.root.is_dir() {
            return Err(SourceError::MissingRoot(self.root.clone()));
        }
        let mut batch = PullBatch::default();
        let mut tasks = Vec::new();
        for entry in walkdir::WalkDir::new(&self.root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    let file_path = err
                        .path()
                        .map(|path| path.to_string_lossy().to_string())
                        .unwrap_or_else(|| "<unknown>".to_string());
                    batch.stats.issues.push(SourceIssue {
                        file_path,
                        message: err.to_string(),
                    });
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.into_path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("jsonl") {
                continue;
            }
            batch.stats.files_scanned += 1;
            let cursor = self.cursors.get(&path).copied().unwrap_or_default();
            tasks.push((path, cursor));
        }

        let parsed_files: Vec<FileParse> = tasks
            .into_par_iter()
            .map(|(path, cursor)| parse_file(&path, cursor, Platform::Claude))
            .collect();

        for parsed in parsed_files {
            let path = parsed.path.clone();
            let cursor = absorb(&mut batch, parsed, &mut self.warned_models);
            self.cursors.insert(path, cursor);
        }
        batch.records.sort_by_key(|record| record.timestamp);
        batch.limit_events.sort_by_key(|event| event.timestamp);
        Ok(batch)
    }
}
