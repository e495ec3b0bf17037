use std::collections::HashSet;
use std::env;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};

use monitor_core::{Platform, TokenUsage, UsageRecord, compute_cost_usd, resolve_pricing};

use crate::parser::{absorb, parse_file};
use crate::tail::FileCursor;
use crate::types::{PullBatch, Result};

pub fn default_monitor_dir() -> PathBuf {
    let home = env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."));
    home.join(".genai-code-usage-monitor")
}

pub fn default_codex_log_path() -> PathBuf {
    default_monitor_dir().join("usage_log.jsonl")
}

/// Tail over the local append-only usage log written by the monitored
/// application through [`UsageLogWriter`].
pub struct CodexSource {
    path: PathBuf,
    cursor: FileCursor,
    warned_models: HashSet<String>,
}

impl CodexSource {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            cursor: FileCursor::default(),
            warned_models: HashSet::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// An absent log just means nothing has been recorded yet.
    pub fn pull_new_records(&mut self) -> Result<PullBatch> {
        let mut batch = PullBatch::default();
        if !self.path.exists() {
            return Ok(batch);
        }
        batch.stats.files_scanned = 1;
        let parsed = parse_file(&self.path, self.cursor, Platform::Codex);
        self.cursor = absorb(&mut batch, parsed, &mut self.warned_models);
        batch.records.sort_by_key(|record| record.timestamp);
        Ok(batch)
    }
}

/// Append helper exposed to the monitored application. Writes one JSON line
/// per call in the same schema the source reads back; cache fields are
/// always zero on this platform.
pub struct UsageLogWriter {
    path: PathBuf,
}

impl UsageLogWriter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn at_default_location() -> Self {
        Self::new(default_codex_log_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append_call(
        &self,
        model: &str,
        input_tokens: u64,
        output_tokens: u64,
        request_id: Option<&str>,
    ) -> io::Result<UsageRecord> {
        let resolved = resolve_pricing(model);
        let tokens = TokenUsage {
            input_tokens,
            output_tokens,
            cache_creation_tokens: 0,
            cache_read_tokens: 0,
        };
        let cost_usd = compute_cost_usd(&tokens, &resolved.pricing);
        let timestamp = Utc::now();
        let line = serde_json::json!({
            "timestamp": timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            "model": model,
            "input_tokens": input_tokens,
            "output_tokens": output_tokens,
            "cache_creation_tokens": 0,
            "cache_read_tokens": 0,
            "cost": cost_usd,
            "request_id": request_id,
        });
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        Ok(UsageRecord {
            timestamp,
            model: resolved.model,
            tokens,
            cost_usd,
            message_id: None,
            request_id: request_id.map(str::to_string),
            platform: Platform::Codex,
        })
    }
}
