mod claude;
mod codex;
mod parser;
mod tail;
mod types;

pub use claude::{CLAUDE_CONFIG_DIR_ENV, ClaudeSource, default_claude_root};
pub use codex::{CodexSource, UsageLogWriter, default_codex_log_path, default_monitor_dir};
pub use tail::FileCursor;
pub use types::{PullBatch, PullStats, Result, SourceError, SourceIssue};
