use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use monitor_core::{LimitEvent, Platform, TokenUsage, UsageRecord, compute_cost_usd, resolve_pricing};

use crate::tail::{FileCursor, read_new_lines};
use crate::types::{PullBatch, SourceIssue};

/// Classification of one log line.
#[derive(Debug)]
pub(crate) enum ParsedLine {
    Record {
        record: UsageRecord,
        pricing_fallback: bool,
    },
    Limit(LimitEvent),
    /// No usage payload (system chatter, tool results). Counted, not kept.
    Skipped,
    /// Malformed JSON or a missing required field.
    Malformed,
    /// Structurally valid but semantically rejected (negative counts).
    Invalid,
}

pub(crate) fn parse_json_line(line: &str) -> Option<Value> {
    serde_json::from_str(line).ok()
}

pub(crate) fn parse_usage_line(line: &str, platform: Platform) -> ParsedLine {
    let Some(obj) = parse_json_line(line) else {
        return ParsedLine::Malformed;
    };
    let timestamp = extract_timestamp(&obj);
    let usage = match extract_usage(&obj) {
        Ok(usage) => usage,
        Err(()) => return ParsedLine::Invalid,
    };
    let Some(usage) = usage else {
        if let Some(message) = extract_limit_message(&obj) {
            if let Some(timestamp) = timestamp {
                return ParsedLine::Limit(LimitEvent {
                    timestamp,
                    message,
                    platform,
                });
            }
        }
        return ParsedLine::Skipped;
    };
    let Some(timestamp) = timestamp else {
        return ParsedLine::Malformed;
    };
    let raw_model = extract_model(&obj).unwrap_or("unknown");
    let resolved = resolve_pricing(raw_model);
    let cost_usd =
        extract_cost(&obj).unwrap_or_else(|| compute_cost_usd(&usage, &resolved.pricing));
    ParsedLine::Record {
        record: UsageRecord {
            timestamp,
            model: resolved.model.clone(),
            tokens: usage,
            cost_usd,
            message_id: extract_message_id(&obj),
            request_id: extract_request_id(&obj),
            platform,
        },
        pricing_fallback: resolved.fallback,
    }
}

fn extract_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    let raw = value.get("timestamp")?.as_str()?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(DateTime::<Utc>::from_naive_utc_and_offset(parsed, Utc));
    }
    None
}

fn token_field(obj: &Value, key: &str) -> Result<Option<u64>, ()> {
    match obj.get(key) {
        None => Ok(None),
        Some(Value::Null) => Ok(None),
        Some(value) => value.as_u64().map(Some).ok_or(()),
    }
}

/// Token counts with the nested `message.usage` object taking precedence
/// over top-level fields. `Ok(None)` means the line carries no usage at all.
fn extract_usage(value: &Value) -> Result<Option<TokenUsage>, ()> {
    if let Some(usage) = value.get("message").and_then(|message| message.get("usage")) {
        let input = token_field(usage, "input_tokens")?;
        let output = token_field(usage, "output_tokens")?;
        let cache_creation = token_field(usage, "cache_creation_input_tokens")?;
        let cache_read = token_field(usage, "cache_read_input_tokens")?;
        if input.is_some() || output.is_some() || cache_creation.is_some() || cache_read.is_some()
        {
            return Ok(Some(TokenUsage {
                input_tokens: input.unwrap_or(0),
                output_tokens: output.unwrap_or(0),
                cache_creation_tokens: cache_creation.unwrap_or(0),
                cache_read_tokens: cache_read.unwrap_or(0),
            }));
        }
    }
    let input = token_field(value, "input_tokens")?;
    let output = token_field(value, "output_tokens")?;
    let cache_creation = token_field(value, "cache_creation_tokens")?;
    let cache_read = token_field(value, "cache_read_tokens")?;
    if input.is_none() && output.is_none() && cache_creation.is_none() && cache_read.is_none() {
        return Ok(None);
    }
    Ok(Some(TokenUsage {
        input_tokens: input.unwrap_or(0),
        output_tokens: output.unwrap_or(0),
        cache_creation_tokens: cache_creation.unwrap_or(0),
        cache_read_tokens: cache_read.unwrap_or(0),
    }))
}

fn extract_model(value: &Value) -> Option<&str> {
    value
        .get("message")
        .and_then(|message| message.get("model"))
        .and_then(|model| model.as_str())
        .or_else(|| value.get("model").and_then(|model| model.as_str()))
}

fn extract_message_id(value: &Value) -> Option<String> {
    value
        .get("message_id")
        .and_then(|id| id.as_str())
        .or_else(|| {
            value
                .get("message")
                .and_then(|message| message.get("id"))
                .and_then(|id| id.as_str())
        })
        .map(str::to_string)
}

fn extract_request_id(value: &Value) -> Option<String> {
    value
        .get("request_id")
        .and_then(|id| id.as_str())
        .or_else(|| value.get("requestId").and_then(|id| id.as_str()))
        .map(str::to_string)
}

fn extract_cost(value: &Value) -> Option<f64> {
    for key in ["cost", "costUSD"] {
        if let Some(cost) = value.get(key).and_then(|cost| cost.as_f64()) {
            return Some(cost);
        }
    }
    None
}

fn extract_limit_message(value: &Value) -> Option<String> {
    let content = value
        .get("content")
        .and_then(|content| content.as_str())
        .or_else(|| {
            value
                .get("message")
                .and_then(|message| message.get("content"))
                .and_then(|content| content.as_str())
        })?;
    if matches_limit_pattern(content) {
        return Some(content.to_string());
    }
    None
}

/// Case-insensitive match for provider limit notices: "token limit reached"
/// anywhere, or "rate limit" followed later by "opus".
fn matches_limit_pattern(content: &str) -> bool {
    let lowered = content.to_ascii_lowercase();
    if lowered.contains("token limit reached") {
        return true;
    }
    match lowered.find("rate limit") {
        Some(index) => lowered[index..].contains("opus"),
        None => false,
    }
}

/// Everything extracted from one file during a pull.
#[derive(Debug)]
pub(crate) struct FileParse {
    pub path: PathBuf,
    pub cursor: FileCursor,
    pub records: Vec<UsageRecord>,
    pub limit_events: Vec<LimitEvent>,
    pub lines_parsed: u64,
    pub lines_skipped: u64,
    pub parse_errors: u64,
    pub invalid_records: u64,
    pub fallback_models: HashSet<String>,
    pub issue: Option<SourceIssue>,
}

pub(crate) fn parse_file(path: &Path, cursor: FileCursor, platform: Platform) -> FileParse {
    let mut parsed = FileParse {
        path: path.to_path_buf(),
        cursor,
        records: Vec::new(),
        limit_events: Vec::new(),
        lines_parsed: 0,
        lines_skipped: 0,
        parse_errors: 0,
        invalid_records: 0,
        fallback_models: HashSet::new(),
        issue: None,
    };
    let read = match read_new_lines(path, cursor) {
        Ok(read) => read,
        Err(err) => {
            parsed.issue = Some(SourceIssue {
                file_path: path.to_string_lossy().to_string(),
                message: err.to_string(),
            });
            return parsed;
        }
    };
    parsed.cursor = read.cursor;
    if let Some(err) = read.error {
        parsed.issue = Some(SourceIssue {
            file_path: path.to_string_lossy().to_string(),
            message: err.to_string(),
        });
    }
    for line in &read.lines {
        match parse_usage_line(line, platform) {
            ParsedLine::Record {
                record,
                pricing_fallback,
            } => {
                if pricing_fallback {
                    parsed.fallback_models.insert(record.model.clone());
                }
                parsed.lines_parsed += 1;
                parsed.records.push(record);
            }
            ParsedLine::Limit(event) => {
                parsed.lines_parsed += 1;
                parsed.limit_events.push(event);
            }
            ParsedLine::Skipped => parsed.lines_skipped += 1,
            ParsedLine::Malformed => parsed.parse_errors += 1,
            ParsedLine::Invalid => parsed.invalid_records += 1,
        }
    }
    parsed
}

/// Fold one file's parse output into a pull batch and hand back the cursor
/// the source should store. Unknown models are warned once per source.
pub(crate) fn absorb(
    batch: &mut PullBatch,
    parsed: FileParse,
    warned_models: &mut HashSet<String>,
) -> FileCursor {
    for model in &parsed.fallback_models {
        if warned_models.insert(model.clone()) {
            warn!(model = model.as_str(), "unknown model, billing at default rates");
        }
    }
    batch.stats.lines_parsed += parsed.lines_parsed;
    batch.stats.lines_skipped += parsed.lines_skipped;
    batch.stats.parse_errors += parsed.parse_errors;
    batch.stats.invalid_records += parsed.invalid_records;
    if let Some(issue) = parsed.issue {
        batch.stats.files_skipped += 1;
        batch.stats.issues.push(issue);
    }
    batch.records.extend(parsed.records);
    batch.limit_events.extend(parsed.limit_events);
    parsed.cursor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> ParsedLine {
        parse_usage_line(line, Platform::Claude)
    }

    #[test]
    fn nested_usage_takes_precedence_over_top_level() {
        let line = r#"{"timestamp":"2025-06-01T10:00:00Z","input_tokens":1,"message":{"model":"claude-sonnet-4","usage":{"input_tokens":100,"output_tokens":50,"cache_creation_input_tokens":10,"cache_read_input_tokens":20}}}"#;
        match parse(line) {
            ParsedLine::Record { record, .. } => {
                assert_eq!(record.tokens.input_tokens, 100);
                assert_eq!(record.tokens.output_tokens, 50);
                assert_eq!(record.tokens.cache_creation_tokens, 10);
                assert_eq!(record.tokens.cache_read_tokens, 20);
                assert_eq!(record.model, "claude-sonnet-4");
            }
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn top_level_fields_are_the_fallback_schema() {
        let line = r#"{"timestamp":"2025-06-01T10:00:00Z","model":"gpt-4","input_tokens":10,"output_tokens":5,"cache_creation_tokens":0,"cache_read_tokens":0}"#;
        match parse(line) {
            ParsedLine::Record { record, .. } => {
                assert_eq!(record.tokens.input_tokens, 10);
                assert_eq!(record.model, "gpt-4");
            }
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn explicit_cost_field_is_authoritative() {
        let line = r#"{"timestamp":"2025-06-01T10:00:00Z","model":"claude-sonnet-4","input_tokens":1000000,"output_tokens":0,"costUSD":1.23}"#;
        match parse(line) {
            ParsedLine::Record { record, .. } => assert!((record.cost_usd - 1.23).abs() < 1e-9),
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn computed_cost_matches_dot_product() {
        let line = r#"{"timestamp":"2025-06-01T10:00:00Z","message":{"model":"claude-sonnet-4","usage":{"input_tokens":1000,"output_tokens":5000,"cache_creation_input_tokens":10000,"cache_read_input_tokens":50000}}}"#;
        match parse(line) {
            ParsedLine::Record { record, .. } => assert!((record.cost_usd - 0.1305).abs() < 1e-9),
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn offset_timestamps_normalize_to_utc() {
        let line = r#"{"timestamp":"2025-06-01T12:00:00+02:00","model":"gpt-4","input_tokens":1,"output_tokens":1}"#;
        match parse(line) {
            ParsedLine::Record { record, .. } => {
                assert_eq!(record.timestamp.to_rfc3339(), "2025-06-01T10:00:00+00:00");
            }
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn lines_without_usage_are_skipped() {
        let line = r#"{"timestamp":"2025-06-01T10:00:00Z","type":"user","content":"hello"}"#;
        assert!(matches!(parse(line), ParsedLine::Skipped));
    }

    #[test]
    fn negative_token_counts_are_invalid() {
        let line = r#"{"timestamp":"2025-06-01T10:00:00Z","model":"gpt-4","input_tokens":-5,"output_tokens":1}"#;
        assert!(matches!(parse(line), ParsedLine::Invalid));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        assert!(matches!(parse("not json {"), ParsedLine::Malformed));
    }

    #[test]
    fn missing_timestamp_with_usage_is_malformed() {
        let line = r#"{"model":"gpt-4","input_tokens":5,"output_tokens":1}"#;
        assert!(matches!(parse(line), ParsedLine::Malformed));
    }

    #[test]
    fn limit_system_messages_become_limit_events() {
        let line = r#"{"timestamp":"2025-06-01T10:00:00Z","type":"system","content":"Rate limit exceeded for Opus until 15:00"}"#;
        match parse(line) {
            ParsedLine::Limit(event) => assert!(event.message.contains("Opus")),
            other => panic!("expected limit event, got {:?}", other),
        }
        let line = r#"{"timestamp":"2025-06-01T10:00:00Z","type":"system","content":"Token limit reached"}"#;
        assert!(matches!(parse(line), ParsedLine::Limit(_)));
    }

    #[test]
    fn rate_limit_without_opus_is_not_a_limit_event() {
        let line = r#"{"timestamp":"2025-06-01T10:00:00Z","type":"system","content":"rate limit on requests"}"#;
        assert!(matches!(parse(line), ParsedLine::Skipped));
    }

    #[test]
    fn message_id_falls_back_to_nested_id() {
        let line = r#"{"timestamp":"2025-06-01T10:00:00Z","request_id":"r1","message":{"id":"m1","model":"claude-sonnet-4","usage":{"input_tokens":1,"output_tokens":1}}}"#;
        match parse(line) {
            ParsedLine::Record { record, .. } => {
                assert_eq!(record.message_id.as_deref(), Some("m1"));
                assert_eq!(record.request_id.as_deref(), Some("r1"));
            }
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn unknown_models_flag_the_pricing_fallback() {
        let line = r#"{"timestamp":"2025-06-01T10:00:00Z","model":"mystery-9","input_tokens":1,"output_tokens":1}"#;
        match parse(line) {
            ParsedLine::Record {
                pricing_fallback, ..
            } => assert!(pricing_fallback),
            other => panic!("expected record, got {:?}", other),
        }
    }
}
