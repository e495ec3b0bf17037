use std::fs;

use chrono::{Duration, SecondsFormat, Utc};
use monitor_app::config::{MonitorConfig, PlatformSelection};
use monitor_app::driver::Monitor;
use monitor_app::p90::{DEFAULT_TOKEN_LIMIT, P90Source};
use monitor_core::Platform;
use monitor_ingest::UsageLogWriter;
use tempfile::tempdir;

fn claude_line(minutes_ago: i64, message_id: &str) -> String {
    let ts = (Utc::now() - Duration::minutes(minutes_ago))
        .to_rfc3339_opts(SecondsFormat::Millis, true);
    format!(
        r#"{{"timestamp":"{ts}","message_id":"{message_id}","request_id":"req-{message_id}","message":{{"model":"claude-sonnet-4","usage":{{"input_tokens":1000,"output_tokens":500,"cache_creation_input_tokens":0,"cache_read_input_tokens":0}}}}}}"#
    )
}

fn config_for(dir: &std::path::Path) -> MonitorConfig {
    let mut config = MonitorConfig::default();
    config.platforms = PlatformSelection::All;
    config.claude_root = Some(dir.join("claude"));
    config.codex_log_path = Some(dir.join("codex/usage_log.jsonl"));
    config
}

#[test]
fn one_tick_builds_a_coherent_snapshot() {
    let dir = tempdir().expect("tempdir");
    let claude_root = dir.path().join("claude/project-a");
    fs::create_dir_all(&claude_root).expect("create claude root");

    // The same entry lands in two overlapping log files; only one copy may
    // survive.
    let duplicated = claude_line(5, "m1");
    fs::write(
        claude_root.join("one.jsonl"),
        format!("{}\n{}\n", duplicated, claude_line(4, "m2")),
    )
    .expect("write first log");
    fs::write(
        claude_root.join("two.jsonl"),
        format!("{}\n{}\n", duplicated, claude_line(3, "m3")),
    )
    .expect("write second log");

    let writer = UsageLogWriter::new(dir.path().join("codex/usage_log.jsonl"));
    writer
        .append_call("gpt-4", 2_000, 1_000, Some("req-codex"))
        .expect("append codex call");

    let mut monitor = Monitor::new(config_for(dir.path())).expect("monitor");
    let reader = monitor.reader();
    let now = Utc::now();
    monitor.tick_blocking(now);

    let snapshot = reader.snapshot();
    assert_eq!(
        snapshot.active_platforms(),
        vec![Platform::Codex, Platform::Claude]
    );

    let claude = snapshot.claude.as_ref().expect("claude state");
    assert!(claude.source_healthy);
    assert_eq!(claude.session_stats.call_count, 3);
    assert_eq!(claude.session_stats.total_tokens, 3 * 1_500);
    assert!((claude.session_stats.total_cost - 3.0 * 0.0105).abs() < 1e-9);
    let block = claude.current_block.as_ref().expect("current block");
    assert!(block.is_active);

    let codex = snapshot.codex.as_ref().expect("codex state");
    assert_eq!(codex.session_stats.call_count, 1);
    assert_eq!(codex.session_stats.total_tokens, 3_000);

    assert_eq!(snapshot.total_tokens(), 3 * 1_500 + 3_000);

    // Custom plan: the token limit comes from the P90 floor while the only
    // block is still active.
    let p90 = claude.p90_limit.expect("p90 estimate");
    assert_eq!(p90.limit, DEFAULT_TOKEN_LIMIT);
    assert_eq!(p90.source, P90Source::Default);
    assert_eq!(claude.plan_limits.token_limit, Some(DEFAULT_TOKEN_LIMIT));
}

#[test]
fn reprocessing_the_same_stream_changes_nothing() {
    let dir = tempdir().expect("tempdir");
    let claude_root = dir.path().join("claude/project-a");
    fs::create_dir_all(&claude_root).expect("create claude root");
    let log = claude_root.join("session.jsonl");
    let lines = format!("{}\n{}\n", claude_line(10, "m1"), claude_line(8, "m2"));
    fs::write(&log, &lines).expect("write log");

    let mut config = config_for(dir.path());
    config.platforms = PlatformSelection::Claude;
    let mut monitor = Monitor::new(config).expect("monitor");
    let reader = monitor.reader();

    monitor.tick_blocking(Utc::now());
    let first = reader.snapshot();
    let first_tokens = first.claude.as_ref().expect("claude").session_stats.total_tokens;

    // The provider re-emits the same entries; the tail picks them up but
    // dedup keeps the totals fixed.
    let mut file = fs::OpenOptions::new()
        .append(true)
        .open(&log)
        .expect("open log");
    use std::io::Write;
    file.write_all(lines.as_bytes()).expect("append duplicates");
    drop(file);
    monitor.tick_blocking(Utc::now());
    let second = reader.snapshot();
    let second_tokens = second
        .claude
        .as_ref()
        .expect("claude")
        .session_stats
        .total_tokens;
    assert_eq!(first_tokens, second_tokens);
    assert_eq!(first_tokens, 2 * 1_500);
}

#[test]
fn missing_claude_root_marks_the_source_unhealthy() {
    let dir = tempdir().expect("tempdir");
    let mut config = config_for(dir.path());
    config.platforms = PlatformSelection::Claude;

    let mut monitor = Monitor::new(config).expect("monitor");
    let reader = monitor.reader();
    monitor.tick_blocking(Utc::now());

    let snapshot = reader.snapshot();
    let claude = snapshot.claude.as_ref().expect("claude state");
    assert!(!claude.source_healthy);
    assert!(claude.source_error.as_deref().unwrap_or("").contains("missing"));
    assert_eq!(claude.session_stats.call_count, 0);
}

#[test]
fn pinned_custom_token_limit_is_not_overwritten_by_p90() {
    let dir = tempdir().expect("tempdir");
    let claude_root = dir.path().join("claude/project-a");
    fs::create_dir_all(&claude_root).expect("create claude root");
    fs::write(
        claude_root.join("session.jsonl"),
        format!("{}\n{}\n", claude_line(10, "m1"), claude_line(8, "m2")),
    )
    .expect("write log");

    let mut config = config_for(dir.path());
    config.platforms = PlatformSelection::Claude;
    config.custom_limit_tokens = Some(500_000);
    let mut monitor = Monitor::new(config).expect("monitor");
    let reader = monitor.reader();
    monitor.tick_blocking(Utc::now());

    let snapshot = reader.snapshot();
    let claude = snapshot.claude.as_ref().expect("claude state");
    assert_eq!(claude.plan_limits.token_limit, Some(500_000));
    assert!(claude.p90_limit.is_some());
}
