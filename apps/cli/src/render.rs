use chrono_tz::Tz;

use monitor_app::state::{MonitorState, MultiPlatformState};

/// Compact status lines printed once per published snapshot. Timestamps are
/// the only place the display timezone appears; everything upstream is UTC.
pub fn print_snapshot(snapshot: &MultiPlatformState, tz: &Tz) {
    for state in [snapshot.codex.as_ref(), snapshot.claude.as_ref()]
        .into_iter()
        .flatten()
    {
        print_platform(state, tz);
    }
    if snapshot.active_platforms().len() > 1 {
        println!(
            "  combined: {} tokens, ${:.2}",
            snapshot.total_tokens(),
            snapshot.total_cost()
        );
    }
}

fn print_platform(state: &MonitorState, tz: &Tz) {
    let time = state.last_update.with_timezone(tz).format("%H:%M:%S");
    let tokens = state.session_stats.total_tokens;
    let usage = match state.plan_limits.token_limit {
        Some(limit) if limit > 0 => {
            format!("{:.1}% of {}", tokens as f64 / limit as f64 * 100.0, limit)
        }
        _ => "no token limit".to_string(),
    };
    let mut line = format!(
        "[{time}] {}: {tokens} tokens ({usage}), ${:.2}, {:.0} tok/min, health {:.0}",
        state.platform.display_name(),
        state.session_stats.total_cost,
        state.burn_rate.tokens_per_minute,
        state.health_score,
    );
    if !state.source_healthy {
        line.push_str(" [source unavailable]");
    }
    println!("{line}");

    for alert in &state.active_alerts {
        println!("  {}: {}", alert.level, alert.message);
    }
    if state.should_reset {
        println!("  reset recommended: {}", state.reset_reason);
    }
}
