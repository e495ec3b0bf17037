use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use monitor_core::UsageRecord;

use crate::aggregator::UsageStats;
use crate::plans::PlanLimits;

pub const DEFAULT_BURN_WINDOW_MINUTES: i64 = 10;

const FULL_CONFIDENCE_SAMPLES: f64 = 20.0;

/// Consumption rates derived from the recent record tail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BurnRate {
    pub tokens_per_minute: f64,
    pub cost_per_minute: f64,
    /// Minutes until the tightest plan limit; `None` when unbounded.
    pub estimated_time_to_limit: Option<f64>,
    pub confidence: f64,
}

/// Rates over the last `window_minutes` of records. Fewer than two samples
/// in the window means there is no trend to extrapolate.
pub fn estimate_burn_rate(
    records: &[UsageRecord],
    now: DateTime<Utc>,
    window_minutes: i64,
    limits: &PlanLimits,
    current: &UsageStats,
) -> BurnRate {
    let since = now - Duration::minutes(window_minutes);
    let tail: Vec<&UsageRecord> = records
        .iter()
        .filter(|record| record.timestamp >= since)
        .collect();
    if tail.len() < 2 {
        return BurnRate::default();
    }

    let minutes = window_minutes as f64;
    let tokens_per_minute = tail
        .iter()
        .map(|record| record.tokens.total() as f64)
        .sum::<f64>()
        / minutes;
    let cost_per_minute = tail.iter().map(|record| record.cost_usd).sum::<f64>() / minutes;

    let mut projections: Vec<f64> = Vec::new();
    if let Some(limit) = limits.token_limit {
        if tokens_per_minute > 0.0 {
            let remaining = limit.saturating_sub(current.total_tokens) as f64;
            projections.push(remaining / tokens_per_minute);
        }
    }
    if let Some(limit) = limits.cost_limit {
        if cost_per_minute > 0.0 {
            let remaining = (limit - current.total_cost).max(0.0);
            projections.push(remaining / cost_per_minute);
        }
    }
    let estimated_time_to_limit = projections.into_iter().reduce(f64::min);

    BurnRate {
        tokens_per_minute,
        cost_per_minute,
        estimated_time_to_limit,
        confidence: (tail.len() as f64 / FULL_CONFIDENCE_SAMPLES).min(1.0),
    }
}
