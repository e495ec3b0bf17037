use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregator::SessionBlock;

/// Floor for the derived limit, matching the smallest known session tier.
pub const DEFAULT_TOKEN_LIMIT: u64 = 44_000;

/// Session token budgets observed on the Pro, Max5, and Max20 tiers.
pub const KNOWN_TOKEN_LIMITS: [u64; 3] = [44_000, 88_000, 220_000];

const LIMIT_DETECTION_THRESHOLD: f64 = 0.95;
const FULL_CONFIDENCE_SAMPLES: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum P90Source {
    KnownLimit,
    Fallback,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct P90Estimate {
    pub limit: u64,
    pub confidence: f64,
    pub source: P90Source,
}

/// Derive a session token budget from completed non-gap blocks. Blocks that
/// came within 95% of a known tier budget are the preferred sample: they
/// mark sessions that actually hit the provider's ceiling.
pub fn p90_token_limit(blocks: &[SessionBlock], now: DateTime<Utc>) -> P90Estimate {
    let completed: Vec<u64> = blocks
        .iter()
        .filter(|block| !block.is_gap && block.is_completed(now) && !block.records.is_empty())
        .map(|block| block.total_tokens())
        .collect();
    if completed.is_empty() {
        return P90Estimate {
            limit: DEFAULT_TOKEN_LIMIT,
            confidence: 0.0,
            source: P90Source::Default,
        };
    }

    let near_limit: Vec<u64> = completed
        .iter()
        .copied()
        .filter(|total| {
            KNOWN_TOKEN_LIMITS
                .iter()
                .any(|limit| *total as f64 >= *limit as f64 * LIMIT_DETECTION_THRESHOLD)
        })
        .collect();

    let (values, source) = if near_limit.is_empty() {
        (completed, P90Source::Fallback)
    } else {
        (near_limit, P90Source::KnownLimit)
    };
    let confidence = (values.len() as f64 / FULL_CONFIDENCE_SAMPLES).min(1.0);
    P90Estimate {
        limit: percentile_90(values).max(DEFAULT_TOKEN_LIMIT),
        confidence,
        source,
    }
}

/// Value at index `ceil(0.9 n) - 1` of the ascending sort. Spelled out so
/// the result is reproducible against other implementations.
fn percentile_90(mut values: Vec<u64>) -> u64 {
    values.sort_unstable();
    let index = ((0.9 * values.len() as f64).ceil() as usize).saturating_sub(1);
    values[index]
}
