use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::aggregator::UsageStats;
use crate::burn::BurnRate;
use crate::plans::PlanLimits;

pub const BURN_TOKENS_WARNING: f64 = 10_000.0;
pub const BURN_TOKENS_CRITICAL: f64 = 25_000.0;
pub const BURN_COST_WARNING: f64 = 1.00;
pub const BURN_COST_CRITICAL: f64 = 2.50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    Info,
    Warning,
    Critical,
    Danger,
}

impl AlertLevel {
    pub fn threshold(&self) -> f64 {
        match self {
            Self::Info => 50.0,
            Self::Warning => 75.0,
            Self::Critical => 90.0,
            Self::Danger => 95.0,
        }
    }

    /// Highest level whose threshold the percentage has reached. Equality
    /// picks the higher level: exactly 75.0 is WARNING, not INFO.
    pub fn from_usage_percentage(pct: f64) -> Option<AlertLevel> {
        if pct >= 95.0 {
            Some(Self::Danger)
        } else if pct >= 90.0 {
            Some(Self::Critical)
        } else if pct >= 75.0 {
            Some(Self::Warning)
        } else if pct >= 50.0 {
            Some(Self::Info)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
            Self::Danger => "DANGER",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertMetric {
    Tokens,
    Cost,
    BurnTokens,
    BurnCost,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub metric: AlertMetric,
    pub current_value: f64,
    pub threshold_value: f64,
    pub severity: u8,
    pub message: String,
    pub recommended_action: String,
    pub timestamp: DateTime<Utc>,
}

/// Evaluate the threshold ladder and burn-rate gates. Pure function of its
/// inputs; unlimited metrics emit nothing.
pub fn evaluate_alerts(
    stats: &UsageStats,
    burn: &BurnRate,
    limits: &PlanLimits,
    now: DateTime<Utc>,
) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if let Some(limit) = limits.token_limit {
        if limit > 0 {
            let pct = stats.total_tokens as f64 / limit as f64 * 100.0;
            if let Some(level) = AlertLevel::from_usage_percentage(pct) {
                alerts.push(usage_alert(
                    level,
                    AlertMetric::Tokens,
                    stats.total_tokens as f64,
                    limit as f64,
                    pct,
                    burn,
                    now,
                ));
            }
        }
    }
    if let Some(limit) = limits.cost_limit {
        if limit > 0.0 {
            let pct = stats.total_cost / limit * 100.0;
            if let Some(level) = AlertLevel::from_usage_percentage(pct) {
                alerts.push(usage_alert(
                    level,
                    AlertMetric::Cost,
                    stats.total_cost,
                    limit,
                    pct,
                    burn,
                    now,
                ));
            }
        }
    }

    if burn.tokens_per_minute > BURN_TOKENS_WARNING {
        let level = if burn.tokens_per_minute > BURN_TOKENS_CRITICAL {
            AlertLevel::Critical
        } else {
            AlertLevel::Warning
        };
        alerts.push(burn_alert(
            level,
            AlertMetric::BurnTokens,
            burn.tokens_per_minute,
            BURN_TOKENS_WARNING,
            now,
        ));
    }
    if burn.cost_per_minute > BURN_COST_WARNING {
        let level = if burn.cost_per_minute > BURN_COST_CRITICAL {
            AlertLevel::Critical
        } else {
            AlertLevel::Warning
        };
        alerts.push(burn_alert(
            level,
            AlertMetric::BurnCost,
            burn.cost_per_minute,
            BURN_COST_WARNING,
            now,
        ));
    }

    alerts
}

fn usage_alert(
    level: AlertLevel,
    metric: AlertMetric,
    current_value: f64,
    limit: f64,
    pct: f64,
    burn: &BurnRate,
    now: DateTime<Utc>,
) -> Alert {
    let mut message = match metric {
        AlertMetric::Tokens => format!(
            "Token usage at {pct:.1}% ({current_value:.0} / {limit:.0} tokens)"
        ),
        _ => format!("Cost usage at {pct:.1}% (${current_value:.2} / ${limit:.2})"),
    };
    if let Some(minutes) = burn.estimated_time_to_limit {
        message.push_str(&format!(
            ". Estimated time to limit: {}",
            format_minutes(minutes)
        ));
    }
    Alert {
        level,
        metric,
        current_value,
        threshold_value: limit * level.threshold() / 100.0,
        severity: severity_from_pct(pct),
        message,
        recommended_action: recommended_action(level, metric).to_string(),
        timestamp: now,
    }
}

fn burn_alert(
    level: AlertLevel,
    metric: AlertMetric,
    current_value: f64,
    threshold_value: f64,
    now: DateTime<Utc>,
) -> Alert {
    let message = match metric {
        AlertMetric::BurnTokens => format!(
            "High burn rate detected: {current_value:.0} tokens/min"
        ),
        _ => format!(
            "High cost burn rate: ${current_value:.2}/min (${:.2}/hour)",
            current_value * 60.0
        ),
    };
    Alert {
        level,
        metric,
        current_value,
        threshold_value,
        severity: if level == AlertLevel::Critical { 95 } else { 80 },
        message,
        recommended_action: recommended_action(level, metric).to_string(),
        timestamp: now,
    }
}

fn severity_from_pct(pct: f64) -> u8 {
    pct.round().clamp(0.0, 100.0) as u8
}

fn format_minutes(minutes: f64) -> String {
    if minutes < 60.0 {
        format!("{minutes:.1} minutes")
    } else if minutes < 1_440.0 {
        format!("{:.1} hours", minutes / 60.0)
    } else {
        format!("{:.1} days", minutes / 1_440.0)
    }
}

fn recommended_action(level: AlertLevel, metric: AlertMetric) -> &'static str {
    match (level, metric) {
        (AlertLevel::Danger, AlertMetric::Cost | AlertMetric::BurnCost) => {
            "IMMEDIATE ACTION REQUIRED. Stop current session to avoid exceeding budget."
        }
        (AlertLevel::Danger, _) => {
            "IMMEDIATE ACTION REQUIRED. Stop current session and reset before the token limit is reached."
        }
        (AlertLevel::Critical, AlertMetric::Tokens) => {
            "Plan to reset session soon. Review usage patterns and optimize prompts to reduce consumption."
        }
        (AlertLevel::Critical, AlertMetric::Cost) => {
            "Plan to reset session soon. Shift remaining work to cheaper models where possible."
        }
        (_, AlertMetric::BurnTokens) => {
            "Consider reducing request frequency or implementing rate limiting. Review recent API calls for inefficiencies."
        }
        (_, AlertMetric::BurnCost) => {
            "Monitor cost carefully. Consider optimizing prompts or using more cost-effective models."
        }
        (AlertLevel::Warning, _) => {
            "Monitor usage closely. Consider implementing rate limiting or optimizing API calls."
        }
        (AlertLevel::Info, _) => "Usage within normal range. Continue monitoring.",
    }
}

/// Reset is recommended on any DANGER alert, or when a metric sits at 90%
/// or more with under half an hour of headroom. An idle session that
/// already crossed into DANGER still reports true.
pub fn should_reset_session(
    alerts: &[Alert],
    stats: &UsageStats,
    burn: &BurnRate,
    limits: &PlanLimits,
) -> (bool, String) {
    if alerts.iter().any(|alert| alert.level == AlertLevel::Danger) {
        return (true, "DANGER level alert triggered".to_string());
    }
    let max_pct = max_usage_percentage(stats, limits);
    if max_pct >= 90.0 {
        if let Some(minutes) = burn.estimated_time_to_limit {
            if minutes < 30.0 {
                return (
                    true,
                    format!("Usage at {max_pct:.1}% with less than 30 minutes to limit"),
                );
            }
        }
    }
    (false, String::new())
}

/// 100 minus the worst usage percentage, minus 10 per CRITICAL and 25 per
/// DANGER alert, clamped to [0, 100].
pub fn session_health_score(stats: &UsageStats, limits: &PlanLimits, alerts: &[Alert]) -> f64 {
    let mut score = 100.0 - max_usage_percentage(stats, limits).min(100.0);
    for alert in alerts {
        match alert.level {
            AlertLevel::Critical => score -= 10.0,
            AlertLevel::Danger => score -= 25.0,
            _ => {}
        }
    }
    score.clamp(0.0, 100.0)
}

fn max_usage_percentage(stats: &UsageStats, limits: &PlanLimits) -> f64 {
    let mut max_pct = 0.0f64;
    if let Some(limit) = limits.token_limit {
        if limit > 0 {
            max_pct = max_pct.max(stats.total_tokens as f64 / limit as f64 * 100.0);
        }
    }
    if let Some(limit) = limits.cost_limit {
        if limit > 0.0 {
            max_pct = max_pct.max(stats.total_cost / limit * 100.0);
        }
    }
    max_pct
}
