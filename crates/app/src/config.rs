use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use monitor_core::Platform;

use crate::aggregator::DEFAULT_ANALYSIS_WINDOW_HOURS;
use crate::burn::DEFAULT_BURN_WINDOW_MINUTES;
use crate::error::{AppError, Result};
use crate::plans::{PlanId, PlanLimits};

pub const DEFAULT_REFRESH_RATE_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformSelection {
    Codex,
    Claude,
    All,
}

impl PlatformSelection {
    pub fn parse(raw: &str) -> Option<PlatformSelection> {
        match raw.to_ascii_lowercase().as_str() {
            "codex" => Some(Self::Codex),
            "claude" => Some(Self::Claude),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    pub fn includes(&self, platform: Platform) -> bool {
        match self {
            Self::All => true,
            Self::Codex => platform == Platform::Codex,
            Self::Claude => platform == Platform::Claude,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Codex => "codex",
            Self::Claude => "claude",
            Self::All => "all",
        }
    }
}

impl fmt::Display for PlatformSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings the driver observes. Built by the CLI from flags plus the
/// persisted `last_used.json`, validated before the first tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    pub platforms: PlatformSelection,
    pub plan: PlanId,
    pub custom_limit_tokens: Option<u64>,
    pub custom_limit_cost: Option<f64>,
    pub refresh_rate_secs: u64,
    /// Display timezone name; internal arithmetic stays in UTC.
    pub timezone: String,
    pub reset_hour: u8,
    pub analysis_window_hours: i64,
    pub burn_window_minutes: i64,
    pub claude_root: Option<PathBuf>,
    pub codex_log_path: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            platforms: PlatformSelection::All,
            plan: PlanId::Custom,
            custom_limit_tokens: None,
            custom_limit_cost: None,
            refresh_rate_secs: DEFAULT_REFRESH_RATE_SECS,
            timezone: "UTC".to_string(),
            reset_hour: 0,
            analysis_window_hours: DEFAULT_ANALYSIS_WINDOW_HOURS,
            burn_window_minutes: DEFAULT_BURN_WINDOW_MINUTES,
            claude_root: None,
            codex_log_path: None,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=60).contains(&self.refresh_rate_secs) {
            return Err(AppError::Config(format!(
                "refresh rate must be between 1 and 60 seconds, got {}",
                self.refresh_rate_secs
            )));
        }
        if self.reset_hour > 23 {
            return Err(AppError::Config(format!(
                "reset hour must be between 0 and 23, got {}",
                self.reset_hour
            )));
        }
        if self.analysis_window_hours <= 0 {
            return Err(AppError::Config(
                "analysis window must be positive".to_string(),
            ));
        }
        if self.burn_window_minutes <= 0 {
            return Err(AppError::Config("burn window must be positive".to_string()));
        }
        if (self.custom_limit_tokens.is_some() || self.custom_limit_cost.is_some())
            && !self.plan.is_custom()
        {
            return Err(AppError::Config(format!(
                "custom limits require the custom plan, got --plan {}",
                self.plan
            )));
        }
        Ok(())
    }

    /// Starting limits for one provider. User overrides on the custom plan
    /// pin the limit; otherwise the driver refreshes it from P90 each tick.
    pub fn plan_limits(&self) -> PlanLimits {
        let mut limits = PlanLimits::for_plan(self.plan);
        if self.plan.is_custom() {
            if let Some(tokens) = self.custom_limit_tokens {
                limits.token_limit = Some(tokens);
            }
            if let Some(cost) = self.custom_limit_cost {
                limits.cost_limit = Some(cost);
            }
        }
        limits
    }
}
