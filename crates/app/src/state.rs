use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;

use monitor_core::{LimitEvent, Platform};

use crate::aggregator::{SessionBlock, UsageStats};
use crate::alerts::Alert;
use crate::burn::BurnRate;
use crate::p90::P90Estimate;
use crate::plans::PlanLimits;

/// Lightweight view of a session block for the UI; the aggregator keeps the
/// full record lists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockSummary {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub actual_end_time: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub call_count: usize,
}

impl From<&SessionBlock> for BlockSummary {
    fn from(block: &SessionBlock) -> Self {
        Self {
            id: block.id.clone(),
            start_time: block.start_time,
            end_time: block.end_time,
            actual_end_time: block.actual_end_time,
            is_active: block.is_active,
            total_tokens: block.total_tokens(),
            total_cost: block.total_cost(),
            call_count: block.records.len(),
        }
    }
}

/// Everything the UI needs about one provider, assembled fresh each tick.
#[derive(Debug, Clone, Serialize)]
pub struct MonitorState {
    pub platform: Platform,
    /// Usage inside the current session block; what plan limits bound.
    pub session_stats: UsageStats,
    /// Rolling 24 hour usage.
    pub daily_stats: UsageStats,
    pub current_block: Option<BlockSummary>,
    pub burn_rate: BurnRate,
    pub p90_limit: Option<P90Estimate>,
    pub active_alerts: Vec<Alert>,
    pub plan_limits: PlanLimits,
    pub should_reset: bool,
    pub reset_reason: String,
    pub health_score: f64,
    pub source_healthy: bool,
    pub source_error: Option<String>,
    pub skipped_lines_last_tick: u64,
    pub parse_errors_last_tick: u64,
    pub limit_events: Vec<LimitEvent>,
    pub last_update: DateTime<Utc>,
}

/// Both provider slots plus cross-provider totals.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MultiPlatformState {
    pub codex: Option<MonitorState>,
    pub claude: Option<MonitorState>,
    pub last_update: Option<DateTime<Utc>>,
}

impl MultiPlatformState {
    pub fn state_for(&self, platform: Platform) -> Option<&MonitorState> {
        match platform {
            Platform::Codex => self.codex.as_ref(),
            Platform::Claude => self.claude.as_ref(),
        }
    }

    pub fn set_state(&mut self, state: MonitorState) {
        match state.platform {
            Platform::Codex => self.codex = Some(state),
            Platform::Claude => self.claude = Some(state),
        }
    }

    pub fn active_platforms(&self) -> Vec<Platform> {
        let mut platforms = Vec::new();
        if self.codex.is_some() {
            platforms.push(Platform::Codex);
        }
        if self.claude.is_some() {
            platforms.push(Platform::Claude);
        }
        platforms
    }

    pub fn total_cost(&self) -> f64 {
        self.slots().map(|state| state.daily_stats.total_cost).sum()
    }

    pub fn total_tokens(&self) -> u64 {
        self.slots()
            .map(|state| state.daily_stats.total_tokens)
            .sum()
    }

    fn slots(&self) -> impl Iterator<Item = &MonitorState> {
        self.codex.iter().chain(self.claude.iter())
    }
}

/// Writer half of the snapshot channel. Each publish swaps in a fresh
/// `Arc`; readers keep whatever snapshot they already borrowed.
pub struct StatePublisher {
    tx: watch::Sender<Arc<MultiPlatformState>>,
}

impl StatePublisher {
    pub fn publish(&self, state: MultiPlatformState) {
        let _ = self.tx.send(Arc::new(state));
    }

    pub fn subscribe(&self) -> StateReader {
        StateReader {
            rx: self.tx.subscribe(),
        }
    }
}

/// Reader half. Cloneable; `snapshot` never blocks the driver.
#[derive(Clone)]
pub struct StateReader {
    rx: watch::Receiver<Arc<MultiPlatformState>>,
}

impl StateReader {
    pub fn snapshot(&self) -> Arc<MultiPlatformState> {
        self.rx.borrow().clone()
    }

    /// Wait for the next published snapshot. False when the driver is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

pub fn state_channel() -> (StatePublisher, StateReader) {
    let (tx, rx) = watch::channel(Arc::new(MultiPlatformState::default()));
    (StatePublisher { tx }, StateReader { rx })
}
