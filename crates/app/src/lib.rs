pub mod aggregator;
pub mod alerts;
pub mod burn;
pub mod config;
pub mod dedup;
pub mod driver;
pub mod error;
pub mod p90;
pub mod plans;
pub mod state;

pub use aggregator::{Aggregator, ModelStats, SessionBlock, UsageStats};
pub use alerts::{
    Alert, AlertLevel, AlertMetric, evaluate_alerts, session_health_score, should_reset_session,
};
pub use burn::{BurnRate, estimate_burn_rate};
pub use config::{MonitorConfig, PlatformSelection};
pub use dedup::DedupFilter;
pub use driver::Monitor;
pub use error::{AppError, Result};
pub use p90::{P90Estimate, P90Source, p90_token_limit};
pub use plans::{PlanId, PlanLimits};
pub use state::{
    BlockSummary, MonitorState, MultiPlatformState, StatePublisher, StateReader, state_channel,
};
