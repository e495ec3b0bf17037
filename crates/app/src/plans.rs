use std::fmt;

use serde::{Deserialize, Serialize};

/// Alert ladder percentages shared by every plan.
pub const WARNING_THRESHOLDS: [f64; 4] = [50.0, 75.0, 90.0, 95.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanId {
    Free,
    Payg,
    Tier1,
    Tier2,
    Pro,
    Max5,
    Max20,
    Custom,
}

impl PlanId {
    pub fn parse(raw: &str) -> Option<PlanId> {
        match raw.to_ascii_lowercase().as_str() {
            "free" => Some(Self::Free),
            "payg" => Some(Self::Payg),
            "tier1" => Some(Self::Tier1),
            "tier2" => Some(Self::Tier2),
            "pro" => Some(Self::Pro),
            "max5" => Some(Self::Max5),
            "max20" => Some(Self::Max20),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Payg => "payg",
            Self::Tier1 => "tier1",
            Self::Tier2 => "tier2",
            Self::Pro => "pro",
            Self::Max5 => "max5",
            Self::Max20 => "max20",
            Self::Custom => "custom",
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Self::Custom)
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Budget a provider is monitored against. The custom plan's token limit is
/// refreshed from the P90 estimate each tick unless the user pinned one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanLimits {
    pub id: PlanId,
    pub name: String,
    pub token_limit: Option<u64>,
    pub cost_limit: Option<f64>,
    pub warning_thresholds: [f64; 4],
}

impl PlanLimits {
    pub fn for_plan(id: PlanId) -> PlanLimits {
        let (name, token_limit, cost_limit) = match id {
            PlanId::Free => ("Free Tier", Some(100_000), None),
            PlanId::Payg => ("Pay-As-You-Go", None, Some(100.0)),
            PlanId::Tier1 => ("Tier 1", Some(1_000_000), Some(50.0)),
            PlanId::Tier2 => ("Tier 2", Some(5_000_000), Some(250.0)),
            PlanId::Pro => ("Pro", Some(44_000), Some(18.0)),
            PlanId::Max5 => ("Max5", Some(88_000), Some(35.0)),
            PlanId::Max20 => ("Max20", Some(220_000), Some(140.0)),
            PlanId::Custom => ("Custom (P90-based)", None, Some(50.0)),
        };
        PlanLimits {
            id,
            name: name.to_string(),
            token_limit,
            cost_limit,
            warning_thresholds: WARNING_THRESHOLDS,
        }
    }
}
