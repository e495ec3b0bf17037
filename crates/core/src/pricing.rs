use serde::Serialize;

use crate::TokenUsage;

/// Per-model price vector in USD per 1M tokens. Cache rates are absent for
/// providers that do not bill cache traffic separately.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelPricing {
    pub input_per_1m: f64,
    pub output_per_1m: f64,
    pub cache_creation_per_1m: Option<f64>,
    pub cache_read_per_1m: Option<f64>,
}

/// Outcome of a pricing lookup. `fallback` marks models priced at the
/// conservative default because no table entry matched.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPricing {
    pub model: String,
    pub pricing: ModelPricing,
    pub fallback: bool,
}

const SONNET: ModelPricing = ModelPricing {
    input_per_1m: 3.00,
    output_per_1m: 15.00,
    cache_creation_per_1m: Some(3.75),
    cache_read_per_1m: Some(0.30),
};

const OPUS: ModelPricing = ModelPricing {
    input_per_1m: 15.00,
    output_per_1m: 75.00,
    cache_creation_per_1m: Some(18.75),
    cache_read_per_1m: Some(1.50),
};

const HAIKU: ModelPricing = ModelPricing {
    input_per_1m: 0.25,
    output_per_1m: 1.25,
    cache_creation_per_1m: Some(0.3125),
    cache_read_per_1m: Some(0.025),
};

// The default entry intentionally over-estimates: unknown models bill at
// Sonnet rates rather than under-reporting spend.
static PRICING_TABLE: &[(&str, ModelPricing)] = &[
    ("claude-sonnet-4", SONNET),
    ("claude-sonnet-3.5", SONNET),
    ("claude-sonnet-3", SONNET),
    ("claude-opus-4", OPUS),
    ("claude-opus-3", OPUS),
    ("claude-haiku-3.5", HAIKU),
    ("claude-haiku-3", HAIKU),
    (
        "gpt-4-turbo",
        ModelPricing {
            input_per_1m: 10.00,
            output_per_1m: 30.00,
            cache_creation_per_1m: None,
            cache_read_per_1m: None,
        },
    ),
    (
        "gpt-4",
        ModelPricing {
            input_per_1m: 30.00,
            output_per_1m: 60.00,
            cache_creation_per_1m: None,
            cache_read_per_1m: None,
        },
    ),
    (
        "gpt-3.5-turbo",
        ModelPricing {
            input_per_1m: 0.50,
            output_per_1m: 1.50,
            cache_creation_per_1m: None,
            cache_read_per_1m: None,
        },
    ),
    ("default", SONNET),
];

/// Canonicalize a provider model name: lower-case, drop the release-date
/// suffix, and fold Claude version spellings ("3-5", "3.5") into the table
/// keys. Non-Claude names keep their stripped form and rely on prefix
/// matching at lookup time.
pub fn normalize_model_name(model: &str) -> String {
    let lowered = model.trim().to_ascii_lowercase();
    if lowered.is_empty() {
        return "unknown".to_string();
    }
    let stripped = strip_date_suffix(&lowered);
    if stripped.contains("sonnet") {
        if stripped.contains("3.5") || stripped.contains("3-5") {
            return "claude-sonnet-3.5".to_string();
        }
        if stripped.contains('4') {
            return "claude-sonnet-4".to_string();
        }
        return "claude-sonnet-3".to_string();
    }
    if stripped.contains("opus") {
        if stripped.contains('4') {
            return "claude-opus-4".to_string();
        }
        return "claude-opus-3".to_string();
    }
    if stripped.contains("haiku") {
        if stripped.contains("3.5") || stripped.contains("3-5") {
            return "claude-haiku-3.5".to_string();
        }
        return "claude-haiku-3".to_string();
    }
    stripped.to_string()
}

fn strip_date_suffix(name: &str) -> &str {
    let mut current = name;
    // Trailing segments like "-20250514"; seen repeated on some release ids.
    while let Some((head, tail)) = current.rsplit_once('-') {
        if tail.len() == 8 && tail.chars().all(|ch| ch.is_ascii_digit()) {
            current = head;
        } else {
            break;
        }
    }
    current
}

/// Look up pricing for a raw model name: exact match on the normalized
/// name, then longest prefix, then the default entry.
pub fn resolve_pricing(model: &str) -> ResolvedPricing {
    let normalized = normalize_model_name(model);
    for (key, pricing) in PRICING_TABLE {
        if *key != "default" && normalized == *key {
            return ResolvedPricing {
                model: normalized,
                pricing: *pricing,
                fallback: false,
            };
        }
    }
    let mut best: Option<(&str, ModelPricing)> = None;
    for (key, pricing) in PRICING_TABLE {
        if *key == "default" || !normalized.starts_with(key) {
            continue;
        }
        match best {
            Some((matched, _)) if matched.len() >= key.len() => {}
            _ => best = Some((key, *pricing)),
        }
    }
    if let Some((_, pricing)) = best {
        return ResolvedPricing {
            model: normalized,
            pricing,
            fallback: false,
        };
    }
    ResolvedPricing {
        model: normalized,
        pricing: SONNET,
        fallback: true,
    }
}

/// Cost of one call as the dot product of token counts and per-1M rates.
/// Models without cache rates bill cache traffic at the input rate.
pub fn compute_cost_usd(tokens: &TokenUsage, pricing: &ModelPricing) -> f64 {
    let cache_creation_rate = pricing.cache_creation_per_1m.unwrap_or(pricing.input_per_1m);
    let cache_read_rate = pricing.cache_read_per_1m.unwrap_or(pricing.input_per_1m);
    (tokens.input_tokens as f64 * pricing.input_per_1m
        + tokens.output_tokens as f64 * pricing.output_per_1m
        + tokens.cache_creation_tokens as f64 * cache_creation_rate
        + tokens.cache_read_tokens as f64 * cache_read_rate)
        / 1_000_000.0
}

/// Counterfactual saving from cache reads: what they would have cost at the
/// input rate minus what they actually cost.
pub fn cache_savings_usd(tokens: &TokenUsage, pricing: &ModelPricing) -> f64 {
    match pricing.cache_read_per_1m {
        Some(cache_read_rate) => {
            tokens.cache_read_tokens as f64 * (pricing.input_per_1m - cache_read_rate)
                / 1_000_000.0
        }
        None => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claude_cache_rates_are_fixed_ratios_of_input() {
        for (key, pricing) in PRICING_TABLE {
            if !key.starts_with("claude") {
                continue;
            }
            let cache_creation = pricing.cache_creation_per_1m.expect("cache creation rate");
            let cache_read = pricing.cache_read_per_1m.expect("cache read rate");
            assert_eq!(cache_creation, pricing.input_per_1m * 1.25, "{key}");
            assert!(
                (cache_read / pricing.input_per_1m - 0.10).abs() < 1e-15,
                "{key}"
            );
        }
    }

    #[test]
    fn sonnet_call_costs_match_reference() {
        let tokens = TokenUsage {
            input_tokens: 1_000,
            output_tokens: 5_000,
            cache_creation_tokens: 10_000,
            cache_read_tokens: 50_000,
        };
        let resolved = resolve_pricing("claude-sonnet-4");
        assert!(!resolved.fallback);
        let cost = compute_cost_usd(&tokens, &resolved.pricing);
        assert!((cost - 0.1305).abs() < 1e-9);
        let savings = cache_savings_usd(&tokens, &resolved.pricing);
        assert!((savings - 0.135).abs() < 1e-9);
    }

    #[test]
    fn normalization_strips_dates_and_folds_versions() {
        assert_eq!(normalize_model_name("claude-sonnet-4-20250514"), "claude-sonnet-4");
        assert_eq!(normalize_model_name("claude-3-5-sonnet-20241022"), "claude-sonnet-3.5");
        assert_eq!(normalize_model_name("Claude-3.5-Sonnet"), "claude-sonnet-3.5");
        assert_eq!(normalize_model_name("claude-opus-4-1-20250805"), "claude-opus-4");
        assert_eq!(normalize_model_name("claude-3-haiku"), "claude-haiku-3");
        assert_eq!(normalize_model_name("GPT-4"), "gpt-4");
        assert_eq!(normalize_model_name(""), "unknown");
    }

    #[test]
    fn lookup_prefers_longest_prefix() {
        let turbo = resolve_pricing("gpt-4-turbo-preview");
        assert_eq!(turbo.pricing.input_per_1m, 10.00);
        assert!(!turbo.fallback);
        let dated = resolve_pricing("gpt-4-0613");
        assert_eq!(dated.pricing.input_per_1m, 30.00);
        assert!(!dated.fallback);
    }

    #[test]
    fn unknown_models_fall_back_to_sonnet_rates() {
        let resolved = resolve_pricing("mystery-model-x");
        assert!(resolved.fallback);
        assert_eq!(resolved.pricing, SONNET);
    }

    #[test]
    fn models_without_cache_pricing_bill_cache_at_input_rate() {
        let tokens = TokenUsage {
            input_tokens: 0,
            output_tokens: 0,
            cache_creation_tokens: 1_000_000,
            cache_read_tokens: 1_000_000,
        };
        let resolved = resolve_pricing("gpt-4");
        let cost = compute_cost_usd(&tokens, &resolved.pricing);
        assert!((cost - 60.0).abs() < 1e-9);
        assert_eq!(cache_savings_usd(&tokens, &resolved.pricing), 0.0);
    }
}
