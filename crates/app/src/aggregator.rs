use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use monitor_core::{
    LimitEvent, Platform, TokenUsage, UsageRecord, cache_savings_usd, floor_to_hour,
    resolve_pricing,
};

pub const DEFAULT_ANALYSIS_WINDOW_HOURS: i64 = 192;

/// Per-model slice of a block or window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelStats {
    pub tokens: TokenUsage,
    pub cost_usd: f64,
    pub calls: u64,
}

/// Rolling session window keyed by its hour-floored start. Blocks form a
/// cover rather than a partition: overlapping sessions are allowed, so one
/// record can appear in more than one block.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionBlock {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub actual_end_time: Option<DateTime<Utc>>,
    pub is_gap: bool,
    pub is_active: bool,
    pub records: Vec<UsageRecord>,
    pub per_model_stats: HashMap<String, ModelStats>,
}

impl SessionBlock {
    fn new(start_time: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            id: start_time.to_rfc3339(),
            start_time,
            end_time: start_time + duration,
            actual_end_time: None,
            is_gap: false,
            is_active: false,
            records: Vec::new(),
            per_model_stats: HashMap::new(),
        }
    }

    fn gap(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            id: format!("gap-{}", start_time.to_rfc3339()),
            start_time,
            end_time,
            actual_end_time: None,
            is_gap: true,
            is_active: false,
            records: Vec::new(),
            per_model_stats: HashMap::new(),
        }
    }

    /// Half-open membership: a record exactly at `end_time` belongs to the
    /// next block, never this one.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start_time <= ts && ts < self.end_time
    }

    pub fn is_completed(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }

    pub fn total_tokens(&self) -> u64 {
        self.records
            .iter()
            .fold(0u64, |sum, record| sum.saturating_add(record.tokens.total()))
    }

    pub fn total_cost(&self) -> f64 {
        self.records.iter().map(|record| record.cost_usd).sum()
    }

    fn push(&mut self, record: UsageRecord) {
        let entry = self.per_model_stats.entry(record.model.clone()).or_default();
        entry.tokens = entry.tokens.add(&record.tokens);
        entry.cost_usd += record.cost_usd;
        entry.calls += 1;
        self.actual_end_time = Some(match self.actual_end_time {
            Some(current) => current.max(record.timestamp),
            None => record.timestamp,
        });
        self.records.push(record);
    }
}

/// Aggregated view over a set of records. Derived on demand, never stored
/// across ticks.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageStats {
    pub tokens: TokenUsage,
    pub total_tokens: u64,
    pub total_cost: f64,
    pub call_count: u64,
    pub cache_savings: f64,
    pub per_model: HashMap<String, ModelStats>,
}

impl UsageStats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a UsageRecord>) -> UsageStats {
        let mut stats = UsageStats::default();
        for record in records {
            stats.push(record);
        }
        stats
    }

    fn push(&mut self, record: &UsageRecord) {
        self.tokens = self.tokens.add(&record.tokens);
        self.total_tokens = self.tokens.total();
        self.total_cost += record.cost_usd;
        self.call_count += 1;
        let resolved = resolve_pricing(&record.model);
        self.cache_savings += cache_savings_usd(&record.tokens, &resolved.pricing);
        let entry = self.per_model.entry(record.model.clone()).or_default();
        entry.tokens = entry.tokens.add(&record.tokens);
        entry.cost_usd += record.cost_usd;
        entry.calls += 1;
    }

    /// Fraction of prompt-side tokens served from cache.
    pub fn cache_hit_rate(&self) -> f64 {
        let denominator = self.tokens.input_tokens + self.tokens.cache_read_tokens;
        if denominator == 0 {
            return 0.0;
        }
        self.tokens.cache_read_tokens as f64 / denominator as f64
    }
}

/// Owns the records and session blocks of one provider.
#[derive(Debug)]
pub struct Aggregator {
    platform: Platform,
    analysis_window: Duration,
    records: Vec<UsageRecord>,
    blocks: Vec<SessionBlock>,
    limit_events: Vec<LimitEvent>,
}

impl Aggregator {
    pub fn new(platform: Platform) -> Self {
        Self::with_analysis_window(platform, DEFAULT_ANALYSIS_WINDOW_HOURS)
    }

    pub fn with_analysis_window(platform: Platform, hours: i64) -> Self {
        Self {
            platform,
            analysis_window: Duration::hours(hours),
            records: Vec::new(),
            blocks: Vec::new(),
            limit_events: Vec::new(),
        }
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn records(&self) -> &[UsageRecord] {
        &self.records
    }

    pub fn blocks(&self) -> &[SessionBlock] {
        &self.blocks
    }

    pub fn limit_events(&self) -> &[LimitEvent] {
        &self.limit_events
    }

    /// Admit a batch of deduplicated records. The batch is sorted by
    /// timestamp first so the resulting block cover does not depend on file
    /// enumeration order.
    pub fn admit(&mut self, mut batch: Vec<UsageRecord>, now: DateTime<Utc>) {
        batch.sort_by_key(|record| record.timestamp);
        for record in batch {
            self.admit_one(record);
        }
        self.rebuild_gaps();
        self.refresh_active(now);
    }

    fn admit_one(&mut self, record: UsageRecord) {
        let position = self
            .records
            .partition_point(|existing| existing.timestamp <= record.timestamp);
        self.records.insert(position, record.clone());

        let mut joined = false;
        for block in &mut self.blocks {
            if !block.is_gap && block.contains(record.timestamp) {
                block.push(record.clone());
                joined = true;
            }
        }
        if !joined {
            let start = floor_to_hour(record.timestamp);
            let mut block = SessionBlock::new(start, self.platform.block_duration());
            block.push(record);
            let position = self
                .blocks
                .partition_point(|existing| existing.start_time <= block.start_time);
            self.blocks.insert(position, block);
        }
    }

    pub fn record_limit_events(&mut self, events: Vec<LimitEvent>) {
        self.limit_events.extend(events);
    }

    /// Drop blocks, records, and limit notices older than the analysis
    /// window, then re-derive gaps and the active flag.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.analysis_window;
        self.blocks.retain(|block| block.end_time >= cutoff);
        self.records.retain(|record| record.timestamp >= cutoff);
        self.limit_events.retain(|event| event.timestamp >= cutoff);
        self.rebuild_gaps();
        self.refresh_active(now);
    }

    /// Synthetic idle markers between non-gap neighbors separated by more
    /// than one block duration. Recomputed from scratch; a late record can
    /// split a previously recorded gap.
    fn rebuild_gaps(&mut self) {
        self.blocks.retain(|block| !block.is_gap);
        let threshold = self.platform.block_duration();
        let mut gaps = Vec::new();
        for pair in self.blocks.windows(2) {
            let idle = pair[1].start_time - pair[0].end_time;
            if idle > threshold {
                gaps.push(SessionBlock::gap(pair[0].end_time, pair[1].start_time));
            }
        }
        self.blocks.extend(gaps);
        self.blocks
            .sort_by(|a, b| a.start_time.cmp(&b.start_time));
    }

    /// Only the most recent non-gap block can be active, and only while the
    /// clock is still inside its window.
    fn refresh_active(&mut self, now: DateTime<Utc>) {
        let latest = self.blocks.iter().rposition(|block| !block.is_gap);
        for (index, block) in self.blocks.iter_mut().enumerate() {
            block.is_active = Some(index) == latest
                && !block.is_gap
                && !block.records.is_empty()
                && now < block.end_time;
        }
    }

    pub fn current_block(&self) -> Option<&SessionBlock> {
        self.blocks
            .iter()
            .rev()
            .find(|block| !block.is_gap && !block.records.is_empty())
    }

    pub fn current_block_stats(&self) -> UsageStats {
        match self.current_block() {
            Some(block) => UsageStats::from_records(&block.records),
            None => UsageStats::default(),
        }
    }

    pub fn stats_since(&self, since: DateTime<Utc>) -> UsageStats {
        UsageStats::from_records(
            self.records
                .iter()
                .filter(|record| record.timestamp >= since),
        )
    }

    pub fn stats_last_hours(&self, now: DateTime<Utc>, hours: i64) -> UsageStats {
        self.stats_since(now - Duration::hours(hours))
    }

    pub fn window_stats(&self) -> UsageStats {
        UsageStats::from_records(&self.records)
    }
}
