use std::collections::{HashSet, VecDeque};

use monitor_core::UsageRecord;

const DEFAULT_CAPACITY: usize = 100_000;

/// Suppresses records whose `(message_id, request_id)` pair was already
/// observed. Providers re-emit entries across overlapping log files; without
/// this filter aggregate costs drift upward. One filter per provider, so
/// identical pairs on different providers never collide.
#[derive(Debug)]
pub struct DedupFilter {
    seen: HashSet<(String, String)>,
    order: VecDeque<(String, String)>,
    capacity: usize,
}

impl DedupFilter {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    /// True when the record should be kept. Records without both ids are
    /// always accepted.
    pub fn accept(&mut self, record: &UsageRecord) -> bool {
        let Some(key) = record.dedup_key() else {
            return true;
        };
        if self.seen.contains(&key) {
            return false;
        }
        self.seen.insert(key.clone());
        self.order.push_back(key);
        if self.order.len() > self.capacity {
            self.evict_oldest_half();
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn evict_oldest_half(&mut self) {
        let evict = self.order.len() / 2;
        for _ in 0..evict {
            if let Some(key) = self.order.pop_front() {
                self.seen.remove(&key);
            }
        }
    }
}

impl Default for DedupFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use monitor_core::{Platform, TokenUsage};

    fn record(message_id: Option<&str>, request_id: Option<&str>) -> UsageRecord {
        UsageRecord {
            timestamp: Utc::now(),
            model: "claude-sonnet-4".to_string(),
            tokens: TokenUsage::default(),
            cost_usd: 0.0,
            message_id: message_id.map(str::to_string),
            request_id: request_id.map(str::to_string),
            platform: Platform::Claude,
        }
    }

    #[test]
    fn duplicate_pairs_are_suppressed() {
        let mut filter = DedupFilter::new();
        assert!(filter.accept(&record(Some("m1"), Some("r1"))));
        assert!(!filter.accept(&record(Some("m1"), Some("r1"))));
        assert!(filter.accept(&record(Some("m1"), Some("r2"))));
    }

    #[test]
    fn records_without_both_ids_always_pass() {
        let mut filter = DedupFilter::new();
        assert!(filter.accept(&record(None, None)));
        assert!(filter.accept(&record(None, None)));
        assert!(filter.accept(&record(Some("m1"), None)));
        assert!(filter.accept(&record(Some("m1"), None)));
        assert!(filter.is_empty());
    }

    #[test]
    fn overflow_evicts_the_oldest_half() {
        let mut filter = DedupFilter::with_capacity(4);
        for i in 0..5 {
            assert!(filter.accept(&record(Some(&format!("m{i}")), Some("r"))));
        }
        // m0 and m1 were evicted when the fifth entry arrived.
        assert!(filter.accept(&record(Some("m0"), Some("r"))));
        assert!(!filter.accept(&record(Some("m4"), Some("r"))));
    }
}
