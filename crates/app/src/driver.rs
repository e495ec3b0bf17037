use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use monitor_core::Platform;
use monitor_ingest::{
    ClaudeSource, CodexSource, PullBatch, SourceError, default_claude_root, default_codex_log_path,
};

use crate::aggregator::Aggregator;
use crate::alerts::{evaluate_alerts, session_health_score, should_reset_session};
use crate::burn::estimate_burn_rate;
use crate::config::MonitorConfig;
use crate::dedup::DedupFilter;
use crate::error::Result;
use crate::p90::p90_token_limit;
use crate::plans::PlanLimits;
use crate::state::{
    BlockSummary, MonitorState, MultiPlatformState, StatePublisher, StateReader, state_channel,
};

type PullResult = std::result::Result<PullBatch, SourceError>;

enum SourceKind {
    Claude(ClaudeSource),
    Codex(CodexSource),
}

impl SourceKind {
    fn pull(&mut self) -> PullResult {
        match self {
            Self::Claude(source) => source.pull_new_records(),
            Self::Codex(source) => source.pull_new_records(),
        }
    }
}

/// One provider's slice of the pipeline: source, dedup set, aggregator, and
/// the plan limits currently in force.
struct PlatformMonitor {
    platform: Platform,
    source: Option<SourceKind>,
    dedup: DedupFilter,
    aggregator: Aggregator,
    limits: PlanLimits,
}

impl PlatformMonitor {
    fn new(platform: Platform, source: SourceKind, config: &MonitorConfig) -> Self {
        Self {
            platform,
            source: Some(source),
            dedup: DedupFilter::new(),
            aggregator: Aggregator::with_analysis_window(platform, config.analysis_window_hours),
            limits: config.plan_limits(),
        }
    }

    /// Fold one pull into the aggregator and assemble this tick's state.
    /// `None` means the pull was skipped (soft deadline); stats stay last
    /// known good because the aggregator keeps its records.
    fn integrate(
        &mut self,
        pull: Option<PullResult>,
        now: DateTime<Utc>,
        config: &MonitorConfig,
    ) -> MonitorState {
        let mut source_healthy = true;
        let mut source_error = None;
        let mut skipped_lines = 0;
        let mut parse_errors = 0;

        match pull {
            Some(Ok(batch)) => {
                skipped_lines = batch.stats.lines_skipped;
                parse_errors = batch.stats.parse_errors + batch.stats.invalid_records;
                for issue in &batch.stats.issues {
                    warn!(
                        platform = %self.platform,
                        file = issue.file_path.as_str(),
                        "source issue: {}",
                        issue.message
                    );
                }
                let records: Vec<_> = batch
                    .records
                    .into_iter()
                    .filter(|record| self.dedup.accept(record))
                    .collect();
                self.aggregator.record_limit_events(batch.limit_events);
                self.aggregator.admit(records, now);
            }
            Some(Err(err)) => {
                warn!(platform = %self.platform, "source pull failed: {err}");
                source_healthy = false;
                source_error = Some(err.to_string());
            }
            None => {}
        }
        self.aggregator.prune(now);

        let p90_limit = if config.plan.is_custom() {
            let estimate = p90_token_limit(self.aggregator.blocks(), now);
            if config.custom_limit_tokens.is_none() {
                self.limits.token_limit = Some(estimate.limit);
            }
            Some(estimate)
        } else {
            None
        };

        let session_stats = self.aggregator.current_block_stats();
        let daily_stats = self
            .aggregator
            .stats_since(daily_reset_start(now, config.reset_hour));
        let burn_rate = estimate_burn_rate(
            self.aggregator.records(),
            now,
            config.burn_window_minutes,
            &self.limits,
            &session_stats,
        );
        let active_alerts = evaluate_alerts(&session_stats, &burn_rate, &self.limits, now);
        let (should_reset, reset_reason) =
            should_reset_session(&active_alerts, &session_stats, &burn_rate, &self.limits);
        let health_score = session_health_score(&session_stats, &self.limits, &active_alerts);

        MonitorState {
            platform: self.platform,
            current_block: self.aggregator.current_block().map(BlockSummary::from),
            session_stats,
            daily_stats,
            burn_rate,
            p90_limit,
            active_alerts,
            plan_limits: self.limits.clone(),
            should_reset,
            reset_reason,
            health_score,
            source_healthy,
            source_error,
            skipped_lines_last_tick: skipped_lines,
            parse_errors_last_tick: parse_errors,
            limit_events: self.aggregator.limit_events().to_vec(),
            last_update: now,
        }
    }
}

/// Start of the current daily bucket: the most recent occurrence of the
/// configured reset hour, in UTC.
fn daily_reset_start(now: DateTime<Utc>, reset_hour: u8) -> DateTime<Utc> {
    let reset_today = now
        .date_naive()
        .and_hms_opt(u32::from(reset_hour), 0, 0)
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
        .unwrap_or_else(|| monitor_core::floor_to_hour(now));
    if reset_today <= now {
        reset_today
    } else {
        reset_today - Duration::days(1)
    }
}

/// Blocking worker that owns one source. The driver requests pulls over a
/// channel so slow file IO can never stall the tick loop.
struct SourceWorker {
    request_tx: mpsc::Sender<()>,
    result_rx: mpsc::Receiver<PullResult>,
    in_flight: bool,
}

fn spawn_source_worker(mut source: SourceKind) -> SourceWorker {
    let (request_tx, mut request_rx) = mpsc::channel::<()>(1);
    let (result_tx, result_rx) = mpsc::channel::<PullResult>(2);
    tokio::task::spawn_blocking(move || {
        while request_rx.blocking_recv().is_some() {
            if result_tx.blocking_send(source.pull()).is_err() {
                break;
            }
        }
    });
    SourceWorker {
        request_tx,
        result_rx,
        in_flight: false,
    }
}

impl SourceWorker {
    /// Request a pull (unless the previous one is still running) and wait up
    /// to the soft deadline. An overrunning pull is collected on a later
    /// tick; the dedup filter absorbs any re-read.
    async fn pull_with_deadline(&mut self, deadline: StdDuration) -> Option<PullResult> {
        if !self.in_flight {
            if self.request_tx.send(()).await.is_err() {
                return None;
            }
            self.in_flight = true;
        }
        match tokio::time::timeout(deadline, self.result_rx.recv()).await {
            Ok(Some(result)) => {
                self.in_flight = false;
                Some(result)
            }
            Ok(None) => None,
            Err(_) => {
                debug!("source pull exceeded its soft deadline, deferring to next tick");
                None
            }
        }
    }
}

/// The driver: owns every per-provider pipeline and publishes one coherent
/// snapshot per tick.
pub struct Monitor {
    config: MonitorConfig,
    platforms: Vec<PlatformMonitor>,
    publisher: StatePublisher,
    reader: StateReader,
}

impl Monitor {
    pub fn new(config: MonitorConfig) -> Result<Monitor> {
        config.validate()?;
        let (publisher, reader) = state_channel();
        let mut platforms = Vec::new();
        if config.platforms.includes(Platform::Codex) {
            let path = config
                .codex_log_path
                .clone()
                .unwrap_or_else(default_codex_log_path);
            platforms.push(PlatformMonitor::new(
                Platform::Codex,
                SourceKind::Codex(CodexSource::new(path)),
                &config,
            ));
        }
        if config.platforms.includes(Platform::Claude) {
            let root = config.claude_root.clone().unwrap_or_else(default_claude_root);
            platforms.push(PlatformMonitor::new(
                Platform::Claude,
                SourceKind::Claude(ClaudeSource::new(root)),
                &config,
            ));
        }
        Ok(Monitor {
            config,
            platforms,
            publisher,
            reader,
        })
    }

    pub fn reader(&self) -> StateReader {
        self.reader.clone()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// One synchronous pipeline pass: pull inline, integrate, publish.
    pub fn tick_blocking(&mut self, now: DateTime<Utc>) {
        let mut multi = MultiPlatformState::default();
        for platform in &mut self.platforms {
            let pull = platform.source.as_mut().map(|source| source.pull());
            let state = platform.integrate(pull, now, &self.config);
            multi.set_state(state);
        }
        multi.last_update = Some(now);
        self.publisher.publish(multi);
    }

    /// Driver loop. Sources live on blocking workers; a pull that exceeds
    /// half the tick period is deferred rather than stalling the loop, and
    /// missed ticks are skipped instead of piling up.
    pub async fn run(mut self, cancel: CancellationToken) {
        let period = StdDuration::from_secs(self.config.refresh_rate_secs);
        let soft_deadline = period / 2;
        let mut workers: Vec<Option<SourceWorker>> = self
            .platforms
            .iter_mut()
            .map(|platform| platform.source.take().map(spawn_source_worker))
            .collect();
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            let now = Utc::now();
            let mut multi = MultiPlatformState::default();
            for (platform, worker) in self.platforms.iter_mut().zip(workers.iter_mut()) {
                if cancel.is_cancelled() {
                    return;
                }
                let pull = match worker {
                    Some(worker) => worker.pull_with_deadline(soft_deadline).await,
                    None => None,
                };
                multi.set_state(platform.integrate(pull, now, &self.config));
            }
            multi.last_update = Some(now);
            self.publisher.publish(multi);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn daily_bucket_starts_at_the_most_recent_reset_hour() {
        let afternoon = Utc.with_ymd_and_hms(2025, 6, 1, 14, 30, 0).unwrap();
        assert_eq!(
            daily_reset_start(afternoon, 9),
            Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
        );
        // Before the reset hour the bucket began yesterday.
        let early = Utc.with_ymd_and_hms(2025, 6, 1, 5, 0, 0).unwrap();
        assert_eq!(
            daily_reset_start(early, 9),
            Utc.with_ymd_and_hms(2025, 5, 31, 9, 0, 0).unwrap()
        );
        // Midnight reset is the plain calendar day.
        assert_eq!(
            daily_reset_start(afternoon, 0),
            Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
        );
    }
}
