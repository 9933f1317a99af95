//! Periodic source scoring scheduler.
//!
//! This module keeps the candidate ranking of every channel up to date by
//! probing each candidate on a fixed interval.
//!
//! # How It Works
//!
//! 1. The scheduler runs as a background task
//! 2. On every tick it walks all channels in the registry
//! 3. Each candidate is probed through the [`AvailabilityChecker`], except
//!    candidates on proxy-required hosts, which count as available
//! 4. Every outcome is recorded, then the channel is re-ranked
//!
//! Probes within a channel are spaced by `probe_delay_ms`. Passes never
//! overlap: a manual trigger during a running pass waits for it to finish,
//! and at most one manual pass is queued at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info};
use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tokio::time::{interval, MissedTickBehavior};

use crate::checker::AvailabilityChecker;
use crate::metrics::RelayMetrics;
use crate::source::{ProxyRules, SourceRegistry};

/// Scoring scheduler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoringSchedulerConfig {
    /// Whether the periodic task is started at all.
    pub enabled: bool,
    /// Interval between scoring passes (seconds).
    pub interval_secs: u64,
    /// Pause between consecutive probes of one channel (milliseconds).
    pub probe_delay_ms: u64,
}

impl Default for ScoringSchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 1800, // Every 30 minutes
            probe_delay_ms: 1000,
        }
    }
}

/// Scoring scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    /// Scheduler is running.
    Running,
    /// Scheduler is paused; scheduled passes are skipped.
    Paused,
    /// Scheduler is stopped.
    Stopped,
}

/// Outcome of one scoring pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    /// Channels scored.
    pub channels: usize,
    /// Availability checks run.
    pub probes: usize,
    /// Available outcomes the registry kept, proxied candidates included.
    pub successes: usize,
    /// Candidates accepted without a check.
    pub proxied: usize,
    /// Wall-clock duration of the pass.
    pub elapsed_ms: u64,
    /// Unix timestamp of completion.
    pub finished_at: i64,
}

/// Periodic source scoring scheduler.
pub struct ScoringScheduler {
    registry: Arc<SourceRegistry>,
    rules: Arc<ProxyRules>,
    checker: Arc<dyn AvailabilityChecker>,
    metrics: Arc<RelayMetrics>,
    config: ScoringSchedulerConfig,
    /// Current state.
    state: Mutex<SchedulerState>,
    /// Held for the whole duration of a pass.
    pass_lock: Mutex<()>,
    /// Wakes the loop on stop.
    wake: Notify,
    /// Set while a requested manual pass is queued or running.
    manual_pending: AtomicBool,
    last_summary: Mutex<Option<PassSummary>>,
}

impl ScoringScheduler {
    /// Create a new scoring scheduler.
    pub fn new(
        registry: Arc<SourceRegistry>,
        rules: Arc<ProxyRules>,
        checker: Arc<dyn AvailabilityChecker>,
        metrics: Arc<RelayMetrics>,
        config: ScoringSchedulerConfig,
    ) -> Self {
        Self {
            registry,
            rules,
            checker,
            metrics,
            config,
            state: Mutex::new(SchedulerState::Running),
            pass_lock: Mutex::new(()),
            wake: Notify::new(),
            manual_pending: AtomicBool::new(false),
            last_summary: Mutex::new(None),
        }
    }

    /// Scheduler configuration.
    pub fn config(&self) -> &ScoringSchedulerConfig {
        &self.config
    }

    /// Start the scheduler background task. The first pass runs immediately.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    /// Run the scheduler loop.
    async fn run(&self) {
        info!(
            "ScoringScheduler: Starting with interval {} seconds, probe delay {} ms, checker {}",
            self.config.interval_secs,
            self.config.probe_delay_ms,
            self.checker.name()
        );

        let period = Duration::from_secs(self.config.interval_secs.max(1));
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.wake.notified() => {}
            }

            let state = *self.state.lock().await;
            match state {
                SchedulerState::Stopped => {
                    info!("ScoringScheduler: Stopped");
                    break;
                }
                SchedulerState::Paused => {
                    debug!("ScoringScheduler: Paused, skipping pass");
                    continue;
                }
                SchedulerState::Running => {}
            }

            self.run_scoring_pass().await;

            let next = chrono::Local::now()
                + chrono::Duration::seconds(self.config.interval_secs as i64);
            info!("ScoringScheduler: Next pass due at {}", next.format("%Y-%m-%d %H:%M:%S"));
        }
    }

    /// Probe every candidate of every channel, record the outcomes, and
    /// re-rank each channel.
    ///
    /// Waits for a pass already in progress. A refresh that lands mid-pass
    /// takes effect for the channels not yet visited; outcomes for
    /// candidates it removed are dropped by the registry.
    pub async fn run_scoring_pass(&self) -> PassSummary {
        let _pass = self.pass_lock.lock().await;
        let started = Instant::now();
        let delay = Duration::from_millis(self.config.probe_delay_ms);
        let mut summary = PassSummary::default();

        let channels = self.registry.channels().await;
        info!("ScoringScheduler: Scoring {} channel(s)", channels.len());

        for key in channels {
            let Some(candidates) = self.registry.candidates(&key).await else {
                debug!("ScoringScheduler: Channel {} was removed, skipping", key);
                continue;
            };
            summary.channels += 1;

            let mut probed_in_channel = 0;
            for candidate in &candidates {
                let url = candidate.url();

                let success = if self.rules.requires_proxy(url) {
                    summary.proxied += 1;
                    true
                } else {
                    if probed_in_channel > 0 && !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    probed_in_channel += 1;

                    let available = self.checker.test(url).await;
                    summary.probes += 1;
                    self.metrics.record_probe(available);
                    available
                };

                let recorded = self.registry.record_outcome(&key, url, success).await;
                if success && recorded {
                    summary.successes += 1;
                }
            }

            self.registry.reorder(&key).await;
            self.log_ranking(&key).await;
        }

        summary.elapsed_ms = started.elapsed().as_millis() as u64;
        summary.finished_at = chrono::Utc::now().timestamp();

        info!(
            "ScoringScheduler: Pass complete: {} channels, {} probes, {} available, {} proxied in {:.1}s",
            summary.channels,
            summary.probes,
            summary.successes,
            summary.proxied,
            summary.elapsed_ms as f64 / 1000.0
        );
        self.metrics.record_pass();
        self.metrics.print_report();

        *self.last_summary.lock().await = Some(summary.clone());
        summary
    }

    async fn log_ranking(&self, key: &str) {
        if !log::log_enabled!(log::Level::Debug) {
            return;
        }
        let Some(candidates) = self.registry.candidates(key).await else {
            return;
        };

        debug!("ScoringScheduler: Ranking for {}:", key);
        for (rank, candidate) in candidates.iter().enumerate() {
            debug!(
                "  #{:<2} rate={:.2} ({}/{}) {}",
                rank + 1,
                candidate.success_rate(),
                candidate.success_attempts(),
                candidate.total_attempts(),
                candidate.url()
            );
        }
    }

    /// Run a pass now, outside the regular schedule.
    pub async fn trigger_pass(&self) -> PassSummary {
        info!("ScoringScheduler: Manual pass triggered");
        self.run_scoring_pass().await
    }

    /// Queue a manual pass in the background.
    ///
    /// Returns `false` without queuing anything when an earlier request is
    /// still waiting or running.
    pub fn request_pass(self: &Arc<Self>) -> bool {
        if self.manual_pending.swap(true, Ordering::AcqRel) {
            info!("ScoringScheduler: Manual pass already pending, request coalesced");
            return false;
        }

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            scheduler.trigger_pass().await;
            scheduler.manual_pending.store(false, Ordering::Release);
        });
        true
    }

    /// Summary of the last completed pass.
    pub async fn last_summary(&self) -> Option<PassSummary> {
        self.last_summary.lock().await.clone()
    }

    /// Pause the scheduler.
    pub async fn pause(&self) {
        let mut state = self.state.lock().await;
        if *state == SchedulerState::Running {
            *state = SchedulerState::Paused;
            info!("ScoringScheduler: Paused");
        }
    }

    /// Resume the scheduler.
    pub async fn resume(&self) {
        let mut state = self.state.lock().await;
        if *state == SchedulerState::Paused {
            *state = SchedulerState::Running;
            info!("ScoringScheduler: Resumed");
        }
    }

    /// Stop the scheduler. A pass in progress runs to completion.
    pub async fn stop(&self) {
        *self.state.lock().await = SchedulerState::Stopped;
        self.wake.notify_one();
        info!("ScoringScheduler: Stop requested");
    }

    /// Get the current scheduler state.
    pub async fn state(&self) -> SchedulerState {
        *self.state.lock().await
    }
}
