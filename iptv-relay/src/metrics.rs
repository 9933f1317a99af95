//! Relay metrics collection and reporting.
//!
//! Process-local counters for the request path (selections, redirects,
//! proxied responses), the scoring scheduler (passes, probes), and the
//! channel document refresh.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use log::info;
use serde::Serialize;

/// Relay-wide counters.
pub struct RelayMetrics {
    /// Process start time.
    start_time: Instant,
    /// Successful selections.
    selections: AtomicU64,
    /// Selections answered with a redirect.
    redirects: AtomicU64,
    /// Selections answered by relaying the upstream.
    proxied: AtomicU64,
    /// Relays that failed and fell back to a redirect.
    proxy_fallbacks: AtomicU64,
    /// Requests for channels without an available source.
    not_found: AtomicU64,
    /// Availability checks run by the scheduler.
    probes: AtomicU64,
    /// Availability checks that reported unavailable.
    failed_probes: AtomicU64,
    /// Completed scoring passes.
    scoring_passes: AtomicU64,
    /// Channel document refreshes applied.
    refreshes_ok: AtomicU64,
    /// Channel document refreshes rejected.
    refreshes_failed: AtomicU64,
}

/// Point-in-time copy of [`RelayMetrics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub selections: u64,
    pub redirects: u64,
    pub proxied: u64,
    pub proxy_fallbacks: u64,
    pub not_found: u64,
    pub probes: u64,
    pub failed_probes: u64,
    pub scoring_passes: u64,
    pub refreshes_ok: u64,
    pub refreshes_failed: u64,
}

impl RelayMetrics {
    /// Create a new metrics instance.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Record a successful selection.
    pub fn record_selection(&self, proxied: bool) {
        self.selections.fetch_add(1, Ordering::Relaxed);
        if proxied {
            self.proxied.fetch_add(1, Ordering::Relaxed);
        } else {
            self.redirects.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a relay that fell back to a redirect.
    pub fn record_proxy_fallback(&self) {
        self.proxy_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request with no available source.
    pub fn record_not_found(&self) {
        self.not_found.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one scheduler probe.
    pub fn record_probe(&self, success: bool) {
        self.probes.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed_probes.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a completed scoring pass.
    pub fn record_pass(&self) {
        self.scoring_passes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a refresh outcome.
    pub fn record_refresh(&self, ok: bool) {
        if ok {
            self.refreshes_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.refreshes_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Copy the current counter values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            selections: self.selections.load(Ordering::Relaxed),
            redirects: self.redirects.load(Ordering::Relaxed),
            proxied: self.proxied.load(Ordering::Relaxed),
            proxy_fallbacks: self.proxy_fallbacks.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            probes: self.probes.load(Ordering::Relaxed),
            failed_probes: self.failed_probes.load(Ordering::Relaxed),
            scoring_passes: self.scoring_passes.load(Ordering::Relaxed),
            refreshes_ok: self.refreshes_ok.load(Ordering::Relaxed),
            refreshes_failed: self.refreshes_failed.load(Ordering::Relaxed),
        }
    }

    /// Print a human-readable metrics report.
    pub fn print_report(&self) {
        let s = self.snapshot();
        info!(
            "[Relay] Metrics: uptime={}s, selections={} (redirect={}, proxied={}, fallback={}), \
             not_found={}, probes={} (failed={}), passes={}, refreshes={}/{}",
            s.uptime_secs,
            s.selections,
            s.redirects,
            s.proxied,
            s.proxy_fallbacks,
            s.not_found,
            s.probes,
            s.failed_probes,
            s.scoring_passes,
            s.refreshes_ok,
            s.refreshes_ok + s.refreshes_failed
        );
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        RelayMetrics {
            start_time: Instant::now(),
            selections: AtomicU64::new(0),
            redirects: AtomicU64::new(0),
            proxied: AtomicU64::new(0),
            proxy_fallbacks: AtomicU64::new(0),
            not_found: AtomicU64::new(0),
            probes: AtomicU64::new(0),
            failed_probes: AtomicU64::new(0),
            scoring_passes: AtomicU64::new(0),
            refreshes_ok: AtomicU64::new(0),
            refreshes_failed: AtomicU64::new(0),
        }
    }
}
