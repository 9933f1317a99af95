//! Registry of channels and their health-ordered candidate URLs.
//!
//! Locking is two-level:
//! - the channel map sits behind one `RwLock`; [`SourceRegistry::refresh`]
//!   takes it exclusively and swaps the whole map, every other operation
//!   holds it shared for its full duration
//! - each channel's candidate list sits behind its own `RwLock`; reads are
//!   shared, [`SourceRegistry::record_outcome`] and
//!   [`SourceRegistry::reorder`] are exclusive, which serializes them per
//!   channel and makes every counter update atomic
//!
//! The outer lock is always taken before the inner one.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::RwLock;

use iptv_relay_protocol::{validate_channel_sources, Candidate, ChannelSources, RefreshError};

/// One channel and its candidates in ranking order.
#[derive(Debug)]
struct ChannelEntry {
    candidates: RwLock<Vec<Candidate>>,
}

impl ChannelEntry {
    fn new(candidates: Vec<Candidate>) -> Arc<Self> {
        Arc::new(Self {
            candidates: RwLock::new(candidates),
        })
    }
}

/// Outcome of a successful refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Channels in the new snapshot.
    pub channels: usize,
    /// Candidates in the new snapshot.
    pub candidates: usize,
    /// Candidates whose counters were carried over from the old snapshot.
    pub carried_over: usize,
    /// Channels of the old snapshot that are no longer present.
    pub dropped_channels: usize,
}

/// Shared registry of channel candidates.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    channels: RwLock<HashMap<String, Arc<ChannelEntry>>>,
}

impl SourceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry populated from `sources`.
    pub async fn with_sources(sources: &ChannelSources) -> Result<Self, RefreshError> {
        let registry = Self::new();
        registry.refresh(sources).await?;
        Ok(registry)
    }

    /// All known channel keys, sorted.
    pub async fn channels(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.channels.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Current ranking for `key`, or `None` if the channel is unknown.
    pub async fn candidates(&self, key: &str) -> Option<Vec<Candidate>> {
        let channels = self.channels.read().await;
        let entry = channels.get(key)?;
        let candidates = entry.candidates.read().await.clone();
        Some(candidates)
    }

    /// Every channel with its current ranking, sorted by key.
    pub async fn snapshot(&self) -> Vec<(String, Vec<Candidate>)> {
        let channels = self.channels.read().await;
        let mut result = Vec::with_capacity(channels.len());
        for (key, entry) in channels.iter() {
            result.push((key.clone(), entry.candidates.read().await.clone()));
        }
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }

    /// Number of known channels.
    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }

    /// Replace the whole snapshot with `sources`.
    ///
    /// Candidates whose URL already existed under the same channel keep their
    /// counters. Channels and URLs missing from `sources` are dropped. An
    /// invalid payload leaves the current snapshot untouched. Duplicate URLs
    /// within one channel are collapsed to their first occurrence.
    pub async fn refresh(&self, sources: &ChannelSources) -> Result<RefreshSummary, RefreshError> {
        if let Err(e) = validate_channel_sources(sources) {
            warn!("Rejected channel refresh: {}", e);
            return Err(e);
        }

        let mut channels = self.channels.write().await;
        let mut next = HashMap::with_capacity(sources.len());
        let mut summary = RefreshSummary {
            channels: sources.len(),
            ..Default::default()
        };

        for (key, urls) in sources {
            let previous = match channels.get(key) {
                Some(entry) => entry.candidates.read().await.clone(),
                None => Vec::new(),
            };
            let previous_by_url: HashMap<&str, &Candidate> =
                previous.iter().map(|c| (c.url(), c)).collect();

            let mut seen = HashSet::new();
            let mut candidates = Vec::with_capacity(urls.len());
            for url in urls {
                if !seen.insert(url.as_str()) {
                    debug!("Channel {}: ignoring duplicate candidate {}", key, url);
                    continue;
                }
                let mut candidate = Candidate::new(url.clone());
                if let Some(old) = previous_by_url.get(url.as_str()) {
                    candidate.inherit_counters(old);
                    summary.carried_over += 1;
                }
                candidates.push(candidate);
            }

            summary.candidates += candidates.len();
            next.insert(key.clone(), ChannelEntry::new(candidates));
        }

        summary.dropped_channels = channels.keys().filter(|k| !next.contains_key(*k)).count();
        *channels = next;

        info!(
            "Channel snapshot replaced: {} channels, {} candidates ({} carried over, {} channels dropped)",
            summary.channels, summary.candidates, summary.carried_over, summary.dropped_channels
        );

        Ok(summary)
    }

    /// Record one health-check outcome for `url` under `key`.
    ///
    /// Returns `false` without changing anything when the channel or URL is
    /// no longer present, e.g. after a concurrent refresh dropped it.
    pub async fn record_outcome(&self, key: &str, url: &str, success: bool) -> bool {
        let channels = self.channels.read().await;
        let Some(entry) = channels.get(key) else {
            debug!("Discarding outcome for unknown channel {}", key);
            return false;
        };

        let mut candidates = entry.candidates.write().await;
        match candidates.iter_mut().find(|c| c.url() == url) {
            Some(candidate) => {
                candidate.record(success);
                true
            }
            None => {
                debug!("Discarding outcome for stale candidate {} of {}", url, key);
                false
            }
        }
    }

    /// Re-sort `key`'s candidates by descending success rate.
    ///
    /// The sort is stable: candidates with equal rates keep their relative
    /// order. Returns `false` if the channel is unknown.
    pub async fn reorder(&self, key: &str) -> bool {
        let channels = self.channels.read().await;
        let Some(entry) = channels.get(key) else {
            return false;
        };

        let mut candidates = entry.candidates.write().await;
        candidates.sort_by(|a, b| b.success_rate().total_cmp(&a.success_rate()));
        true
    }
}
