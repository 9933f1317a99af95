//! Request-path source selection with fallback.
//!
//! Candidates are walked in their current ranking order:
//! - a candidate on a proxy-required host is accepted without a live test
//!   (such origins usually reject plain probes; the relay fetches them with
//!   their configured headers instead)
//! - any other candidate is tested on the spot, and the outcome is written
//!   back to the registry like a scheduler probe
//!
//! The first accepted candidate wins. The on-demand test complements the
//! periodic scoring pass and catches sources that died since it last ran.

use std::sync::Arc;

use log::{debug, info, warn};
use thiserror::Error;

use crate::checker::AvailabilityChecker;
use crate::source::{ProxyRules, SourceRegistry};

/// Source selection errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SelectError {
    /// Channel unknown or without candidates.
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    /// Every candidate failed its availability test.
    #[error("No source available for channel {0}")]
    NoSourceAvailable(String),
}

/// A chosen stream for a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    /// Stream URL.
    pub url: String,
    /// Whether the URL must be relayed instead of redirected to.
    pub proxied: bool,
    /// Number of candidates live-tested before this one was chosen.
    pub probed: usize,
}

/// Picks the first usable candidate of a channel.
pub struct SourceSelector {
    registry: Arc<SourceRegistry>,
    rules: Arc<ProxyRules>,
    checker: Arc<dyn AvailabilityChecker>,
}

impl SourceSelector {
    /// Create a selector over a shared registry.
    pub fn new(
        registry: Arc<SourceRegistry>,
        rules: Arc<ProxyRules>,
        checker: Arc<dyn AvailabilityChecker>,
    ) -> Self {
        Self {
            registry,
            rules,
            checker,
        }
    }

    /// Select a stream URL for `channel`.
    pub async fn select(&self, channel: &str) -> Result<Selection, SelectError> {
        let candidates = match self.registry.candidates(channel).await {
            Some(candidates) if !candidates.is_empty() => candidates,
            _ => {
                debug!("Channel {} is not configured", channel);
                return Err(SelectError::ChannelNotFound(channel.to_string()));
            }
        };

        let mut probed = 0;
        for candidate in &candidates {
            let url = candidate.url();

            if self.rules.requires_proxy(url) {
                info!("Channel {}: selected proxied source {}", channel, url);
                return Ok(Selection {
                    url: url.to_string(),
                    proxied: true,
                    probed,
                });
            }

            probed += 1;
            let available = self.checker.test(url).await;
            self.registry.record_outcome(channel, url, available).await;

            if available {
                info!(
                    "Channel {}: selected {} (rate={:.2}, {} checked)",
                    channel,
                    url,
                    candidate.success_rate(),
                    probed
                );
                return Ok(Selection {
                    url: url.to_string(),
                    proxied: false,
                    probed,
                });
            }

            warn!("Channel {}: source {} unavailable ({} check), trying next", channel, url, self.checker.name());
        }

        warn!(
            "Channel {}: none of {} sources is available",
            channel,
            candidates.len()
        );
        Err(SelectError::NoSourceAvailable(channel.to_string()))
    }

    /// Proxy rules used for selection.
    pub fn rules(&self) -> &Arc<ProxyRules> {
        &self.rules
    }
}
