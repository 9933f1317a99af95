//! Web server shared state.

use std::sync::Arc;

use crate::metrics::RelayMetrics;
use crate::scheduler::ScoringScheduler;
use crate::source::{ChannelLoader, ProxyForwarder, SourceRegistry, SourceSelector};

/// Everything the HTTP handlers need, shared behind one `Arc`.
pub struct WebState {
    /// Channel → ranked candidates.
    pub registry: Arc<SourceRegistry>,
    /// Request-path selection.
    pub selector: SourceSelector,
    /// Relay for proxy-required hosts.
    pub forwarder: ProxyForwarder,
    /// Periodic scoring; also triggered from the API.
    pub scheduler: Arc<ScoringScheduler>,
    /// Channel document source for refreshes.
    pub loader: ChannelLoader,
    /// Relay counters.
    pub metrics: Arc<RelayMetrics>,
}

impl WebState {
    /// Bundle the relay components.
    pub fn new(
        registry: Arc<SourceRegistry>,
        selector: SourceSelector,
        forwarder: ProxyForwarder,
        scheduler: Arc<ScoringScheduler>,
        loader: ChannelLoader,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            registry,
            selector,
            forwarder,
            scheduler,
            loader,
            metrics,
        }
    }
}
