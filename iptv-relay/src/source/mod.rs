//! Channel sources for the relay.
//!
//! This module provides:
//! - [`SourceRegistry`]: shared channel → ranked candidate map
//! - [`SourceSelector`]: request-path selection with fallback
//! - [`ProxyForwarder`]: server-side relay for proxy-required hosts
//! - [`ProxyRules`]: host → header lookup for proxied sources
//! - [`ChannelLoader`]: channel document loading

pub mod forwarder;
pub mod loader;
pub mod proxy_rule;
pub mod registry;
pub mod selector;

pub use forwarder::{ForwardError, ForwardedResponse, ProxyForwarder};
pub use loader::{ChannelLoader, ChannelSource};
pub use proxy_rule::ProxyRules;
pub use registry::SourceRegistry;
pub use selector::SourceSelector;
