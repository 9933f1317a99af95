//! Error types for channel documents and relay configuration.

use thiserror::Error;

/// Errors raised while decoding a channel document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DocumentError {
    /// The document contains no channels.
    #[error("Channel document is empty")]
    Empty,

    /// The document is not a mapping of channel key to URL list.
    #[error("Malformed channel document: {0}")]
    Malformed(String),
}

/// Reasons a registry refresh payload is rejected.
///
/// A rejected payload never replaces the snapshot currently in effect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// The payload has no channels at all.
    #[error("Refresh payload is empty")]
    EmptyPayload,

    /// A channel key is empty or whitespace.
    #[error("Refresh payload contains a blank channel key")]
    BlankChannelKey,

    /// A channel maps to an empty URL list.
    #[error("Channel {0} has no candidate URLs")]
    EmptyChannel(String),

    /// A channel lists an empty or whitespace URL.
    #[error("Channel {0} contains a blank candidate URL")]
    BlankUrl(String),
}

/// Errors in static relay configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A proxy rule has an empty host.
    #[error("Proxy rule has an empty host")]
    EmptyHost,

    /// A proxy header entry is not in `Name|value` form.
    #[error("Invalid proxy header for host {host}: {entry:?} (expected \"Name|value\")")]
    InvalidHeader { host: String, entry: String },
}
