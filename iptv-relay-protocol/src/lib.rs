//! Shared definitions for the iptv-relay stream selector.
//!
//! This crate defines the data exchanged between the relay server and its
//! configuration sources. It performs no I/O.
//!
//! # Channel Document
//!
//! The channel list is a YAML mapping of channel key to an ordered list of
//! candidate stream URLs:
//!
//! ```text
//! cctv1:
//!   - http://a.example/live/cctv1.m3u8
//!   - http://b.example/cctv1
//! cctv2:
//!   - http://c.example/cctv2.m3u8
//! ```
//!
//! # Example
//!
//! ```rust
//! use iptv_relay_protocol::{parse_channel_document, validate_channel_sources, Candidate};
//!
//! let sources = parse_channel_document("cctv1:\n  - http://a\n  - http://b\n").unwrap();
//! assert!(validate_channel_sources(&sources).is_ok());
//!
//! let mut candidate = Candidate::new("http://a");
//! candidate.record(true);
//! candidate.record(false);
//! assert_eq!(candidate.success_rate(), 0.5);
//! ```
//!
//! # Proxy Rules
//!
//! Some origins refuse direct playback and must be fetched server-side with
//! extra request headers. A [`ProxyRule`] binds a host to those headers:
//!
//! ```rust
//! use iptv_relay_protocol::ProxyRule;
//!
//! let rule = ProxyRule::parse("live.example.com", &["Referer|https://example.com/"]).unwrap();
//! assert!(rule.matches_url("https://live.example.com/a.m3u8"));
//! assert_eq!(rule.headers[0].0, "Referer");
//! ```

pub mod document;
pub mod error;
pub mod types;

pub use document::{parse_channel_document, validate_channel_sources};
pub use error::{ConfigError, DocumentError, RefreshError};
pub use types::{Candidate, ChannelSources, ProxyRule, HEADER_SEPARATOR};
