//! Core data types shared by the relay and its configuration sources.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::Serialize;
use url::Url;

use crate::error::ConfigError;

/// Separator between header name and value in configured proxy headers.
pub const HEADER_SEPARATOR: char = '|';

/// Channel key to ordered candidate URL list, as loaded from configuration.
pub type ChannelSources = BTreeMap<String, Vec<String>>;

/// One candidate stream URL for a channel, with its health-check history.
///
/// Identity is the URL alone: two candidates with the same URL compare equal
/// regardless of their counters. The counters are private so that
/// `success_attempts <= total_attempts` always holds and the success rate
/// is always derived from them.
#[derive(Debug, Clone, Serialize)]
pub struct Candidate {
    url: String,
    total_attempts: u64,
    success_attempts: u64,
}

impl Candidate {
    /// Create a candidate with no history.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            total_attempts: 0,
            success_attempts: 0,
        }
    }

    /// Stream URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Number of recorded health checks.
    pub fn total_attempts(&self) -> u64 {
        self.total_attempts
    }

    /// Number of successful health checks.
    pub fn success_attempts(&self) -> u64 {
        self.success_attempts
    }

    /// `success_attempts / total_attempts`, or 0 with no history.
    pub fn success_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            0.0
        } else {
            self.success_attempts as f64 / self.total_attempts as f64
        }
    }

    /// Record one health-check outcome.
    pub fn record(&mut self, success: bool) {
        self.total_attempts += 1;
        if success {
            self.success_attempts += 1;
        }
    }

    /// Copy the counters of `previous` into this candidate.
    pub fn inherit_counters(&mut self, previous: &Candidate) {
        self.total_attempts = previous.total_attempts;
        self.success_attempts = previous.success_attempts;
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}

impl Eq for Candidate {}

impl Hash for Candidate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.url.hash(state);
    }
}

/// Extra request headers for a host whose streams must be fetched server-side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRule {
    /// Lowercased host name, optionally with `:port`.
    pub host: String,
    /// Header (name, value) pairs in configuration order.
    pub headers: Vec<(String, String)>,
}

impl ProxyRule {
    /// Build a rule from `Name|value` header strings.
    ///
    /// Host names are case-insensitive, so the host is stored lowercased.
    pub fn parse<S: AsRef<str>>(host: &str, raw_headers: &[S]) -> Result<Self, ConfigError> {
        let host = host.trim().to_ascii_lowercase();
        if host.is_empty() {
            return Err(ConfigError::EmptyHost);
        }

        let headers = raw_headers
            .iter()
            .map(|entry| {
                let entry = entry.as_ref();
                match entry.split_once(HEADER_SEPARATOR) {
                    Some((name, value)) if !name.trim().is_empty() => {
                        Ok((name.trim().to_string(), value.trim().to_string()))
                    }
                    _ => Err(ConfigError::InvalidHeader {
                        host: host.to_string(),
                        entry: entry.to_string(),
                    }),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { host, headers })
    }

    /// Whether `url` points at this rule's host.
    ///
    /// A rule host without a port matches the URL host on any port. A rule
    /// host with a port only matches URLs that spell out that port, even
    /// when it is the scheme default (`Url` drops those, so the authority
    /// is read from the raw text).
    pub fn matches_url(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };

        self.host == host
            || raw_authority(url).is_some_and(|authority| authority.eq_ignore_ascii_case(&self.host))
    }
}

/// `host[:port]` exactly as written in `url`, without any userinfo.
fn raw_authority(url: &str) -> Option<&str> {
    let (_, rest) = url.split_once("://")?;
    let end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let authority = &rest[..end];
    Some(authority.rsplit_once('@').map_or(authority, |(_, host)| host))
}
