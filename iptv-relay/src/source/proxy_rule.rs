//! Lookup of proxy-required hosts.

use iptv_relay_protocol::ProxyRule;

/// Immutable, ordered set of proxy rules built once at startup.
///
/// When several rules name the same host, the first one in configuration
/// order is used and the rest are ignored.
#[derive(Debug, Clone, Default)]
pub struct ProxyRules {
    rules: Vec<ProxyRule>,
}

impl ProxyRules {
    /// Wrap the configured rules, keeping their order.
    pub fn new(rules: Vec<ProxyRule>) -> Self {
        Self { rules }
    }

    /// First rule matching the host of `url`.
    pub fn rule_for(&self, url: &str) -> Option<&ProxyRule> {
        self.rules.iter().find(|rule| rule.matches_url(url))
    }

    /// Whether `url` must be fetched server-side instead of redirected to.
    pub fn requires_proxy(&self, url: &str) -> bool {
        self.rule_for(url).is_some()
    }

    /// Headers to attach when fetching `url`; empty if no rule matches.
    pub fn headers_for(&self, url: &str) -> &[(String, String)] {
        self.rule_for(url).map(|rule| rule.headers.as_slice()).unwrap_or(&[])
    }

    /// Number of configured rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }
}
