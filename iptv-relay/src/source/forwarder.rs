//! Server-side relay for proxy-required sources.
//!
//! The upstream request carries the headers of the first proxy rule matching
//! the URL host. Status, headers, and body bytes are handed back unchanged;
//! the body is a stream so that dropping it aborts the upstream transfer.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use log::{debug, info, warn};
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use thiserror::Error;

use crate::source::ProxyRules;

/// Relay failures. The caller is expected to fall back to a redirect.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// Connection, TLS, or protocol failure talking to the upstream.
    #[error("Upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// No response headers within the timeout.
    #[error("Upstream did not respond within {0:?}")]
    Timeout(Duration),

    /// The upstream answered without a body.
    #[error("Upstream returned an empty body")]
    EmptyBody,
}

/// Upstream response relayed verbatim.
pub struct ForwardedResponse {
    /// Upstream status code.
    pub status: StatusCode,
    /// Full upstream header set.
    pub headers: HeaderMap,
    /// Upstream body bytes. Stalls longer than the forward timeout end the
    /// stream with a `TimedOut` error.
    pub body: BoxStream<'static, io::Result<Bytes>>,
}

impl fmt::Debug for ForwardedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForwardedResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Fetches proxy-required streams with their host-specific headers.
pub struct ProxyForwarder {
    client: Client,
    rules: Arc<ProxyRules>,
    timeout: Duration,
}

impl ProxyForwarder {
    /// Create a forwarder. `timeout` bounds connecting, waiting for response
    /// headers, and every gap between body chunks.
    pub fn new(rules: Arc<ProxyRules>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().connect_timeout(timeout).build()?;
        Ok(Self {
            client,
            rules,
            timeout,
        })
    }

    /// Fetch `url` and hand back the upstream response.
    pub async fn forward(&self, url: &str) -> Result<ForwardedResponse, ForwardError> {
        let mut request = self.client.get(url);
        let headers = self.rules.headers_for(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        debug!("Forwarding {} with {} extra header(s)", url, headers.len());

        let response = match tokio::time::timeout(self.timeout, request.send()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("Forward to {} timed out after {:?}", url, self.timeout);
                return Err(ForwardError::Timeout(self.timeout));
            }
        };

        if response.content_length() == Some(0) {
            warn!("Forward to {} returned an empty body ({})", url, response.status());
            return Err(ForwardError::EmptyBody);
        }

        let status = response.status();
        let headers = response.headers().clone();
        info!("Forwarding {}: upstream status {}", url, status);

        Ok(ForwardedResponse {
            status,
            headers,
            body: idle_bounded(response.bytes_stream().boxed(), self.timeout),
        })
    }
}

/// End `body` with an error if no chunk arrives for `idle`.
fn idle_bounded(
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    idle: Duration,
) -> BoxStream<'static, io::Result<Bytes>> {
    stream::unfold(Some(body), move |state| async move {
        let mut body = state?;
        match tokio::time::timeout(idle, body.next()).await {
            Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(body))),
            Ok(Some(Err(e))) => Some((Err(io::Error::new(io::ErrorKind::Other, e)), None)),
            Ok(None) => None,
            Err(_) => Some((
                Err(io::Error::new(io::ErrorKind::TimedOut, "upstream stalled")),
                None,
            )),
        }
    })
    .boxed()
}
