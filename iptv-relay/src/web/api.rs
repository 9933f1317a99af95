//! HTTP endpoints: playback, proxy relay, refresh, and monitoring.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Query, State},
    http::{
        header::{self, HeaderMap, HeaderName, HeaderValue},
        StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::source::ForwardError;
use crate::web::state::WebState;

// ============================================================================
// Data structures
// ============================================================================

/// Query of `GET /iptv`.
#[derive(Debug, Deserialize)]
pub struct PlayQuery {
    /// Channel key.
    #[serde(rename = "type")]
    pub channel: Option<String>,
}

/// Query of `GET /iptv/proxy`.
#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub url: Option<String>,
}

/// One candidate of a channel, as reported by `GET /api/channels`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SourceInfo {
    pub url: String,
    pub total_attempts: u64,
    pub success_attempts: u64,
    pub success_rate: f64,
    pub proxied: bool,
}

/// Channel ranking for API.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChannelInfo {
    pub channel: String,
    pub sources: Vec<SourceInfo>,
}

/// Headers that only apply to a single connection.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

// ============================================================================
// Playback
// ============================================================================

/// `GET /iptv?type=<channel>`: redirect to, or relay, the best source.
pub async fn play(State(state): State<Arc<WebState>>, Query(query): Query<PlayQuery>) -> Response {
    let Some(channel) = query
        .channel
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
    else {
        return (StatusCode::BAD_REQUEST, "missing channel type").into_response();
    };

    let selection = match state.selector.select(channel).await {
        Ok(selection) => selection,
        Err(e) => {
            info!("{}", e);
            state.metrics.record_not_found();
            return (
                StatusCode::NOT_FOUND,
                format!("no source available for {}", channel),
            )
                .into_response();
        }
    };

    state.metrics.record_selection(selection.proxied);
    debug!(
        "Channel {}: serving {} after {} check(s)",
        channel, selection.url, selection.probed
    );
    if !selection.proxied {
        return redirect(&selection.url);
    }

    match state.forwarder.forward(&selection.url).await {
        Ok(response) => relay(response),
        Err(e) => {
            warn!(
                "Channel {}: relay of {} failed ({}), redirecting instead",
                channel, selection.url, e
            );
            state.metrics.record_proxy_fallback();
            redirect(&selection.url)
        }
    }
}

/// `GET /iptv/proxy?url=<url>`: relay a URL on a proxy-required host.
pub async fn proxy(State(state): State<Arc<WebState>>, Query(query): Query<ProxyQuery>) -> Response {
    let Some(url) = query.url.as_deref().filter(|u| !u.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "missing url").into_response();
    };

    if !state.selector.rules().requires_proxy(url) {
        warn!("Refusing to relay {}: no proxy rule matches its host", url);
        return (StatusCode::FORBIDDEN, "host is not configured for proxying").into_response();
    }

    match state.forwarder.forward(url).await {
        Ok(response) => relay(response),
        Err(e @ ForwardError::Timeout(_)) => {
            (StatusCode::GATEWAY_TIMEOUT, e.to_string()).into_response()
        }
        Err(e) => (StatusCode::BAD_GATEWAY, e.to_string()).into_response(),
    }
}

/// `302 Found` to `url`.
fn redirect(url: &str) -> Response {
    match HeaderValue::from_str(url) {
        Ok(location) => (StatusCode::FOUND, [(header::LOCATION, location)]).into_response(),
        Err(_) => {
            error!("Cannot redirect to {:?}: not a valid header value", url);
            (StatusCode::BAD_GATEWAY, "invalid source url").into_response()
        }
    }
}

/// Turn a forwarded upstream response into ours.
fn relay(upstream: crate::source::ForwardedResponse) -> Response {
    let mut headers = upstream.headers;
    strip_hop_by_hop(&mut headers);

    let mut response = Response::new(Body::from_stream(upstream.body));
    *response.status_mut() = upstream.status;
    *response.headers_mut() = headers;
    response
}

/// Remove connection-level headers, including any the `Connection` header names.
pub(crate) fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in &named {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

// ============================================================================
// Administration
// ============================================================================

/// `GET /iptv-refresh`: reload the channel document.
pub async fn refresh(State(state): State<Arc<WebState>>) -> impl IntoResponse {
    let sources = match state.loader.load().await {
        Ok(sources) => sources,
        Err(e) => {
            error!("Refresh from {} failed: {}", state.loader.source(), e);
            state.metrics.record_refresh(false);
            return (StatusCode::INTERNAL_SERVER_ERROR, format!("refresh failed: {}", e));
        }
    };

    match state.registry.refresh(&sources).await {
        Ok(summary) => {
            state.metrics.record_refresh(true);
            (
                StatusCode::OK,
                format!(
                    "refresh succeeded: {} channels, {} sources",
                    summary.channels, summary.candidates
                ),
            )
        }
        Err(e) => {
            error!("Refresh rejected: {}", e);
            state.metrics.record_refresh(false);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("refresh failed: {}", e))
        }
    }
}

/// `POST /api/score`: run a scoring pass in the background.
///
/// Requests arriving while an earlier one is still queued or running are
/// coalesced into it.
pub async fn trigger_score(State(state): State<Arc<WebState>>) -> impl IntoResponse {
    if state.scheduler.request_pass() {
        (
            StatusCode::ACCEPTED,
            Json(json!({
                "success": true,
                "message": "Scoring pass triggered",
            })),
        )
    } else {
        (
            StatusCode::CONFLICT,
            Json(json!({
                "success": false,
                "error": "A scoring pass is already pending",
            })),
        )
    }
}

/// `POST /api/scheduler/pause`: skip scheduled passes until resumed.
pub async fn pause_scheduler(State(state): State<Arc<WebState>>) -> impl IntoResponse {
    state.scheduler.pause().await;
    Json(json!({
        "success": true,
        "state": state.scheduler.state().await,
    }))
}

/// `POST /api/scheduler/resume`: resume scheduled passes.
pub async fn resume_scheduler(State(state): State<Arc<WebState>>) -> impl IntoResponse {
    state.scheduler.resume().await;
    Json(json!({
        "success": true,
        "state": state.scheduler.state().await,
    }))
}

// ============================================================================
// Monitoring
// ============================================================================

/// `GET /api/channels`: current ranking of every channel.
pub async fn get_channels(State(state): State<Arc<WebState>>) -> impl IntoResponse {
    let rules = state.selector.rules();
    let channels: Vec<ChannelInfo> = state
        .registry
        .snapshot()
        .await
        .into_iter()
        .map(|(channel, candidates)| ChannelInfo {
            channel,
            sources: candidates
                .iter()
                .map(|c| SourceInfo {
                    url: c.url().to_string(),
                    total_attempts: c.total_attempts(),
                    success_attempts: c.success_attempts(),
                    success_rate: c.success_rate(),
                    proxied: rules.requires_proxy(c.url()),
                })
                .collect(),
        })
        .collect();

    Json(json!({
        "success": true,
        "channels": channels,
    }))
}

/// `GET /api/stats`: relay counters and scheduler status.
pub async fn get_stats(State(state): State<Arc<WebState>>) -> impl IntoResponse {
    let scheduler = &state.scheduler;

    Json(json!({
        "success": true,
        "channels": state.registry.channel_count().await,
        "metrics": state.metrics.snapshot(),
        "scheduler": {
            "state": scheduler.state().await,
            "enabled": scheduler.config().enabled,
            "interval_secs": scheduler.config().interval_secs,
            "probe_delay_ms": scheduler.config().probe_delay_ms,
            "last_pass": scheduler.last_summary().await,
        },
    }))
}
