//! HTTP front end of the relay.

pub mod api;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use state::WebState;

/// Build the relay router.
pub fn router(state: Arc<WebState>) -> Router {
    Router::new()
        // Playback
        .route("/iptv", get(api::play))
        .route("/iptv/proxy", get(api::proxy))
        // Administration
        .route("/iptv-refresh", get(api::refresh))
        .route("/api/score", post(api::trigger_score))
        .route("/api/scheduler/pause", post(api::pause_scheduler))
        .route("/api/scheduler/resume", post(api::resume_scheduler))
        // Monitoring
        .route("/api/channels", get(api::get_channels))
        .route("/api/stats", get(api::get_stats))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Start the web server; returns after Ctrl-C once in-flight requests finish.
pub async fn start_web_server(
    listen_addr: SocketAddr,
    state: Arc<WebState>,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    log::info!("Relay listening on http://{}", listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("Shutdown requested"),
        Err(e) => {
            log::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::{HeaderMap, Request, StatusCode},
        response::Response,
    };
    use tower::ServiceExt;

    use crate::checker::testing::ScriptedChecker;
    use crate::metrics::RelayMetrics;
    use crate::scheduler::{ScoringScheduler, ScoringSchedulerConfig};
    use crate::source::{
        ChannelLoader, ChannelSource, ProxyForwarder, ProxyRules, SourceRegistry, SourceSelector,
    };
    use crate::testutil::{closed_port_url, spawn_upstream};
    use iptv_relay_protocol::ProxyRule;

    const PLAYLIST: &str = "#EXTM3U\n#EXT-X-TARGETDURATION:6\nsegment0.ts\n";

    struct Fixture {
        state: Arc<WebState>,
        checker: Arc<ScriptedChecker>,
        document: PathBuf,
        _dir: tempfile::TempDir,
    }

    async fn fixture(document: &str, proxy_hosts: &[&str], passing: &[&str]) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("channels.yml");
        std::fs::write(&path, document).unwrap();

        let loader = ChannelLoader::new(ChannelSource::File(path.clone()), Duration::from_secs(5)).unwrap();
        let registry = Arc::new(SourceRegistry::with_sources(&loader.load().await.unwrap()).await.unwrap());
        let rules = Arc::new(ProxyRules::new(
            proxy_hosts
                .iter()
                .map(|h| ProxyRule::parse(h, &["Referer|https://origin.example/"]).unwrap())
                .collect(),
        ));
        let checker = ScriptedChecker::passing(passing);
        let metrics = RelayMetrics::new();

        let selector = SourceSelector::new(registry.clone(), rules.clone(), checker.clone());
        let forwarder = ProxyForwarder::new(rules.clone(), Duration::from_secs(5)).unwrap();
        let scheduler = Arc::new(ScoringScheduler::new(
            registry.clone(),
            rules,
            checker.clone(),
            metrics.clone(),
            ScoringSchedulerConfig {
                probe_delay_ms: 0,
                ..ScoringSchedulerConfig::default()
            },
        ));

        Fixture {
            state: Arc::new(WebState::new(registry, selector, forwarder, scheduler, loader, metrics)),
            checker,
            document: path,
            _dir: dir,
        }
    }

    async fn send(state: &Arc<WebState>, method: &str, uri: &str) -> Response {
        router(state.clone())
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn upstream() -> SocketAddr {
        spawn_upstream(Router::new().route(
            "/live.m3u8",
            get(|headers: HeaderMap| async move {
                let referer = headers
                    .get("referer")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("none")
                    .to_string();
                (
                    [
                        ("content-type", "application/vnd.apple.mpegurl".to_string()),
                        ("x-referer", referer),
                    ],
                    PLAYLIST,
                )
            }),
        ))
        .await
    }

    #[tokio::test]
    async fn test_redirects_to_first_available_source() {
        let fx = fixture("cctv1:\n  - http://a\n  - http://b\n", &[], &["http://b"]).await;

        let response = send(&fx.state, "GET", "/iptv?type=cctv1").await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()["location"], "http://b");
        assert_eq!(fx.checker.calls(), vec!["http://a", "http://b"]);

        let metrics = fx.state.metrics.snapshot();
        assert_eq!((metrics.selections, metrics.redirects), (1, 1));
    }

    #[tokio::test]
    async fn test_missing_channel_type() {
        let fx = fixture("cctv1:\n  - http://a\n", &[], &["http://a"]).await;

        assert_eq!(send(&fx.state, "GET", "/iptv").await.status(), StatusCode::BAD_REQUEST);
        assert_eq!(send(&fx.state, "GET", "/iptv?type=").await.status(), StatusCode::BAD_REQUEST);
        assert!(fx.checker.calls().is_empty());
    }

    #[tokio::test]
    async fn test_no_source_available() {
        let fx = fixture("cctv1:\n  - http://a\n", &[], &[]).await;

        let response = send(&fx.state, "GET", "/iptv?type=cctv9").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(text(response).await, "no source available for cctv9");

        let response = send(&fx.state, "GET", "/iptv?type=cctv1").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(text(response).await, "no source available for cctv1");

        assert_eq!(fx.state.metrics.snapshot().not_found, 2);
    }

    #[tokio::test]
    async fn test_proxied_channel_is_relayed() {
        let addr = upstream().await;
        let document = format!("cctv1:\n  - http://{}/live.m3u8\n", addr);
        let fx = fixture(&document, &["127.0.0.1"], &[]).await;

        let response = send(&fx.state, "GET", "/iptv?type=cctv1").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "application/vnd.apple.mpegurl");
        assert_eq!(response.headers()["x-referer"], "https://origin.example/");
        assert_eq!(text(response).await, PLAYLIST);
        assert!(fx.checker.calls().is_empty());
        assert_eq!(fx.state.metrics.snapshot().proxied, 1);
    }

    #[tokio::test]
    async fn test_failed_relay_falls_back_to_redirect() {
        let url = closed_port_url().await;
        let document = format!("cctv1:\n  - {}\n", url);
        let fx = fixture(&document, &["127.0.0.1"], &[]).await;

        let response = send(&fx.state, "GET", "/iptv?type=cctv1").await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()["location"], url.as_str());
        assert_eq!(fx.state.metrics.snapshot().proxy_fallbacks, 1);
    }

    #[tokio::test]
    async fn test_proxy_endpoint() {
        let addr = upstream().await;
        let fx = fixture("cctv1:\n  - http://a\n", &["127.0.0.1"], &[]).await;

        let response = send(&fx.state, "GET", &format!("/iptv/proxy?url=http://{}/live.m3u8", addr)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(text(response).await, PLAYLIST);

        let response = send(&fx.state, "GET", "/iptv/proxy?url=http://a.example/live.m3u8").await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = send(&fx.state, "GET", "/iptv/proxy").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_refresh_endpoint() {
        let fx = fixture("cctv1:\n  - http://a\n", &[], &[]).await;

        std::fs::write(&fx.document, "cctv1:\n  - http://a\n  - http://b\ncctv2:\n  - http://c\n").unwrap();
        let response = send(&fx.state, "GET", "/iptv-refresh").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(text(response).await, "refresh succeeded: 2 channels, 3 sources");
        assert_eq!(fx.state.registry.channels().await, vec!["cctv1", "cctv2"]);

        std::fs::write(&fx.document, "cctv1: []\n").unwrap();
        let response = send(&fx.state, "GET", "/iptv-refresh").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(text(response).await.starts_with("refresh failed"));
        assert_eq!(fx.state.registry.channels().await, vec!["cctv1", "cctv2"]);

        let metrics = fx.state.metrics.snapshot();
        assert_eq!((metrics.refreshes_ok, metrics.refreshes_failed), (1, 1));
    }

    #[tokio::test]
    async fn test_channels_endpoint() {
        let fx = fixture("cctv1:\n  - http://a\n  - http://b\n", &[], &["http://b"]).await;
        send(&fx.state, "GET", "/iptv?type=cctv1").await;

        let response = send(&fx.state, "GET", "/api/channels").await;
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&text(response).await).unwrap();

        let sources = &json["channels"][0]["sources"];
        assert_eq!(json["channels"][0]["channel"], "cctv1");
        assert_eq!(sources[0]["url"], "http://a");
        assert_eq!(sources[0]["total_attempts"], 1);
        assert_eq!(sources[0]["success_attempts"], 0);
        assert_eq!(sources[1]["url"], "http://b");
        assert_eq!(sources[1]["success_rate"], 1.0);
        assert_eq!(sources[1]["proxied"], false);
    }

    #[tokio::test]
    async fn test_score_trigger_and_stats() {
        let fx = fixture("cctv1:\n  - http://a\n  - http://b\n", &[], &["http://b"]).await;

        let response = send(&fx.state, "POST", "/api/score").await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let json: serde_json::Value = serde_json::from_str(&text(response).await).unwrap();
        assert_eq!(json["success"], true);

        tokio::time::timeout(Duration::from_secs(5), async {
            while fx.state.scheduler.last_summary().await.is_none() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        let ranked = fx.state.registry.candidates("cctv1").await.unwrap();
        assert_eq!(ranked[0].url(), "http://b");

        let response = send(&fx.state, "GET", "/api/stats").await;
        let json: serde_json::Value = serde_json::from_str(&text(response).await).unwrap();
        assert_eq!(json["channels"], 1);
        assert_eq!(json["metrics"]["probes"], 2);
        assert_eq!(json["metrics"]["failed_probes"], 1);
        assert_eq!(json["metrics"]["scoring_passes"], 1);
        assert_eq!(json["scheduler"]["state"], "running");
        assert_eq!(json["scheduler"]["last_pass"]["probes"], 2);
    }

    #[tokio::test]
    async fn test_pause_and_resume_scheduler() {
        let fx = fixture("cctv1:\n  - http://a\n", &[], &[]).await;

        let response = send(&fx.state, "POST", "/api/scheduler/pause").await;
        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&text(response).await).unwrap();
        assert_eq!(json["state"], "paused");

        let response = send(&fx.state, "POST", "/api/scheduler/resume").await;
        let json: serde_json::Value = serde_json::from_str(&text(response).await).unwrap();
        assert_eq!(json["state"], "running");
    }
}
