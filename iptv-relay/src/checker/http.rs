//! HTTP GET availability check.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};

use super::AvailabilityChecker;

/// Treats a stream as available when a GET answers exactly `200 OK`.
///
/// Only the status line and headers are awaited; the body is never read,
/// so endless live streams do not hold the check open.
#[derive(Debug, Clone)]
pub struct HttpChecker {
    client: Client,
}

impl HttpChecker {
    /// Create a checker whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AvailabilityChecker for HttpChecker {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn test(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                if status != StatusCode::OK {
                    debug!("HTTP check {}: status {}", url, status);
                }
                status == StatusCode::OK
            }
            Err(e) => {
                debug!("HTTP check {} failed: {}", url, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{closed_port_url, spawn_upstream};
    use axum::{http::StatusCode as AxumStatus, routing::get, Router};

    fn upstream() -> Router {
        Router::new()
            .route("/ok", get(|| async { "#EXTM3U" }))
            .route("/forbidden", get(|| async { (AxumStatus::FORBIDDEN, "no") }))
            .route("/created", get(|| async { (AxumStatus::CREATED, "meh") }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            )
    }

    #[tokio::test]
    async fn test_status_200_is_available() {
        let addr = spawn_upstream(upstream()).await;
        let checker = HttpChecker::new(Duration::from_secs(2)).unwrap();

        assert!(checker.test(&format!("http://{}/ok", addr)).await);
        assert!(!checker.test(&format!("http://{}/forbidden", addr)).await);
        assert!(!checker.test(&format!("http://{}/created", addr)).await);
        assert!(!checker.test(&format!("http://{}/missing", addr)).await);
    }

    #[tokio::test]
    async fn test_failures_are_unavailable() {
        let addr = spawn_upstream(upstream()).await;
        let checker = HttpChecker::new(Duration::from_millis(200)).unwrap();

        assert!(!checker.test(&format!("http://{}/slow", addr)).await);
        assert!(!checker.test(&closed_port_url().await).await);
        assert!(!checker.test("not a url").await);
    }
}
