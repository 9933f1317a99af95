//! Stream availability checks.
//!
//! This module provides:
//! - [`AvailabilityChecker`]: capability answering "is this stream reachable?"
//! - [`HttpChecker`]: plain HTTP GET, available on status 200
//! - [`FfmpegChecker`]: runs a media prober and looks for an opened input
//!
//! Checkers never fail: network errors, process errors, and timeouts all
//! report `false`. Dropping a check future aborts the check.

pub mod ffmpeg;
pub mod http;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

pub use ffmpeg::FfmpegChecker;
pub use http::HttpChecker;

/// Tests whether a stream URL is currently usable.
#[async_trait]
pub trait AvailabilityChecker: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Returns `true` if `url` answered like a playable stream.
    async fn test(&self, url: &str) -> bool;
}

/// Which checker implementation to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CheckerKind {
    /// HTTP GET probe.
    #[default]
    Http,
    /// External media prober process.
    Ffmpeg,
}

/// Settings for building a checker.
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Implementation to use.
    pub kind: CheckerKind,
    /// Upper bound for one check.
    pub timeout: Duration,
    /// Media prober binary for [`CheckerKind::Ffmpeg`].
    pub ffmpeg_path: String,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            kind: CheckerKind::Http,
            timeout: Duration::from_secs(10),
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }
}

/// Build the configured checker.
pub fn build_checker(config: &CheckerConfig) -> Result<Arc<dyn AvailabilityChecker>, reqwest::Error> {
    let checker: Arc<dyn AvailabilityChecker> = match config.kind {
        CheckerKind::Http => Arc::new(HttpChecker::new(config.timeout)?),
        CheckerKind::Ffmpeg => Arc::new(FfmpegChecker::new(&config.ffmpeg_path, config.timeout)),
    };
    Ok(checker)
}
