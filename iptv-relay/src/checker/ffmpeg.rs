//! Media prober availability check.
//!
//! Runs `ffmpeg -i <url>` and waits for the prober to report that it opened
//! the input, i.e. a line of the form:
//!
//! ```text
//! Input #0, hls, from 'http://example.com/live.m3u8':
//! ```
//!
//! The prober exits with an error afterwards (no output file given); that
//! is expected and ignored.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use super::AvailabilityChecker;

/// Availability check backed by an external media prober process.
#[derive(Debug, Clone)]
pub struct FfmpegChecker {
    program: String,
    timeout: Duration,
}

impl FfmpegChecker {
    /// Create a checker running `program`, killed after `timeout`.
    pub fn new(program: &str, timeout: Duration) -> Self {
        Self {
            program: program.to_string(),
            timeout,
        }
    }

    async fn probe(&self, url: &str) -> std::io::Result<bool> {
        let mut child = Command::new(&self.program)
            .args(["-hide_banner", "-nostdin", "-i", url])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let Some(stderr) = child.stderr.take() else {
            return Ok(false);
        };

        let mut lines = BufReader::new(stderr).lines();
        while let Some(line) = lines.next_line().await? {
            if is_input_line(&line, url) {
                return Ok(true);
            }
            debug!("ffmpeg: {}", line);
        }

        let status = child.wait().await?;
        debug!("ffmpeg exited with {} for {}", status, url);
        Ok(false)
    }
}

#[async_trait]
impl AvailabilityChecker for FfmpegChecker {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn test(&self, url: &str) -> bool {
        match tokio::time::timeout(self.timeout, self.probe(url)).await {
            Ok(Ok(available)) => available,
            Ok(Err(e)) => {
                warn!("Failed to run {} for {}: {}", self.program, url, e);
                false
            }
            Err(_) => {
                debug!("ffmpeg check timed out after {:?} for {}", self.timeout, url);
                false
            }
        }
    }
}

/// Whether `line` is the prober's "opened input" line for `url`.
fn is_input_line(line: &str, url: &str) -> bool {
    let line = line.trim();
    line.starts_with("Input #") && line.ends_with(&format!("from '{}':", url))
}
