//! Loading of the channel document from a remote URL or a local file.

use std::path::PathBuf;
use std::time::Duration;

use log::{debug, info};
use reqwest::Client;
use thiserror::Error;

use iptv_relay_protocol::{parse_channel_document, ChannelSources, DocumentError};

/// Channel document loading errors.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The document could not be fetched.
    #[error("Failed to fetch channel document: {0}")]
    Http(#[from] reqwest::Error),

    /// The remote answered with a non-success status.
    #[error("Channel document request returned {0}")]
    Status(reqwest::StatusCode),

    /// The local file could not be read.
    #[error("Failed to read channel document {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document could not be decoded.
    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// Where the channel document lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelSource {
    /// Fetched with HTTP GET.
    Remote(String),
    /// Read from disk.
    File(PathBuf),
}

impl std::fmt::Display for ChannelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelSource::Remote(url) => write!(f, "{}", url),
            ChannelSource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Loads and decodes the channel document on demand.
pub struct ChannelLoader {
    source: ChannelSource,
    client: Client,
}

impl ChannelLoader {
    /// Create a loader; remote fetches give up after `timeout`.
    pub fn new(source: ChannelSource, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { source, client })
    }

    /// Document location.
    pub fn source(&self) -> &ChannelSource {
        &self.source
    }

    /// Fetch and decode the current document.
    pub async fn load(&self) -> Result<ChannelSources, LoadError> {
        let text = match &self.source {
            ChannelSource::Remote(url) => {
                debug!("Fetching channel document from {}", url);
                let response = self.client.get(url).send().await?;
                if !response.status().is_success() {
                    return Err(LoadError::Status(response.status()));
                }
                response.text().await?
            }
            ChannelSource::File(path) => {
                debug!("Reading channel document from {}", path.display());
                tokio::fs::read_to_string(path).await.map_err(|source| LoadError::Io {
                    path: path.clone(),
                    source,
                })?
            }
        };

        let sources = parse_channel_document(&text)?;
        info!(
            "Loaded channel document from {}: {} channels",
            self.source,
            sources.len()
        );
        Ok(sources)
    }
}
