//! Channel document decoding and validation.

use std::collections::BTreeMap;

use crate::error::{DocumentError, RefreshError};
use crate::types::ChannelSources;

/// Decode a YAML channel document.
///
/// A channel written without a list (`cctv1:`) decodes to an empty list so
/// that validation can name the offending channel.
pub fn parse_channel_document(text: &str) -> Result<ChannelSources, DocumentError> {
    let raw: Option<BTreeMap<String, Option<Vec<String>>>> =
        serde_yaml::from_str(text).map_err(|e| DocumentError::Malformed(e.to_string()))?;

    let sources: ChannelSources = raw
        .unwrap_or_default()
        .into_iter()
        .map(|(key, urls)| (key, urls.unwrap_or_default()))
        .collect();

    if sources.is_empty() {
        return Err(DocumentError::Empty);
    }

    Ok(sources)
}

/// Check that a payload is structurally usable as a registry snapshot.
pub fn validate_channel_sources(sources: &ChannelSources) -> Result<(), RefreshError> {
    if sources.is_empty() {
        return Err(RefreshError::EmptyPayload);
    }

    for (key, urls) in sources {
        if key.trim().is_empty() {
            return Err(RefreshError::BlankChannelKey);
        }
        if urls.is_empty() {
            return Err(RefreshError::EmptyChannel(key.clone()));
        }
        if urls.iter().any(|url| url.trim().is_empty()) {
            return Err(RefreshError::BlankUrl(key.clone()));
        }
    }

    Ok(())
}
