// Text cleanup module
// Normalizes album and artist names before they are submitted

use crate::config::CleanupConfig;
use crate::playback::PlaybackSample;
use crate::scrobbler::Listen;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::Arc;

/// Removes configured patterns (by default ` - Single` / ` - EP`) from album names
pub struct TextCleaner {
    enabled: bool,
    patterns: Vec<Regex>,
}

impl TextCleaner {
    pub fn new(enabled: bool, patterns: &[String]) -> Self {
        let patterns = if enabled {
            patterns
                .iter()
                .filter_map(|pattern| match Regex::new(pattern) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        log::warn!("Invalid regex pattern '{}': {}", pattern, e);
                        None
                    }
                })
                .collect()
        } else {
            Vec::new()
        };

        Self { enabled, patterns }
    }

    pub fn disabled() -> Self {
        Self::new(false, &[])
    }

    /// Clean a text string by applying all patterns
    pub fn clean(&self, text: &str) -> String {
        if !self.enabled {
            return text.to_string();
        }

        let mut result = text.to_string();
        for pattern in &self.patterns {
            result = pattern.replace_all(&result, "").to_string();
        }

        result.trim().to_string()
    }
}

/// Resolves a credit string into its contributing artists, main artist first
#[async_trait]
pub trait ArtistLookup: Send + Sync {
    async fn artists(&self, sample: &PlaybackSample) -> Result<Vec<String>>;
}

/// Offline lookup splitting "A & B", "A, B" and "A feat. B" style credits
pub struct CreditSplitter {
    separator: Regex,
}

impl CreditSplitter {
    pub const DEFAULT_SEPARATORS: &'static str =
        r"(?i)\s*(?:,|&|\s(?:feat\.?|ft\.?|featuring|with|x)\s)\s*";

    pub fn new() -> Result<Self> {
        Self::with_separators(Self::DEFAULT_SEPARATORS)
    }

    pub fn with_separators(pattern: &str) -> Result<Self> {
        let separator = Regex::new(pattern)
            .with_context(|| format!("Invalid artist separator pattern '{}'", pattern))?;
        Ok(Self { separator })
    }

    pub fn split(&self, credit: &str) -> Vec<String> {
        self.separator
            .split(credit)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[async_trait]
impl ArtistLookup for CreditSplitter {
    async fn artists(&self, sample: &PlaybackSample) -> Result<Vec<String>> {
        Ok(self.split(&sample.artist))
    }
}

/// Builds the payload sent to the backends from a raw sample
pub struct Normalizer {
    album: TextCleaner,
    primary_artist: Option<Arc<dyn ArtistLookup>>,
}

impl Normalizer {
    /// Leaves every field as reported
    pub fn passthrough() -> Self {
        Self {
            album: TextCleaner::disabled(),
            primary_artist: None,
        }
    }

    pub fn new(album: TextCleaner, primary_artist: Option<Arc<dyn ArtistLookup>>) -> Self {
        Self {
            album,
            primary_artist,
        }
    }

    pub fn from_config(config: &CleanupConfig, lookup: Arc<dyn ArtistLookup>) -> Self {
        Self::new(
            TextCleaner::new(config.clean_album_names, &config.album_patterns),
            config.primary_artist_only.then_some(lookup),
        )
    }

    pub async fn listen(&self, sample: &PlaybackSample, timestamp: DateTime<Utc>) -> Listen {
        Listen {
            artist: self.artist(sample).await,
            album: self.album.clean(&sample.album),
            title: sample.title.clone(),
            timestamp,
        }
    }

    async fn artist(&self, sample: &PlaybackSample) -> String {
        let Some(lookup) = &self.primary_artist else {
            return sample.artist.clone();
        };

        match lookup.artists(sample).await {
            Ok(artists) => artists
                .into_iter()
                .next()
                .unwrap_or_else(|| sample.artist.clone()),
            Err(e) => {
                log::warn!("Artist lookup failed for '{}': {:#}", sample.artist, e);
                sample.artist.clone()
            }
        }
    }
}
