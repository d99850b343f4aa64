// Configuration management module
// Handles loading, saving, and validating configuration

use crate::scrobbler::listenbrainz::DEFAULT_API_URL;
use crate::scrobbler::{Credentials, LastFmCredentials, ListenBrainzCredentials};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Seconds between two samples from the media poller
    pub poll_interval: u64,

    /// Samples buffered per backend before new ones are dropped
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// Album/artist cleanup configuration
    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Last.fm configuration
    pub lastfm: Option<LastFmConfig>,

    /// ListenBrainz configurations (can have multiple instances)
    #[serde(default)]
    pub listenbrainz: Vec<ListenBrainzConfig>,
}

fn default_queue_depth() -> usize {
    16
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Strip release-type suffixes such as " - Single" from album names
    pub clean_album_names: bool,

    /// Patterns removed from album names when `clean_album_names` is set
    pub album_patterns: Vec<String>,

    /// Submit only the first credited artist
    pub primary_artist_only: bool,
}

fn default_album_patterns() -> Vec<String> {
    vec![r"\s-\s(?:Single|EP)$".to_string()]
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            clean_album_names: true,
            album_patterns: default_album_patterns(),
            primary_artist_only: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastFmConfig {
    pub enabled: bool,
    pub api_key: String,
    pub api_secret: String,
    pub username: String,
    pub password: String,
}

impl LastFmConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials::LastFm(LastFmCredentials {
            api_key: self.api_key.clone(),
            api_secret: self.api_secret.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenBrainzConfig {
    pub enabled: bool,
    pub name: String,
    pub token: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

impl ListenBrainzConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials::ListenBrainz(ListenBrainzCredentials {
            user_token: self.token.clone(),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval: 5,
            queue_depth: default_queue_depth(),
            cleanup: CleanupConfig::default(),
            lastfm: Some(LastFmConfig {
                enabled: false,
                api_key: String::new(),
                api_secret: String::new(),
                username: String::new(),
                password: String::new(),
            }),
            listenbrainz: vec![ListenBrainzConfig {
                enabled: false,
                name: "Primary".to_string(),
                token: String::new(),
                api_url: default_api_url(),
            }],
        }
    }
}

impl Config {
    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir().context("Failed to get config directory")?;

        Ok(config_dir.join("poll_scrobbler.toml"))
    }

    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from `path`, or create a default one there if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("Config file not found, creating default at {:?}", path);
            let default_config = Self::default();
            default_config.save_to(path)?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;

        Ok(config)
    }

    /// Save configuration to `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, content).context("Failed to write config file")?;

        log::info!("Config saved to {:?}", path);

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval == 0 {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.queue_depth == 0 {
            anyhow::bail!("queue_depth must be greater than 0");
        }

        // Check that at least one scrobbler is enabled
        let lastfm_enabled = self.lastfm.as_ref().map(|l| l.enabled).unwrap_or(false);
        let listenbrainz_enabled = self.listenbrainz.iter().any(|l| l.enabled);

        if !lastfm_enabled && !listenbrainz_enabled {
            log::warn!("No scrobbling services are enabled");
        }

        // Validate Last.fm config if enabled
        if let Some(lastfm) = &self.lastfm {
            if lastfm.enabled {
                if lastfm.api_key.is_empty() {
                    anyhow::bail!("Last.fm api_key is required when Last.fm is enabled");
                }
                if lastfm.api_secret.is_empty() {
                    anyhow::bail!("Last.fm api_secret is required when Last.fm is enabled");
                }
                if lastfm.username.is_empty() {
                    anyhow::bail!("Last.fm username is required when Last.fm is enabled");
                }
            }
        }

        // Validate ListenBrainz configs if enabled
        let mut names = HashSet::new();
        for lb in &self.listenbrainz {
            if lb.enabled {
                if !names.insert(lb.name.as_str()) {
                    anyhow::bail!("ListenBrainz instance names must be unique (duplicate: {})", lb.name);
                }
                if lb.token.trim().is_empty() {
                    anyhow::bail!("ListenBrainz token is required when enabled (instance: {})", lb.name);
                }
                if lb.api_url.is_empty() {
                    anyhow::bail!("ListenBrainz api_url is required (instance: {})", lb.name);
                }
            }
        }

        Ok(())
    }
}
