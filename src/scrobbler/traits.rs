// Common traits for scrobbling services

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;

/// Normalized payload sent to a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listen {
    pub artist: String,
    pub album: String,
    pub title: String,
    /// Start of the play for scrobbles, time of the update for now playing
    pub timestamp: DateTime<Utc>,
}

impl Listen {
    /// Album as the network clients expect it, `None` when unknown
    pub fn album(&self) -> Option<&str> {
        Some(self.album.as_str()).filter(|a| !a.is_empty())
    }
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct LastFmCredentials {
    pub api_key: String,
    pub api_secret: String,
    pub username: String,
    pub password: String,
}

#[derive(Clone, Default, PartialEq, Eq)]
pub struct ListenBrainzCredentials {
    pub user_token: String,
}

/// Credentials for one backend, supplied by the settings layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    LastFm(LastFmCredentials),
    ListenBrainz(ListenBrainzCredentials),
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}

impl fmt::Debug for LastFmCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LastFmCredentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &redact(&self.api_secret))
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .finish()
    }
}

impl fmt::Debug for ListenBrainzCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenBrainzCredentials")
            .field("user_token", &redact(&self.user_token))
            .finish()
    }
}

/// An authenticated connection to a backend.
///
/// Calls are blocking; adapters run them on the blocking thread pool.
pub trait Session: Send + Sync {
    fn now_playing(&self, listen: &Listen) -> Result<()>;

    fn scrobble(&self, listen: &Listen) -> Result<()>;
}

/// Common trait for all scrobbling services
#[async_trait]
pub trait Scrobbler: Send + Sync {
    /// Name used in log lines
    fn name(&self) -> &str;

    fn is_authenticated(&self) -> bool;

    /// Drop any held session and authenticate again with `credentials`.
    /// Returns false when the credentials are incomplete or rejected.
    async fn authenticate(&self, credentials: &Credentials) -> bool;

    /// Update "now playing" status. No-op when not authenticated.
    async fn update_now_playing(&self, listen: &Listen) -> Result<()>;

    /// Submit a scrobble. No-op when not authenticated.
    async fn submit_scrobble(&self, listen: &Listen) -> Result<()>;
}
