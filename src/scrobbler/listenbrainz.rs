// ListenBrainz scrobbler implementation
// API Documentation: https://listenbrainz.readthedocs.io/

use super::traits::{Credentials, Listen, Scrobbler, Session};
use super::{blocking, SessionSlot};
use anyhow::{Context, Result};
use async_trait::async_trait;
use listenbrainz::ListenBrainz;
use std::sync::{Arc, Mutex, PoisonError};

pub const DEFAULT_API_URL: &str = "https://api.listenbrainz.org";

/// Validates a user token against the service and opens a session for it
pub trait ListenBrainzConnector: Send + Sync + 'static {
    fn connect(&self, token: &str) -> Result<Arc<dyn Session>>;
}

/// Connector backed by the ListenBrainz web API
#[derive(Debug, Clone)]
pub struct ListenBrainzApi {
    api_url: String,
}

impl ListenBrainzApi {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
        }
    }
}

impl Default for ListenBrainzApi {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

impl ListenBrainzConnector for ListenBrainzApi {
    fn connect(&self, token: &str) -> Result<Arc<dyn Session>> {
        let mut client = if self.api_url == DEFAULT_API_URL {
            ListenBrainz::new()
        } else {
            ListenBrainz::new_with_url(&self.api_url)
        };

        // Validates the token remotely
        client
            .authenticate(token)
            .with_context(|| format!("ListenBrainz rejected the token ({})", self.api_url))?;

        Ok(Arc::new(ListenBrainzSession {
            client: Mutex::new(client),
        }))
    }
}

struct ListenBrainzSession {
    client: Mutex<ListenBrainz>,
}

impl Session for ListenBrainzSession {
    fn now_playing(&self, listen: &Listen) -> Result<()> {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .playing_now(&listen.artist, &listen.title, listen.album())
            .context("Failed to update now playing on ListenBrainz")?;
        Ok(())
    }

    fn scrobble(&self, listen: &Listen) -> Result<()> {
        // listen() would stamp the current time; import() keeps the start of the play
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .import(
                &listen.artist,
                &listen.title,
                listen.album(),
                listen.timestamp.timestamp(),
            )
            .context("Failed to scrobble to ListenBrainz")?;
        Ok(())
    }
}

/// ListenBrainz backend adapter. Several named instances may run side by side.
pub struct ListenBrainzScrobbler {
    name: String,
    connector: Arc<dyn ListenBrainzConnector>,
    session: SessionSlot,
}

impl ListenBrainzScrobbler {
    pub fn new(name: &str, api_url: impl Into<String>) -> Self {
        Self::with_connector(name, Arc::new(ListenBrainzApi::new(api_url)))
    }

    pub fn with_connector(name: &str, connector: Arc<dyn ListenBrainzConnector>) -> Self {
        Self {
            name: format!("ListenBrainz ({})", name),
            connector,
            session: SessionSlot::default(),
        }
    }
}

#[async_trait]
impl Scrobbler for ListenBrainzScrobbler {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_authenticated(&self) -> bool {
        self.session.is_set()
    }

    async fn authenticate(&self, credentials: &Credentials) -> bool {
        log::debug!("{}: updating credentials", self.name);
        self.session.clear();

        let Credentials::ListenBrainz(credentials) = credentials else {
            log::warn!("{}: ignoring credentials meant for another service", self.name);
            return false;
        };

        let token = credentials.user_token.trim().to_string();
        if token.is_empty() {
            log::warn!("{}: no user token configured", self.name);
            return false;
        }

        let connector = Arc::clone(&self.connector);
        match blocking(move || connector.connect(&token)).await {
            Ok(session) => {
                self.session.replace(Some(session));
                log::info!("{} authentication succeeded", self.name);
                true
            }
            Err(e) => {
                log::warn!("{} authentication failed: {:#}", self.name, e);
                false
            }
        }
    }

    async fn update_now_playing(&self, listen: &Listen) -> Result<()> {
        let Some(session) = self.session.get() else {
            log::debug!("{}: not authenticated, skipping now playing", self.name);
            return Ok(());
        };

        log::debug!(
            "Sending now playing to {}: {} - {}",
            self.name,
            listen.artist,
            listen.title
        );
        let listen = listen.clone();
        blocking(move || session.now_playing(&listen)).await?;
        log::info!("{}: Now playing updated", self.name);
        Ok(())
    }

    async fn submit_scrobble(&self, listen: &Listen) -> Result<()> {
        let Some(session) = self.session.get() else {
            log::debug!("{}: not authenticated, skipping scrobble", self.name);
            return Ok(());
        };

        log::debug!("Scrobbling to {}: {} - {}", self.name, listen.artist, listen.title);
        let listen = listen.clone();
        blocking(move || session.scrobble(&listen)).await?;
        log::info!("{}: Scrobbled successfully", self.name);
        Ok(())
    }
}
