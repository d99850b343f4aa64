// Last.fm scrobbler implementation
// Password authentication and track calls go through rustfm-scrobble-proxy

use super::traits::{Credentials, LastFmCredentials, Listen, Scrobbler, Session};
use super::{blocking, SessionSlot};
use anyhow::{Context, Result};
use async_trait::async_trait;
use rustfm_scrobble_proxy::{Scrobble, Scrobbler as LastFmClient};
use std::sync::{Arc, Mutex, PoisonError};

/// Exchanges Last.fm credentials for an authenticated session
pub trait LastFmConnector: Send + Sync + 'static {
    fn connect(&self, credentials: &LastFmCredentials) -> Result<Arc<dyn Session>>;
}

/// Connector backed by the Last.fm web API
#[derive(Debug, Default, Clone, Copy)]
pub struct RustfmConnector;

impl LastFmConnector for RustfmConnector {
    fn connect(&self, credentials: &LastFmCredentials) -> Result<Arc<dyn Session>> {
        let mut client = LastFmClient::new(&credentials.api_key, &credentials.api_secret);
        client
            .authenticate_with_password(&credentials.username, &credentials.password)
            .context("Last.fm rejected the session request")?;
        log::debug!("Last.fm: session key obtained for {}", credentials.username);

        Ok(Arc::new(RustfmSession {
            client: Mutex::new(client),
        }))
    }
}

struct RustfmSession {
    client: Mutex<LastFmClient>,
}

impl Session for RustfmSession {
    fn now_playing(&self, listen: &Listen) -> Result<()> {
        let scrobble = Scrobble::new(&listen.artist, &listen.title, listen.album());
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .now_playing(&scrobble)
            .context("Failed to update now playing on Last.fm")?;
        Ok(())
    }

    fn scrobble(&self, listen: &Listen) -> Result<()> {
        let mut scrobble = Scrobble::new(&listen.artist, &listen.title, listen.album());
        scrobble.with_timestamp(listen.timestamp.timestamp() as u64);
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .scrobble(&scrobble)
            .context("Failed to scrobble to Last.fm")?;
        Ok(())
    }
}

/// Last.fm backend adapter
pub struct LastFmScrobbler {
    connector: Arc<dyn LastFmConnector>,
    session: SessionSlot,
}

impl LastFmScrobbler {
    pub fn new() -> Self {
        Self::with_connector(Arc::new(RustfmConnector))
    }

    pub fn with_connector(connector: Arc<dyn LastFmConnector>) -> Self {
        Self {
            connector,
            session: SessionSlot::default(),
        }
    }
}

impl Default for LastFmScrobbler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Scrobbler for LastFmScrobbler {
    fn name(&self) -> &str {
        "Last.fm"
    }

    fn is_authenticated(&self) -> bool {
        self.session.is_set()
    }

    async fn authenticate(&self, credentials: &Credentials) -> bool {
        self.session.clear();

        let Credentials::LastFm(credentials) = credentials else {
            log::warn!("Last.fm: ignoring credentials meant for another service");
            return false;
        };

        if credentials.api_key.is_empty()
            || credentials.api_secret.is_empty()
            || credentials.username.is_empty()
        {
            log::warn!("Last.fm: api_key, api_secret and username are required");
            return false;
        }
        if credentials.password.is_empty() {
            log::warn!("Last.fm: password is required to obtain a session");
            return false;
        }

        let connector = Arc::clone(&self.connector);
        let credentials = credentials.clone();
        match blocking(move || connector.connect(&credentials)).await {
            Ok(session) => {
                self.session.replace(Some(session));
                log::info!("Last.fm authentication succeeded");
                true
            }
            Err(e) => {
                log::warn!("Last.fm authentication failed: {:#}", e);
                false
            }
        }
    }

    async fn update_now_playing(&self, listen: &Listen) -> Result<()> {
        let Some(session) = self.session.get() else {
            log::debug!("Last.fm: not authenticated, skipping now playing");
            return Ok(());
        };

        log::debug!(
            "Sending now playing to Last.fm: {} - {}",
            listen.artist,
            listen.title
        );
        let listen = listen.clone();
        blocking(move || session.now_playing(&listen)).await?;
        log::info!("Last.fm: Now playing updated");
        Ok(())
    }

    async fn submit_scrobble(&self, listen: &Listen) -> Result<()> {
        let Some(session) = self.session.get() else {
            log::debug!("Last.fm: not authenticated, skipping scrobble");
            return Ok(());
        };

        log::debug!("Scrobbling to Last.fm: {} - {}", listen.artist, listen.title);
        let listen = listen.clone();
        blocking(move || session.scrobble(&listen)).await?;
        log::info!("Last.fm: Scrobbled successfully");
        Ok(())
    }
}
