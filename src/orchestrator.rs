// Scrobble orchestrator
// Fans each playback sample out to one serialized worker per backend

use crate::playback::PlaybackSample;
use crate::policy::{Decision, ScrobblePolicy};
use crate::scrobbler::{Credentials, Scrobbler};
use crate::text_cleanup::Normalizer;
use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};

enum Command {
    Sample(Arc<PlaybackSample>),
    Authenticate {
        credentials: Credentials,
        reply: oneshot::Sender<bool>,
    },
}

struct BackendHandle {
    name: String,
    commands: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

/// Drives one scrobble policy per backend.
///
/// Samples for a backend are handled strictly in arrival order by that
/// backend's worker task; backends never wait on each other.
pub struct Orchestrator {
    poll_period: u64,
    queue_depth: usize,
    normalizer: Arc<Normalizer>,
    backends: Vec<BackendHandle>,
}

impl Orchestrator {
    pub fn new(poll_period: u64, queue_depth: usize, normalizer: Normalizer) -> Self {
        Self {
            poll_period,
            queue_depth: queue_depth.max(1),
            normalizer: Arc::new(normalizer),
            backends: Vec::new(),
        }
    }

    /// Start a worker for `scrobbler`. Must be called from within a tokio runtime.
    ///
    /// Backends are addressed by name, so names must be unique.
    pub fn add_backend(&mut self, scrobbler: Arc<dyn Scrobbler>) -> Result<()> {
        let name = scrobbler.name().to_string();
        if self.backends.iter().any(|b| b.name == name) {
            bail!("A scrobbling backend named '{}' is already registered", name);
        }

        let (commands, receiver) = mpsc::channel(self.queue_depth);
        let worker = Worker {
            name: name.clone(),
            policy: ScrobblePolicy::new(name.clone(), self.poll_period),
            scrobbler,
            normalizer: Arc::clone(&self.normalizer),
            in_flight: JoinSet::new(),
        };

        log::debug!("Starting worker for {}", name);
        let task = tokio::spawn(worker.run(receiver));
        self.backends.push(BackendHandle {
            name,
            commands,
            task,
        });
        Ok(())
    }

    pub fn backends(&self) -> impl Iterator<Item = &str> {
        self.backends.iter().map(|b| b.name.as_str())
    }

    /// Queue a sample for every backend without waiting.
    ///
    /// A backend whose queue is full drops the sample. Returns how many
    /// backends accepted it.
    pub fn submit(&self, sample: PlaybackSample) -> usize {
        let sample = Arc::new(sample);
        let mut accepted = 0;

        for backend in &self.backends {
            match backend.commands.try_send(Command::Sample(Arc::clone(&sample))) {
                Ok(()) => accepted += 1,
                Err(TrySendError::Full(_)) => {
                    log::warn!("[{}] Still busy with earlier samples, dropping this one", backend.name);
                }
                Err(TrySendError::Closed(_)) => {
                    log::error!("[{}] Worker has stopped, dropping sample", backend.name);
                }
            }
        }

        accepted
    }

    /// Replace the credentials of `backend` and re-authenticate.
    ///
    /// Runs in order with the backend's samples, so no call ever sees a
    /// half-updated session.
    pub async fn update_credentials(&self, backend: &str, credentials: Credentials) -> Result<bool> {
        let handle = self
            .backends
            .iter()
            .find(|b| b.name == backend)
            .ok_or_else(|| anyhow!("Unknown scrobbling backend '{}'", backend))?;

        let (reply, outcome) = oneshot::channel();
        handle
            .commands
            .send(Command::Authenticate { credentials, reply })
            .await
            .map_err(|_| anyhow!("Worker for {} has stopped", backend))?;

        outcome
            .await
            .with_context(|| format!("Worker for {} dropped the authentication request", backend))
    }

    /// Stop accepting samples and wait for every worker to drain its queue
    pub async fn shutdown(self) {
        for backend in self.backends {
            drop(backend.commands);
            if let Err(e) = backend.task.await {
                log::error!("[{}] Worker ended abnormally: {}", backend.name, e);
            }
        }
    }
}

struct Worker {
    name: String,
    scrobbler: Arc<dyn Scrobbler>,
    policy: ScrobblePolicy,
    normalizer: Arc<Normalizer>,
    /// Now playing updates still on the wire
    in_flight: JoinSet<()>,
}

impl Worker {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        while let Some(command) = commands.recv().await {
            match command {
                Command::Sample(sample) => {
                    let outcome = AssertUnwindSafe(self.handle_sample(&sample))
                        .catch_unwind()
                        .await;
                    if outcome.is_err() {
                        log::error!("[{}] Sample handling panicked, sample discarded", self.name);
                    }
                }
                Command::Authenticate { credentials, reply } => {
                    let authenticated = self.scrobbler.authenticate(&credentials).await;
                    if reply.send(authenticated).is_err() {
                        log::debug!("[{}] Nobody waiting for the authentication result", self.name);
                    }
                }
            }
            self.reap();
        }

        while let Some(result) = self.in_flight.join_next().await {
            self.report(result);
        }
        log::debug!("[{}] Worker stopped", self.name);
    }

    async fn handle_sample(&mut self, sample: &PlaybackSample) {
        match self.policy.observe(sample) {
            Decision::Idle => {}
            Decision::NowPlaying => {
                let listen = self.normalizer.listen(sample, Utc::now()).await;
                let scrobbler = Arc::clone(&self.scrobbler);
                let name = self.name.clone();
                self.in_flight.spawn(async move {
                    if let Err(e) = scrobbler.update_now_playing(&listen).await {
                        log::warn!("[{}] Now playing update failed: {:#}", name, e);
                    }
                });
            }
            Decision::Scrobble { started_at } => {
                if !self.scrobbler.is_authenticated() {
                    log::debug!("[{}] Not authenticated, holding scrobble", self.name);
                    return;
                }

                let listen = self.normalizer.listen(sample, started_at).await;
                log::info!("[{}] Scrobbling: {} - {}", self.name, listen.artist, listen.title);
                match self.scrobbler.submit_scrobble(&listen).await {
                    Ok(()) => self.policy.mark_scrobbled(),
                    Err(e) => log::warn!(
                        "[{}] Scrobble failed, retrying on the next eligible sample: {:#}",
                        self.name,
                        e
                    ),
                }
            }
        }
    }

    fn reap(&mut self) {
        while let Some(result) = self.in_flight.try_join_next() {
            self.report(result);
        }
    }

    fn report(&self, result: Result<(), tokio::task::JoinError>) {
        if let Err(e) = result {
            log::error!("[{}] Now playing task failed: {}", self.name, e);
        }
    }
}
