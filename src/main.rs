// poll-scrobbler
// Reads playback samples as JSON lines on stdin and scrobbles them

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use poll_scrobbler::config::Config;
use poll_scrobbler::scrobbler::{Credentials, LastFmScrobbler, ListenBrainzScrobbler, Scrobbler};
use poll_scrobbler::text_cleanup::{CreditSplitter, Normalizer};
use poll_scrobbler::{Orchestrator, PlaybackSample};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "poll-scrobbler")]
#[command(author, version, about = "Scrobbles polled now-playing samples to Last.fm and ListenBrainz")]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Read samples from stdin, one JSON object per line (default)
    Run,
    /// Authenticate every enabled service and report the result
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Check => check(config).await,
    }
}

/// Enabled services paired with the credentials they should log in with
fn configured_backends(config: &Config) -> Vec<(Arc<dyn Scrobbler>, Credentials)> {
    let mut backends: Vec<(Arc<dyn Scrobbler>, Credentials)> = Vec::new();

    if let Some(lastfm) = config.lastfm.as_ref().filter(|l| l.enabled) {
        backends.push((Arc::new(LastFmScrobbler::new()), lastfm.credentials()));
    }

    for lb in config.listenbrainz.iter().filter(|l| l.enabled) {
        backends.push((
            Arc::new(ListenBrainzScrobbler::new(&lb.name, lb.api_url.clone())),
            lb.credentials(),
        ));
    }

    backends
}

async fn check(config: Config) -> Result<()> {
    let backends = configured_backends(&config);
    if backends.is_empty() {
        bail!("No scrobbling services are enabled");
    }

    let mut failed = 0;
    for (scrobbler, credentials) in backends {
        if scrobbler.authenticate(&credentials).await {
            println!("{}: authenticated", scrobbler.name());
        } else {
            println!("{}: authentication failed", scrobbler.name());
            failed += 1;
        }
    }

    if failed > 0 {
        bail!("{} service(s) failed to authenticate", failed);
    }
    Ok(())
}

async fn run(config: Config) -> Result<()> {
    let lookup = Arc::new(CreditSplitter::new()?);
    let normalizer = Normalizer::from_config(&config.cleanup, lookup);
    let mut orchestrator = Orchestrator::new(config.poll_interval, config.queue_depth, normalizer);

    let backends = configured_backends(&config);
    for (scrobbler, _) in &backends {
        orchestrator.add_backend(Arc::clone(scrobbler))?;
    }
    for (scrobbler, credentials) in backends {
        let name = scrobbler.name();
        match orchestrator.update_credentials(name, credentials).await {
            Ok(true) => {}
            Ok(false) => log::warn!("{}: not authenticated, submissions will be skipped", name),
            Err(e) => log::error!("{}: {:#}", name, e),
        }
    }

    log::info!(
        "Reading samples from stdin (poll interval {}s, {} service(s))",
        config.poll_interval,
        orchestrator.backends().count()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("Failed to read from stdin")? {
                    Some(line) => feed(&orchestrator, &line),
                    None => {
                        log::info!("Input closed, stopping...");
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                log::info!("Received shutdown signal, stopping...");
                break;
            }
        }
    }

    orchestrator.shutdown().await;
    Ok(())
}

fn feed(orchestrator: &Orchestrator, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    match serde_json::from_str::<PlaybackSample>(line) {
        Ok(sample) => {
            orchestrator.submit(sample);
        }
        Err(e) => log::warn!("Skipping malformed sample: {}", e),
    }
}
