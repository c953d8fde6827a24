//! PulseMix client - main entry point
//!
//! Subcommands probe the mixing service, list its background tracks, run a
//! one-shot generation, or open an interactive session on stdin.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use pulsemix_client::api::{AvailabilityMonitor, CuePayload, MixClient, MixResponse};
use pulsemix_client::archive::ZipCodec;
use pulsemix_client::job::legacy::apply_archive;
use pulsemix_client::job::{JobSummary, StreamingJobConsumer};
use pulsemix_client::playback::HeadlessBackend;
use pulsemix_client::save::DirectorySink;
use pulsemix_client::session::{job_event, Session, SessionParts};
use pulsemix_client::{ArtifactStore, EventBus};
use pulsemix_common::config::{ConfigSource, TomlConfig};
use pulsemix_common::ClientEvent;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Command-line arguments for pulsemix
#[derive(Parser, Debug)]
#[command(name = "pulsemix")]
#[command(about = "Heartbeat mix client")]
#[command(version)]
struct Args {
    /// Configuration file (overrides PULSEMIX_CONFIG and the platform default)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Mixing service base URL
    #[arg(long, global = true, env = "PULSEMIX_SERVER")]
    server: Option<String>,

    /// Print events as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Probe the mixing service once
    Health,
    /// List background tracks
    Tracks,
    /// Generate versions and report progress
    Generate {
        /// Heartbeat cue file
        #[arg(long)]
        cue: PathBuf,
        /// Background track name
        #[arg(long)]
        track: String,
    },
    /// Interactive session (default)
    Session {
        #[arg(long)]
        cue: Option<PathBuf>,
        #[arg(long)]
        track: Option<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, source) =
        TomlConfig::resolve(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(server) = &args.server {
        config.server.base_url = server.clone();
        config.validate().context("Invalid --server value")?;
    }

    init_tracing(&config)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        git = env!("GIT_HASH"),
        built = env!("BUILD_TIMESTAMP"),
        profile = env!("BUILD_PROFILE"),
        "Starting pulsemix"
    );
    match &source {
        ConfigSource::CompiledDefaults => info!("Using compiled default configuration"),
        other => info!(source = ?other, "Configuration loaded"),
    }

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start runtime")?
        .block_on(run(args, config))
}

fn init_tracing(config: &TomlConfig) -> Result<()> {
    let file_layer = match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

async fn run(args: Args, config: TomlConfig) -> Result<()> {
    let client = MixClient::new(&config.server).context("Failed to build HTTP client")?;

    match args.command.unwrap_or(Cmd::Session {
        cue: None,
        track: None,
    }) {
        Cmd::Health => {
            if client.health().await {
                println!("Server ready at {}", client.base_url());
                Ok(())
            } else {
                bail!("Server at {} is not responding", client.base_url());
            }
        }
        Cmd::Tracks => {
            let tracks = client.list_tracks().await.context("Failed to list tracks")?;
            if tracks.is_empty() {
                println!("No background tracks available");
            }
            for track in tracks {
                println!("{}", track);
            }
            Ok(())
        }
        Cmd::Generate { cue, track } => generate(&client, &config, &cue, &track, args.json).await,
        Cmd::Session { cue, track } => session(client, &config, cue, track, args.json).await,
    }
}

/// One-shot generation: stream, print progress, keep nothing
async fn generate(client: &MixClient, config: &TomlConfig, cue: &std::path::Path, track: &str, json: bool) -> Result<()> {
    let cue = CuePayload::load(cue)
        .await
        .with_context(|| format!("Failed to read cue {}", cue.display()))?;
    let job_id = Uuid::new_v4();
    let mut store = ArtifactStore::new();

    print_event(
        &ClientEvent::GenerationStarted {
            job_id,
            track_name: track.to_string(),
            timestamp: pulsemix_common::time::now(),
        },
        json,
    );

    let summary = match client.mix_all(&cue, track).await {
        Ok(MixResponse::Stream(stream)) => {
            let mut consumer = StreamingJobConsumer::new(config.output.media_type.clone(), std::time::Instant::now());
            consumer
                .consume(stream, &mut store, |update| print_event(&job_event(job_id, update.clone()), json))
                .await
        }
        Ok(MixResponse::Archive(body)) => {
            let (updates, summary) = apply_archive(
                &body,
                &ZipCodec,
                &mut store,
                &config.output.extension,
                &config.output.media_type,
            );
            for update in updates {
                print_event(&job_event(job_id, update), json);
            }
            summary
        }
        Err(e) => {
            warn!(error = %e, "Generation request failed");
            print_event(&ClientEvent::error(format!("Generation failed: {}", e)), json);
            store.fail_pending();
            JobSummary::from_store(&store, None)
        }
    };

    if let Err(e) = summary.check_complete() {
        print_event(&ClientEvent::warning(e.to_string()), json);
    }
    let nothing_ready = summary.ready.is_empty();
    print_event(
        &ClientEvent::GenerationFinished {
            job_id,
            ready: summary.ready,
            failed: summary.failed,
            pending: summary.pending,
            timestamp: pulsemix_common::time::now(),
        },
        json,
    );
    if nothing_ready {
        bail!("No version was generated");
    }
    Ok(())
}

async fn session(
    client: MixClient,
    config: &TomlConfig,
    cue: Option<PathBuf>,
    track: Option<String>,
    json: bool,
) -> Result<()> {
    let events = EventBus::new();
    let printer = tokio::spawn(print_events(events.subscribe_events(), json));

    let monitor = AvailabilityMonitor::spawn(
        client.clone(),
        Duration::from_secs(config.server.health_interval_secs),
        events.clone(),
    );

    let mut session = Session::new(
        config,
        SessionParts {
            client,
            main_backend: Box::new(HeadlessBackend::new()),
            preview_backend: Box::new(HeadlessBackend::new()),
            sink: DirectorySink::new(config.output.directory.clone()),
            events: events.clone(),
            availability: Some(monitor.subscribe()),
        },
    );
    if let Some(path) = cue {
        let payload = CuePayload::load(&path)
            .await
            .with_context(|| format!("Failed to read cue {}", path.display()))?;
        session.set_cue(payload);
    }
    if let Some(track) = track {
        session.select_track(track);
    }
    events.broadcast_event(ClientEvent::info("Type help for commands"));

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let result = session.run(stdin).await;

    drop(session);
    drop(monitor);
    drop(events);
    if tokio::time::timeout(Duration::from_millis(500), printer).await.is_err() {
        warn!("Event printer did not finish");
    }
    result.context("Session failed")
}

async fn print_events(mut rx: broadcast::Receiver<ClientEvent>, json: bool) {
    loop {
        match rx.recv().await {
            Ok(event) => print_event(&event, json),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Event printer fell behind");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_event(event: &ClientEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => warn!(error = %e, "Could not serialize event"),
        }
    } else {
        println!("{}", event.describe());
    }
}
