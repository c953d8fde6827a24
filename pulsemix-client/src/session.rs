//! Interactive session
//!
//! One [`Session`] owns every piece of client state: the artifact store, both
//! transports, the tempo pipeline and the current generation job. It is driven
//! by a single `select!` loop over user input, job chunks, engine callbacks,
//! position ticks, preview deadlines and tempo responses. Work that waits on
//! the network runs in spawned tasks that only forward results back into the
//! loop, so state is never touched from two places.

use crate::api::{Availability, CuePayload, MixClient, MixResponse};
use crate::archive::ZipCodec;
use crate::command::{parse_command, Command, HELP};
use crate::error::{Error, Result};
use crate::job::legacy::apply_archive;
use crate::job::{GenerationGuard, JobSummary, JobUpdate, StreamingJobConsumer};
use crate::playback::{
    AudioBackend, PlaybackController, PlaybackInbox, PreviewController, PreviewInbox,
};
use crate::save::{download_version, SaveSink};
use crate::state::EventBus;
use crate::store::ArtifactStore;
use crate::tempo::TempoAdjustmentPipeline;
use bytes::Bytes;
use futures::StreamExt;
use pulsemix_common::config::TomlConfig;
use pulsemix_common::time::{format_position, millis_to_duration};
use pulsemix_common::{ClientEvent, TransportState, VersionId};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Output of a spawned generation request
#[derive(Debug)]
pub enum JobMessage {
    Chunk { job_id: Uuid, bytes: Bytes },
    ReadError { job_id: Uuid, error: String },
    End { job_id: Uuid },
    Archive { job_id: Uuid, body: Bytes },
    Rejected { job_id: Uuid, error: String },
}

impl JobMessage {
    fn job_id(&self) -> Uuid {
        match self {
            JobMessage::Chunk { job_id, .. }
            | JobMessage::ReadError { job_id, .. }
            | JobMessage::End { job_id }
            | JobMessage::Archive { job_id, .. }
            | JobMessage::Rejected { job_id, .. } => *job_id,
        }
    }
}

/// Whether the loop keeps running after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Collaborators a session is built from
pub struct SessionParts<S> {
    pub client: MixClient,
    pub main_backend: Box<dyn AudioBackend>,
    pub preview_backend: Box<dyn AudioBackend>,
    pub sink: S,
    pub events: EventBus,
    /// Availability feed; without one the server is assumed reachable
    pub availability: Option<watch::Receiver<Availability>>,
}

struct SessionInbox {
    job_rx: mpsc::UnboundedReceiver<JobMessage>,
    tempo_rx: mpsc::UnboundedReceiver<Result<Bytes>>,
    playback: PlaybackInbox,
    preview: PreviewInbox,
}

pub struct Session<S: SaveSink> {
    client: MixClient,
    store: ArtifactStore,
    guard: GenerationGuard,
    consumer: Option<StreamingJobConsumer>,
    playback: PlaybackController,
    preview: PreviewController,
    tempo: TempoAdjustmentPipeline,
    sink: S,
    events: EventBus,
    availability: Option<watch::Receiver<Availability>>,
    cue: Option<CuePayload>,
    track: Option<String>,
    media_type: String,
    extension: String,
    download_prefix: String,
    job_tx: mpsc::UnboundedSender<JobMessage>,
    tempo_tx: mpsc::UnboundedSender<Result<Bytes>>,
    inbox: Option<SessionInbox>,
}

impl<S: SaveSink> Session<S> {
    pub fn new(config: &TomlConfig, parts: SessionParts<S>) -> Self {
        let (playback, playback_inbox) = PlaybackController::new(
            parts.main_backend,
            parts.events.clone(),
            millis_to_duration(config.playback.poll_interval_ms),
            config.playback.initial_volume,
        );
        let (preview, preview_inbox) = PreviewController::new(
            parts.preview_backend,
            parts.events.clone(),
            parts.client.base_url().to_string(),
            Duration::from_secs(config.playback.preview_window_secs),
            config.playback.initial_volume,
        );
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        let (tempo_tx, tempo_rx) = mpsc::unbounded_channel();

        Self {
            client: parts.client,
            store: ArtifactStore::new(),
            guard: GenerationGuard::new(),
            consumer: None,
            playback,
            preview,
            tempo: TempoAdjustmentPipeline::new(Box::new(ZipCodec), config.output.extension.clone()),
            sink: parts.sink,
            events: parts.events,
            availability: parts.availability,
            cue: None,
            track: None,
            media_type: config.output.media_type.clone(),
            extension: config.output.extension.clone(),
            download_prefix: config.output.download_prefix.clone(),
            job_tx,
            tempo_tx,
            inbox: Some(SessionInbox {
                job_rx,
                tempo_rx,
                playback: playback_inbox,
                preview: preview_inbox,
            }),
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn playback(&self) -> &PlaybackController {
        &self.playback
    }

    pub fn preview(&self) -> &PreviewController {
        &self.preview
    }

    pub fn set_cue(&mut self, cue: CuePayload) {
        self.cue = Some(cue);
    }

    pub fn select_track(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.preview.select_track(name.clone());
        self.track = Some(name);
    }

    /// Drive the session until `quit`, or until input ends and no request is
    /// still in flight
    pub async fn run<R>(&mut self, input: R) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
    {
        let Some(mut inbox) = self.inbox.take() else {
            return Err(Error::precondition("Session is already running"));
        };
        let mut lines = input.lines();
        let mut input_open = true;

        loop {
            if !input_open && !self.guard.is_busy() && !self.tempo.is_busy() {
                break;
            }

            tokio::select! {
                line = lines.next_line(), if input_open => match line? {
                    Some(line) => {
                        if self.handle_line(&line).await == Flow::Quit {
                            break;
                        }
                    }
                    None => {
                        debug!("Input closed");
                        input_open = false;
                    }
                },
                Some(message) = inbox.job_rx.recv() => self.handle_job_message(message),
                Some(message) = inbox.playback.engine_rx.recv() => self.playback.handle_engine_event(message),
                Some(tick) = inbox.playback.tick_rx.recv() => {
                    self.playback.on_tick(tick);
                }
                Some(message) = inbox.preview.engine_rx.recv() => self.preview.handle_engine_event(message),
                Some(timeout) = inbox.preview.timeout_rx.recv() => {
                    self.preview.handle_timeout(timeout);
                }
                Some(response) = inbox.tempo_rx.recv() => self.finish_tempo(response).await,
                else => break,
            }
        }

        self.playback.close();
        self.preview.stop();
        self.inbox = Some(inbox);
        Ok(())
    }

    /// Parse and execute one input line, reporting failures as notices
    pub async fn handle_line(&mut self, line: &str) -> Flow {
        let command = match parse_command(line) {
            Ok(Some(command)) => command,
            Ok(None) => return Flow::Continue,
            Err(e) => {
                self.report(&e);
                return Flow::Continue;
            }
        };
        match self.execute(command).await {
            Ok(flow) => flow,
            Err(e) => {
                self.report(&e);
                Flow::Continue
            }
        }
    }

    pub async fn execute(&mut self, command: Command) -> Result<Flow> {
        debug!(?command, "Executing command");
        match command {
            Command::Cue(path) => {
                let cue = CuePayload::load(&path).await?;
                self.notice(format!("Cue set to {} ({} bytes)", cue.file_name, cue.bytes.len()));
                self.cue = Some(cue);
            }
            Command::Select(name) => {
                self.select_track(name.clone());
                self.notice(format!("Track {:?} selected", name));
            }
            Command::Tracks => {
                let tracks = self.client.list_tracks().await?;
                if tracks.is_empty() {
                    self.notice("The server offers no background tracks");
                } else {
                    self.notice(format!("Tracks: {}", tracks.join(", ")));
                }
            }
            Command::Generate => self.start_generation()?,
            Command::Play(version) => self.playback.activate(version, &self.store)?,
            Command::Toggle => {
                if !self.playback.toggle_play_pause() {
                    return Err(Error::precondition("Nothing is playing"));
                }
            }
            Command::Seek(fraction) => {
                if self.playback.seek_begin() {
                    self.playback.seek_drag(fraction);
                }
                let target = self.playback.seek_end(fraction)?;
                debug!(target, "Seek finished");
            }
            Command::Skip(direction) => {
                if self.playback.skip(direction, &self.store)?.is_none() {
                    self.notice("No other version is ready");
                }
            }
            Command::Rate(rate) => self.playback.set_rate(rate)?,
            Command::Volume(volume) => {
                let applied = self.playback.set_volume(volume);
                self.preview.set_volume(applied);
                self.notice(format!("Volume {:.0}%", applied * 100.0));
            }
            Command::Tempo(option) => {
                self.tempo.select(option);
                self.notice(format!("Tempo option {} chosen", option));
            }
            Command::Adjust => self.start_tempo()?,
            Command::Download => {
                download_version(
                    &self.sink,
                    self.playback.active_key(),
                    &self.store,
                    &self.download_prefix,
                    &self.extension,
                    &self.events,
                )
                .await?;
            }
            Command::Preview(track) => {
                if let Some(name) = track {
                    self.select_track(name);
                    if self.preview.is_active() {
                        return Ok(Flow::Continue);
                    }
                }
                self.preview.toggle()?;
            }
            Command::Close => {
                if !self.playback.close() {
                    self.notice("The player is already closed");
                }
            }
            Command::Status => self.notice(self.status_line()),
            Command::Help => self.notice(HELP),
            Command::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }

    /// Validate inputs and spawn a generation request
    fn start_generation(&mut self) -> Result<()> {
        if let Some(availability) = &self.availability {
            if !availability.borrow().allows_generation() {
                return Err(Error::precondition("The mixing service is not responding, try again shortly"));
            }
        }
        let cue = self
            .cue
            .clone()
            .ok_or_else(|| Error::precondition("Choose a heartbeat cue first (cue <path>)"))?;
        let track = self
            .track
            .clone()
            .ok_or_else(|| Error::precondition("Select a background track first (select <track>)"))?;
        let job_id = self.guard.try_begin()?;

        self.playback.close();
        self.store.reset();
        self.consumer = Some(StreamingJobConsumer::new(self.media_type.clone(), Instant::now()));
        self.events.broadcast_event(ClientEvent::GenerationStarted {
            job_id,
            track_name: track.clone(),
            timestamp: pulsemix_common::time::now(),
        });
        info!(%job_id, track = %track, "Generation started");

        let client = self.client.clone();
        let tx = self.job_tx.clone();
        tokio::spawn(async move {
            let message = match client.mix_all(&cue, &track).await {
                Ok(MixResponse::Stream(mut stream)) => {
                    while let Some(item) = stream.next().await {
                        match item {
                            Ok(bytes) => {
                                if tx.send(JobMessage::Chunk { job_id, bytes }).is_err() {
                                    return;
                                }
                            }
                            Err(e) => {
                                let _ = tx.send(JobMessage::ReadError {
                                    job_id,
                                    error: e.to_string(),
                                });
                                return;
                            }
                        }
                    }
                    JobMessage::End { job_id }
                }
                Ok(MixResponse::Archive(body)) => JobMessage::Archive { job_id, body },
                Err(e) => JobMessage::Rejected {
                    job_id,
                    error: e.to_string(),
                },
            };
            let _ = tx.send(message);
        });
        Ok(())
    }

    /// Apply one message from the generation task
    pub fn handle_job_message(&mut self, message: JobMessage) {
        let job_id = message.job_id();
        if self.guard.active() != Some(job_id) {
            debug!(%job_id, "Ignoring message from a finished job");
            return;
        }
        let Some(consumer) = self.consumer.as_mut() else {
            return;
        };

        match message {
            JobMessage::Chunk { bytes, .. } => {
                let updates = consumer.feed(&bytes, &mut self.store, Instant::now());
                self.publish_updates(job_id, updates);
            }
            JobMessage::End { .. } => {
                let (updates, summary) = consumer.finish(&mut self.store, Instant::now(), None);
                self.publish_updates(job_id, updates);
                self.finish_job(job_id, summary);
            }
            JobMessage::ReadError { error, .. } => {
                let (updates, summary) = consumer.finish(&mut self.store, Instant::now(), Some(error));
                self.publish_updates(job_id, updates);
                self.finish_job(job_id, summary);
            }
            JobMessage::Archive { body, .. } => {
                let (updates, summary) =
                    apply_archive(&body, &ZipCodec, &mut self.store, &self.extension, &self.media_type);
                self.publish_updates(job_id, updates);
                self.finish_job(job_id, summary);
            }
            JobMessage::Rejected { error, .. } => {
                warn!(%job_id, error = %error, "Generation request failed");
                self.store.fail_pending();
                self.events
                    .broadcast_event(ClientEvent::error(format!("Generation failed: {}", error)));
                let summary = JobSummary::from_store(&self.store, None);
                self.finish_job(job_id, summary);
            }
        }
    }

    fn publish_updates(&self, job_id: Uuid, updates: Vec<JobUpdate>) {
        for update in updates {
            self.events.broadcast_event(job_event(job_id, update));
        }
    }

    fn finish_job(&mut self, job_id: Uuid, summary: JobSummary) {
        if let Err(e) = summary.check_complete() {
            let detail = match &summary.read_error {
                Some(read_error) => format!("{} ({})", e, read_error),
                None => e.to_string(),
            };
            self.events.broadcast_event(ClientEvent::warning(detail));
        }
        self.events.broadcast_event(ClientEvent::GenerationFinished {
            job_id,
            ready: summary.ready,
            failed: summary.failed,
            pending: summary.pending,
            timestamp: pulsemix_common::time::now(),
        });
        self.consumer = None;
        self.guard.finish(job_id);
    }

    fn start_tempo(&mut self) -> Result<()> {
        let request = self.tempo.begin(self.playback.active_key(), &self.store)?;
        self.notice(format!("Adjusting {} to tempo {}...", request.version, request.option));

        let client = self.client.clone();
        let tx = self.tempo_tx.clone();
        let extension = self.tempo.extension().to_string();
        tokio::spawn(async move {
            let response = client
                .adjust_bpm(request.version, &request.blob, &extension, request.option)
                .await;
            let _ = tx.send(response);
        });
        Ok(())
    }

    async fn finish_tempo(&mut self, response: Result<Bytes>) {
        match self.tempo.complete(response, &self.sink, &self.events).await {
            Ok(saved) => self.notice(format!("Tempo adjustment saved {} file(s)", saved.len())),
            Err(e) => self.report(&e),
        }
    }

    fn status_line(&self) -> String {
        let server = self
            .availability
            .as_ref()
            .map(|rx| rx.borrow().to_string())
            .unwrap_or_else(|| "unmonitored".to_string());
        let slots: Vec<String> = VersionId::ALL
            .iter()
            .map(|v| format!("{} {}", v, self.store.state(*v)))
            .collect();
        let session = self.playback.session();
        let player = match session.active_key {
            Some(key) => format!(
                "{} {} {}/{} rate {} vol {:.2}",
                key,
                session.transport_state,
                format_position(session.position_seconds),
                format_position(session.duration_seconds),
                session.rate,
                session.volume
            ),
            None => "closed".to_string(),
        };
        let preview = match (self.preview.playing_track(), self.preview.state()) {
            (Some(track), TransportState::Playing) => format!("playing {}", track),
            (Some(track), _) => format!("loading {}", track),
            (None, _) => "idle".to_string(),
        };
        let generation = if self.guard.is_busy() { "running" } else { "idle" };
        format!(
            "server: {} | job: {} | slots: {} | player: {} | preview: {} | track: {} | tempo: {}",
            server,
            generation,
            slots.join(", "),
            player,
            preview,
            self.track.as_deref().unwrap_or("-"),
            self.tempo.selected().map(|o| o.to_string()).unwrap_or_else(|| "-".to_string())
        )
    }

    fn notice(&self, message: impl Into<String>) {
        self.events.broadcast_event(ClientEvent::info(message));
    }

    fn report(&self, error: &Error) {
        let event = match error {
            Error::Precondition(_) | Error::Common(pulsemix_common::Error::InvalidInput(_)) => {
                ClientEvent::warning(error.to_string())
            }
            _ => ClientEvent::error(error.to_string()),
        };
        self.events.broadcast_event(event);
    }
}

/// Map a consumer update onto the client event stream
pub fn job_event(job_id: Uuid, update: JobUpdate) -> ClientEvent {
    let timestamp = pulsemix_common::time::now();
    match update {
        JobUpdate::SlotReady {
            version,
            done,
            total,
            eta,
        } => ClientEvent::SlotReady {
            job_id,
            version,
            done,
            total,
            eta_secs: eta.map(crate::job::progress::eta_secs),
            timestamp,
        },
        JobUpdate::SlotFailed { version, reason } => ClientEvent::SlotFailed {
            job_id,
            version,
            reason,
            timestamp,
        },
    }
}
