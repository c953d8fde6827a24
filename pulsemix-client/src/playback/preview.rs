//! Background track preview
//!
//! A second transport, independent of main playback, bound to a
//! server-hosted track. Playback is time-boxed: a [`Deadline`] armed when the
//! engine confirms playback stops the preview once the window elapses.

use super::ticker::Deadline;
use super::transport::{AudioBackend, EngineEvent, EngineMessage, MediaSource, SoundId, Transport, TransportInput};
use crate::api::track_url;
use crate::error::{Error, Result};
use crate::state::EventBus;
use pulsemix_common::{ClientEvent, TransportState};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Preview window elapsed for one engine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewTimeout {
    pub sound: SoundId,
}

#[derive(Debug)]
pub struct PreviewInbox {
    pub engine_rx: mpsc::UnboundedReceiver<EngineMessage>,
    pub timeout_rx: mpsc::UnboundedReceiver<PreviewTimeout>,
}

pub struct PreviewController {
    backend: Box<dyn AudioBackend>,
    transport: Transport,
    base_url: String,
    selected: Option<String>,
    playing_track: Option<String>,
    window: Duration,
    deadline: Option<Deadline>,
    timeout_tx: mpsc::UnboundedSender<PreviewTimeout>,
    events: EventBus,
}

impl PreviewController {
    pub fn new(
        backend: Box<dyn AudioBackend>,
        events: EventBus,
        base_url: impl Into<String>,
        window: Duration,
        volume: f32,
    ) -> (Self, PreviewInbox) {
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        let (timeout_tx, timeout_rx) = mpsc::unbounded_channel();
        let controller = Self {
            backend,
            transport: Transport::new(engine_tx, 1.0, volume),
            base_url: base_url.into(),
            selected: None,
            playing_track: None,
            window,
            deadline: None,
            timeout_tx,
            events,
        };
        (controller, PreviewInbox { engine_rx, timeout_rx })
    }

    /// Change the selected background track
    ///
    /// A running preview of another track is stopped.
    pub fn select_track(&mut self, name: impl Into<String>) {
        let name = name.into();
        if self.selected.as_deref() == Some(name.as_str()) {
            return;
        }
        if self.is_active() {
            debug!(track = %name, "Track changed during preview, stopping it");
            self.stop();
        }
        self.selected = Some(name);
    }

    /// Start previewing the selected track, or stop a running preview
    pub fn toggle(&mut self) -> Result<()> {
        if self.is_active() {
            self.stop();
            return Ok(());
        }

        let track = self
            .selected
            .clone()
            .ok_or_else(|| Error::precondition("Select a track to preview first"))?;
        let url = track_url(&self.base_url, &track)?;

        if let Err(e) = self.transport.load(self.backend.as_mut(), MediaSource::Url(url)) {
            self.report_failure(&track, &e.to_string());
            return Err(e);
        }
        if let Some(sound) = self.transport.sound_mut() {
            sound.play();
        }
        info!(track = %track, "Preview requested");
        self.playing_track = Some(track);
        Ok(())
    }

    pub fn handle_engine_event(&mut self, message: EngineMessage) {
        if !self.transport.is_current(message.sound) {
            debug!(sound = %message.sound, event = ?message.event, "Ignoring stale preview callback");
            return;
        }

        match &message.event {
            EngineEvent::Loaded { duration } => {
                self.transport.set_duration(*duration);
                return;
            }
            EngineEvent::LoadFailed(reason) | EngineEvent::PlayFailed(reason) => {
                let track = self.playing_track.clone().unwrap_or_default();
                self.report_failure(&track, reason);
                self.stop();
                return;
            }
            _ => {}
        }

        let Some(input) = TransportInput::from_event(&message.event) else {
            return;
        };
        match self.transport.apply(input) {
            Some((_, TransportState::Playing)) => {
                if let Some(mut previous) = self.deadline.take() {
                    previous.cancel();
                }
                self.deadline = Some(Deadline::start(
                    self.window,
                    self.timeout_tx.clone(),
                    PreviewTimeout { sound: message.sound },
                ));
                self.events.broadcast_event(ClientEvent::PreviewChanged {
                    track: self.playing_track.clone(),
                    playing: true,
                    timestamp: pulsemix_common::time::now(),
                });
            }
            Some(_) => {
                self.stop();
            }
            None => {}
        }
    }

    /// Stop when the preview window for the live instance elapsed
    pub fn handle_timeout(&mut self, timeout: PreviewTimeout) -> bool {
        if !self.transport.is_current(timeout.sound) {
            return false;
        }
        info!(track = ?self.playing_track, window_secs = self.window.as_secs(), "Preview window elapsed");
        self.stop();
        true
    }

    /// Stop and release the preview instance
    pub fn stop(&mut self) -> bool {
        if let Some(mut deadline) = self.deadline.take() {
            deadline.cancel();
        }
        let track = self.playing_track.take();
        if !self.transport.teardown() {
            return false;
        }
        self.events.broadcast_event(ClientEvent::PreviewChanged {
            track,
            playing: false,
            timestamp: pulsemix_common::time::now(),
        });
        true
    }

    pub fn set_volume(&mut self, volume: f32) -> f32 {
        self.transport.set_volume(volume)
    }

    /// Whether an engine instance is loaded for preview
    pub fn is_active(&self) -> bool {
        self.transport.has_sound()
    }

    pub fn state(&self) -> TransportState {
        self.transport.state()
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    pub fn playing_track(&self) -> Option<&str> {
        self.playing_track.as_deref()
    }

    fn report_failure(&self, track: &str, reason: &str) {
        warn!(track = %track, reason = %reason, "Preview failed");
        self.events
            .broadcast_event(ClientEvent::error(format!("Could not preview {}: {}", track, reason)));
    }
}
