//! Main playback controller
//!
//! Owns the one transport bound to an [`ArtifactStore`] entry. User commands
//! are issued to the engine; the transport state only moves when the engine
//! confirms through a lifecycle callback. Position polling runs as a
//! [`Ticker`] while the transport is playing, and every tick carries the
//! [`SoundId`] it was started for so ticks from a superseded instance are
//! ignored.

use super::ticker::Ticker;
use super::transport::{
    AudioBackend, EngineEvent, EngineMessage, MediaSource, SoundId, Transport, TransportInput,
};
use crate::error::{Error, Result};
use crate::state::EventBus;
use crate::store::ArtifactStore;
use pulsemix_common::{ClientEvent, Direction, TransportState, VersionId, SLOT_COUNT};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Position poll request for one engine instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionTick {
    pub sound: SoundId,
}

/// Receivers the session loop drains on behalf of the controller
#[derive(Debug)]
pub struct PlaybackInbox {
    pub engine_rx: mpsc::UnboundedReceiver<EngineMessage>,
    pub tick_rx: mpsc::UnboundedReceiver<PositionTick>,
}

/// Snapshot of the main playback session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackSession {
    pub active_key: Option<VersionId>,
    pub transport_state: TransportState,
    pub position_seconds: f64,
    pub duration_seconds: f64,
    pub rate: f32,
    pub volume: f32,
    pub seek_drag_active: bool,
}

pub struct PlaybackController {
    backend: Box<dyn AudioBackend>,
    transport: Transport,
    active_key: Option<VersionId>,
    seek_drag_active: bool,
    ticker: Option<Ticker>,
    tick_tx: mpsc::UnboundedSender<PositionTick>,
    poll_interval: Duration,
    events: EventBus,
}

impl PlaybackController {
    pub fn new(
        backend: Box<dyn AudioBackend>,
        events: EventBus,
        poll_interval: Duration,
        initial_volume: f32,
    ) -> (Self, PlaybackInbox) {
        let (engine_tx, engine_rx) = mpsc::unbounded_channel();
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        let controller = Self {
            backend,
            transport: Transport::new(engine_tx, 1.0, initial_volume),
            active_key: None,
            seek_drag_active: false,
            ticker: None,
            tick_tx,
            poll_interval,
            events,
        };
        (controller, PlaybackInbox { engine_rx, tick_rx })
    }

    /// Bind the transport to a ready artifact and start playing it
    ///
    /// A key that is not ready is rejected before anything is torn down.
    pub fn activate(&mut self, key: VersionId, store: &ArtifactStore) -> Result<()> {
        let blob = match store.get(key) {
            Some(blob) if store.is_ready(key) => blob.clone(),
            _ => {
                return Err(Error::precondition(format!(
                    "Version {} is not ready ({})",
                    key,
                    store.state(key)
                )))
            }
        };

        self.stop_polling();
        self.seek_drag_active = false;
        let old_state = self.transport.state();
        let old_key = self.active_key.take();
        if old_state != TransportState::Stopped {
            self.emit_transition(old_key, old_state, TransportState::Stopped);
        }

        if let Err(e) = self.transport.load(self.backend.as_mut(), MediaSource::Memory(blob)) {
            warn!(version = %key, error = %e, "Could not load version");
            return Err(e);
        }
        self.active_key = Some(key);
        if let Some(sound) = self.transport.sound_mut() {
            sound.play();
        }
        info!(version = %key, previous = ?old_key, "Version activated");
        self.check_invariant();
        Ok(())
    }

    /// Feed one engine callback into the state machine
    pub fn handle_engine_event(&mut self, message: EngineMessage) {
        if !self.transport.is_current(message.sound) {
            debug!(sound = %message.sound, event = ?message.event, "Ignoring callback from released instance");
            return;
        }

        match &message.event {
            EngineEvent::Loaded { duration } => {
                self.transport.set_duration(*duration);
                debug!(version = ?self.active_key, duration, "Version loaded");
                return;
            }
            EngineEvent::LoadFailed(reason) | EngineEvent::PlayFailed(reason) => {
                warn!(version = ?self.active_key, reason = %reason, "Playback failed");
                self.events.broadcast_event(ClientEvent::error(format!(
                    "Could not play {}: {}",
                    self.active_key.map(|k| k.as_str()).unwrap_or("version"),
                    reason
                )));
                self.close();
                return;
            }
            _ => {}
        }

        let Some(input) = TransportInput::from_event(&message.event) else {
            return;
        };
        if let Some((old, new)) = self.transport.apply(input) {
            match new {
                TransportState::Playing => self.start_polling(message.sound),
                TransportState::Paused | TransportState::Stopped => self.stop_polling(),
            }
            if input == TransportInput::Ended {
                let end = self.transport.duration();
                self.transport.set_position(end);
            }
            self.emit_transition(self.active_key, old, new);
        }
        self.check_invariant();
    }

    /// Pause when playing, resume when paused, nothing when stopped
    ///
    /// Returns whether a command was issued.
    pub fn toggle_play_pause(&mut self) -> bool {
        match self.transport.state() {
            TransportState::Playing => {
                self.stop_polling();
                if let Some(sound) = self.transport.sound_mut() {
                    sound.pause();
                }
                true
            }
            TransportState::Paused => {
                if let Some(sound) = self.transport.sound_mut() {
                    sound.play();
                }
                true
            }
            TransportState::Stopped => false,
        }
    }

    /// User started dragging the seek bar
    pub fn seek_begin(&mut self) -> bool {
        if !self.transport.has_sound() {
            return false;
        }
        self.seek_drag_active = true;
        true
    }

    /// Displayed position follows the drag; the engine is not touched
    pub fn seek_drag(&mut self, fraction: f64) {
        if self.seek_drag_active {
            let target = self.fraction_to_seconds(fraction);
            self.transport.set_position(target);
        }
    }

    /// User released the seek bar at `fraction` of the duration
    pub fn seek_end(&mut self, fraction: f64) -> Result<f64> {
        self.seek_drag_active = false;
        if !self.transport.has_sound() {
            return Err(Error::precondition("Nothing to seek: no version is active"));
        }
        let target = self.fraction_to_seconds(fraction);
        let playing = self.transport.state() == TransportState::Playing;
        if let Some(sound) = self.transport.sound_mut() {
            sound.seek(target);
            if !playing {
                sound.play();
            }
        }
        self.transport.set_position(target);
        debug!(version = ?self.active_key, target, "Seek");
        Ok(target)
    }

    /// Playback rate for the live instance and every later activation
    pub fn set_rate(&mut self, rate: f32) -> Result<()> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(pulsemix_common::Error::InvalidInput(format!(
                "Playback rate must be positive, got {}",
                rate
            ))
            .into());
        }
        self.transport.set_rate(rate);
        debug!(rate, live = self.transport.has_sound(), "Playback rate set");
        Ok(())
    }

    /// Volume for the live instance and every later activation; returns the clamped value
    pub fn set_volume(&mut self, volume: f32) -> f32 {
        self.transport.set_volume(volume)
    }

    /// Step to the nearest ready slot in `direction`, wrapping around
    ///
    /// Returns the newly activated key, or `None` when no other slot is ready.
    pub fn skip(&mut self, direction: Direction, store: &ArtifactStore) -> Result<Option<VersionId>> {
        let current = self
            .active_key
            .ok_or_else(|| Error::precondition("Nothing to skip from: no version is active"))?;

        let mut candidate = current.step(direction);
        for _ in 0..SLOT_COUNT {
            if candidate == current {
                break;
            }
            if store.is_ready(candidate) {
                self.activate(candidate, store)?;
                return Ok(Some(candidate));
            }
            candidate = candidate.step(direction);
        }
        debug!(version = %current, ?direction, "No other ready version to skip to");
        Ok(None)
    }

    /// Stop and release the engine; returns whether anything was active
    pub fn close(&mut self) -> bool {
        self.stop_polling();
        self.seek_drag_active = false;
        let old_state = self.transport.state();
        let old_key = self.active_key.take();
        let released = self.transport.teardown();
        if old_state != TransportState::Stopped {
            self.emit_transition(old_key, old_state, TransportState::Stopped);
        }
        if released {
            info!(version = ?old_key, "Player closed");
        }
        self.check_invariant();
        released
    }

    /// Refresh displayed position and duration from the engine
    ///
    /// Returns whether the tick was for the live instance. While a seek drag
    /// is active the displayed position is left alone.
    pub fn on_tick(&mut self, tick: PositionTick) -> bool {
        if !self.transport.is_current(tick.sound) || self.transport.state() != TransportState::Playing {
            return false;
        }
        let (position, duration) = match self.transport.sound() {
            Some(sound) => (sound.position(), sound.duration()),
            None => return false,
        };
        if duration > 0.0 {
            self.transport.set_duration(duration);
        }
        if !self.seek_drag_active {
            self.transport.set_position(position);
        }
        true
    }

    pub fn session(&self) -> PlaybackSession {
        PlaybackSession {
            active_key: self.active_key,
            transport_state: self.transport.state(),
            position_seconds: self.transport.position(),
            duration_seconds: self.transport.duration(),
            rate: self.transport.rate(),
            volume: self.transport.volume(),
            seek_drag_active: self.seek_drag_active,
        }
    }

    pub fn active_key(&self) -> Option<VersionId> {
        self.active_key
    }

    pub fn state(&self) -> TransportState {
        self.transport.state()
    }

    pub fn is_polling(&self) -> bool {
        self.ticker.as_ref().map(Ticker::is_running).unwrap_or(false)
    }

    fn fraction_to_seconds(&self, fraction: f64) -> f64 {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        fraction * self.transport.duration()
    }

    fn start_polling(&mut self, sound: SoundId) {
        self.stop_polling();
        self.ticker = Some(Ticker::start(
            self.poll_interval,
            self.tick_tx.clone(),
            PositionTick { sound },
        ));
    }

    fn stop_polling(&mut self) {
        if let Some(mut ticker) = self.ticker.take() {
            ticker.stop();
        }
    }

    fn emit_transition(&self, version: Option<VersionId>, old_state: TransportState, new_state: TransportState) {
        debug!(version = ?version, %old_state, %new_state, "Transport state changed");
        self.events.broadcast_event(ClientEvent::TransportChanged {
            version,
            old_state,
            new_state,
            timestamp: pulsemix_common::time::now(),
        });
    }

    fn check_invariant(&self) {
        debug_assert!(
            self.active_key.is_some() || self.transport.state() == TransportState::Stopped,
            "transport must be stopped when no version is active"
        );
    }
}
