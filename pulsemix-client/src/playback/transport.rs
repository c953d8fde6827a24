//! Transport lifecycle shared by main playback and preview
//!
//! The audio engine is reached through [`AudioBackend`] and [`Sound`]. Engine
//! lifecycle callbacks never touch controller state directly: they arrive as
//! [`EngineMessage`]s tagged with the [`SoundId`] of the instance that produced
//! them and are fed through [`transition`]. Messages from a released instance
//! are recognised as stale and dropped.

use crate::error::Result;
use crate::store::AudioBlob;
use pulsemix_common::TransportState;
use tokio::sync::mpsc;
use tracing::debug;

/// Identity of one engine instance within a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SoundId(pub u64);

impl std::fmt::Display for SoundId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sound#{}", self.0)
    }
}

/// What an engine instance is bound to
#[derive(Debug, Clone)]
pub enum MediaSource {
    /// In-memory artifact
    Memory(AudioBlob),
    /// Server-hosted stream
    Url(String),
}

/// Lifecycle callbacks reported by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Loaded { duration: f64 },
    Played,
    Paused,
    Stopped,
    Ended,
    LoadFailed(String),
    PlayFailed(String),
}

/// Engine callback addressed to one instance
#[derive(Debug, Clone, PartialEq)]
pub struct EngineMessage {
    pub sound: SoundId,
    pub event: EngineEvent,
}

/// Handle an engine instance uses to report its callbacks
#[derive(Debug, Clone)]
pub struct EngineNotifier {
    sound: SoundId,
    tx: mpsc::UnboundedSender<EngineMessage>,
}

impl EngineNotifier {
    pub fn new(sound: SoundId, tx: mpsc::UnboundedSender<EngineMessage>) -> Self {
        Self { sound, tx }
    }

    pub fn sound(&self) -> SoundId {
        self.sound
    }

    /// Deliver a callback; a closed channel means the session is gone
    pub fn notify(&self, event: EngineEvent) {
        let _ = self.tx.send(EngineMessage {
            sound: self.sound,
            event,
        });
    }
}

/// One loaded engine instance
///
/// Commands are fire-and-forget; the engine confirms them through its
/// notifier. Positions and durations are in seconds.
pub trait Sound: Send {
    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    fn seek(&mut self, seconds: f64);
    fn position(&self) -> f64;
    fn duration(&self) -> f64;
    fn rate(&self) -> f32;
    fn set_rate(&mut self, rate: f32);
    fn volume(&self) -> f32;
    fn set_volume(&mut self, volume: f32);
}

/// Factory for engine instances
pub trait AudioBackend: Send {
    fn load(&mut self, source: MediaSource, notifier: EngineNotifier) -> Result<Box<dyn Sound>>;
}

/// Input to the transport state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportInput {
    Played,
    Paused,
    Stopped,
    Ended,
    Failed,
}

impl TransportInput {
    /// Map an engine callback onto a state machine input
    pub fn from_event(event: &EngineEvent) -> Option<Self> {
        match event {
            EngineEvent::Loaded { .. } => None,
            EngineEvent::Played => Some(TransportInput::Played),
            EngineEvent::Paused => Some(TransportInput::Paused),
            EngineEvent::Stopped => Some(TransportInput::Stopped),
            EngineEvent::Ended => Some(TransportInput::Ended),
            EngineEvent::LoadFailed(_) | EngineEvent::PlayFailed(_) => Some(TransportInput::Failed),
        }
    }
}

/// Transition table; `None` means the input does not change the state
pub fn transition(state: TransportState, input: TransportInput) -> Option<TransportState> {
    use TransportInput as I;
    use TransportState as S;

    match (state, input) {
        (S::Stopped, I::Played) | (S::Paused, I::Played) => Some(S::Playing),
        (S::Playing, I::Paused) => Some(S::Paused),
        (S::Playing, I::Stopped | I::Ended | I::Failed) => Some(S::Stopped),
        (S::Paused, I::Stopped | I::Ended | I::Failed) => Some(S::Stopped),
        _ => None,
    }
}

/// One transport session: at most one live engine instance plus display state
pub struct Transport {
    sound: Option<(SoundId, Box<dyn Sound>)>,
    next_id: u64,
    state: TransportState,
    position: f64,
    duration: f64,
    rate: f32,
    volume: f32,
    events_tx: mpsc::UnboundedSender<EngineMessage>,
}

impl Transport {
    pub fn new(events_tx: mpsc::UnboundedSender<EngineMessage>, rate: f32, volume: f32) -> Self {
        Self {
            sound: None,
            next_id: 0,
            state: TransportState::Stopped,
            position: 0.0,
            duration: 0.0,
            rate,
            volume: volume.clamp(0.0, 1.0),
            events_tx,
        }
    }

    /// Release any current instance and load a new one
    ///
    /// Display position and duration restart from zero; the stored rate and
    /// volume are applied to the new instance.
    pub fn load(&mut self, backend: &mut dyn AudioBackend, source: MediaSource) -> Result<SoundId> {
        self.teardown();

        self.next_id += 1;
        let id = SoundId(self.next_id);
        let notifier = EngineNotifier::new(id, self.events_tx.clone());
        let mut sound = backend.load(source, notifier)?;
        sound.set_rate(self.rate);
        sound.set_volume(self.volume);

        self.position = 0.0;
        self.duration = 0.0;
        self.sound = Some((id, sound));
        debug!(sound = %id, "Engine instance created");
        Ok(id)
    }

    /// Stop and release the current instance; returns whether one existed
    pub fn teardown(&mut self) -> bool {
        self.state = TransportState::Stopped;
        match self.sound.take() {
            Some((id, mut sound)) => {
                sound.stop();
                debug!(sound = %id, "Engine instance released");
                true
            }
            None => false,
        }
    }

    /// Feed an input through the transition table
    ///
    /// Returns `(old, new)` when the state changed.
    pub fn apply(&mut self, input: TransportInput) -> Option<(TransportState, TransportState)> {
        let old = self.state;
        let new = transition(old, input)?;
        self.state = new;
        Some((old, new))
    }

    pub fn is_current(&self, id: SoundId) -> bool {
        matches!(self.sound, Some((current, _)) if current == id)
    }

    pub fn has_sound(&self) -> bool {
        self.sound.is_some()
    }

    pub fn sound_mut(&mut self) -> Option<&mut Box<dyn Sound>> {
        self.sound.as_mut().map(|(_, sound)| sound)
    }

    pub fn sound(&self) -> Option<&dyn Sound> {
        self.sound.as_ref().map(|(_, sound)| sound.as_ref())
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn set_position(&mut self, seconds: f64) {
        self.position = seconds.max(0.0);
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn set_duration(&mut self, seconds: f64) {
        if seconds.is_finite() && seconds >= 0.0 {
            self.duration = seconds;
        }
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    /// Store the rate and apply it to a live instance
    pub fn set_rate(&mut self, rate: f32) {
        self.rate = rate;
        if let Some(sound) = self.sound_mut() {
            sound.set_rate(rate);
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Store the volume (clamped to 0.0-1.0) and apply it to a live instance
    pub fn set_volume(&mut self, volume: f32) -> f32 {
        let volume = volume.clamp(0.0, 1.0);
        self.volume = volume;
        if let Some(sound) = self.sound_mut() {
            sound.set_volume(volume);
        }
        volume
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.teardown();
    }
}
