//! Scripted audio engine
//!
//! Records every call and, unless told otherwise, confirms play, pause and
//! stop through the notifier the way a real engine would.

use pulsemix_client::error::{Error, Result};
use pulsemix_client::playback::{AudioBackend, EngineEvent, EngineNotifier, MediaSource, Sound, SoundId};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Load { sound: SoundId, source: String },
    Play(SoundId),
    Pause(SoundId),
    Stop(SoundId),
    Seek(SoundId, f64),
    SetRate(SoundId, f32),
    SetVolume(SoundId, f32),
}

#[derive(Debug)]
struct Shared {
    calls: Vec<Call>,
    position: f64,
    duration: f64,
    auto_confirm: bool,
    fail_load: Option<String>,
    fail_play: Option<String>,
    latest: Option<EngineNotifier>,
}

/// Test-side view of a [`MockBackend`]
#[derive(Debug, Clone)]
pub struct MockHandle {
    shared: Arc<Mutex<Shared>>,
}

impl MockHandle {
    pub fn calls(&self) -> Vec<Call> {
        self.shared.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.shared.lock().unwrap().calls.clear();
    }

    pub fn loads(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Load { .. }))
            .count()
    }

    /// Position every live sound reports
    pub fn set_position(&self, seconds: f64) {
        self.shared.lock().unwrap().position = seconds;
    }

    pub fn set_auto_confirm(&self, enabled: bool) {
        self.shared.lock().unwrap().auto_confirm = enabled;
    }

    pub fn fail_next_load(&self, reason: &str) {
        self.shared.lock().unwrap().fail_load = Some(reason.to_string());
    }

    pub fn fail_next_play(&self, reason: &str) {
        self.shared.lock().unwrap().fail_play = Some(reason.to_string());
    }

    /// Report `event` from the most recently loaded sound
    pub fn emit(&self, event: EngineEvent) {
        let notifier = self.shared.lock().unwrap().latest.clone();
        if let Some(notifier) = notifier {
            notifier.notify(event);
        }
    }

    pub fn plays(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Play(_))).count()
    }
}

pub struct MockBackend {
    shared: Arc<Mutex<Shared>>,
}

impl MockBackend {
    /// Backend whose sounds last `duration` seconds
    pub fn new(duration: f64) -> (Self, MockHandle) {
        let shared = Arc::new(Mutex::new(Shared {
            calls: Vec::new(),
            position: 0.0,
            duration,
            auto_confirm: true,
            fail_load: None,
            fail_play: None,
            latest: None,
        }));
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MockHandle { shared },
        )
    }
}

impl AudioBackend for MockBackend {
    fn load(&mut self, source: MediaSource, notifier: EngineNotifier) -> Result<Box<dyn Sound>> {
        let mut shared = self.shared.lock().unwrap();
        let source = match source {
            MediaSource::Memory(blob) => format!("memory:{}", blob.len()),
            MediaSource::Url(url) => url,
        };
        shared.calls.push(Call::Load {
            sound: notifier.sound(),
            source,
        });
        if let Some(reason) = shared.fail_load.take() {
            return Err(Error::Engine(reason));
        }
        notifier.notify(EngineEvent::Loaded {
            duration: shared.duration,
        });
        shared.latest = Some(notifier.clone());
        Ok(Box::new(MockSound {
            shared: Arc::clone(&self.shared),
            notifier,
            rate: 1.0,
            volume: 1.0,
        }))
    }
}

struct MockSound {
    shared: Arc<Mutex<Shared>>,
    notifier: EngineNotifier,
    rate: f32,
    volume: f32,
}

impl MockSound {
    fn record(&self, call: Call) -> bool {
        let mut shared = self.shared.lock().unwrap();
        shared.calls.push(call);
        shared.auto_confirm
    }
}

impl Sound for MockSound {
    fn play(&mut self) {
        let confirm = self.record(Call::Play(self.notifier.sound()));
        let failure = self.shared.lock().unwrap().fail_play.take();
        match failure {
            Some(reason) => self.notifier.notify(EngineEvent::PlayFailed(reason)),
            None if confirm => self.notifier.notify(EngineEvent::Played),
            None => {}
        }
    }

    fn pause(&mut self) {
        if self.record(Call::Pause(self.notifier.sound())) {
            self.notifier.notify(EngineEvent::Paused);
        }
    }

    fn stop(&mut self) {
        if self.record(Call::Stop(self.notifier.sound())) {
            self.notifier.notify(EngineEvent::Stopped);
        }
    }

    fn seek(&mut self, seconds: f64) {
        self.record(Call::Seek(self.notifier.sound(), seconds));
        self.shared.lock().unwrap().position = seconds;
    }

    fn position(&self) -> f64 {
        self.shared.lock().unwrap().position
    }

    fn duration(&self) -> f64 {
        self.shared.lock().unwrap().duration
    }

    fn rate(&self) -> f32 {
        self.rate
    }

    fn set_rate(&mut self, rate: f32) {
        self.record(Call::SetRate(self.notifier.sound(), rate));
        self.rate = rate;
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.record(Call::SetVolume(self.notifier.sound(), volume));
        self.volume = volume;
    }
}
