//! Clock-driven audio backend
//!
//! Stands in for a sound device: the position advances with wall-clock time
//! scaled by the playback rate, the duration comes from probing the payload,
//! and lifecycle callbacks go through the same notifier a real engine would
//! use. Nothing is rendered.

use super::probe::probe_duration;
use super::transport::{AudioBackend, EngineEvent, EngineNotifier, MediaSource, Sound};
use crate::error::{Error, Result};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct HeadlessBackend;

impl HeadlessBackend {
    pub fn new() -> Self {
        Self
    }
}

impl AudioBackend for HeadlessBackend {
    fn load(&mut self, source: MediaSource, notifier: EngineNotifier) -> Result<Box<dyn Sound>> {
        let duration = match &source {
            MediaSource::Memory(blob) => {
                if blob.is_empty() {
                    return Err(Error::Engine("empty audio payload".to_string()));
                }
                match probe_duration(blob) {
                    Ok(duration) => duration,
                    Err(e) => {
                        warn!(sound = %notifier.sound(), error = %e, "Could not probe duration, treating as unbounded");
                        0.0
                    }
                }
            }
            // Streams are not fetched; their length is unknown
            MediaSource::Url(url) => {
                debug!(sound = %notifier.sound(), url = %url, "Headless stream source");
                0.0
            }
        };

        notifier.notify(EngineEvent::Loaded { duration });
        Ok(Box::new(HeadlessSound {
            notifier,
            duration,
            base: 0.0,
            started: None,
            rate: 1.0,
            volume: 1.0,
            end_timer: None,
        }))
    }
}

/// One clock-driven instance; a zero duration never ends on its own
struct HeadlessSound {
    notifier: EngineNotifier,
    duration: f64,
    /// Position when the clock was last (re)based
    base: f64,
    /// Set while playing
    started: Option<Instant>,
    rate: f32,
    volume: f32,
    end_timer: Option<JoinHandle<()>>,
}

impl HeadlessSound {
    fn clamp(&self, seconds: f64) -> f64 {
        let seconds = seconds.max(0.0);
        if self.duration > 0.0 {
            seconds.min(self.duration)
        } else {
            seconds
        }
    }

    /// Fold elapsed time into `base` and restart the clock if playing
    fn rebase(&mut self) {
        self.base = self.position();
        if self.started.is_some() {
            self.started = Some(Instant::now());
        }
    }

    fn cancel_end_timer(&mut self) {
        if let Some(handle) = self.end_timer.take() {
            handle.abort();
        }
    }

    /// Wall-clock time until the end at the current rate
    ///
    /// `None` when the sound never ends: unknown duration, or a rate so small
    /// the remaining time does not fit a `Duration`.
    fn time_to_end(&self) -> Option<Duration> {
        if self.duration <= 0.0 || self.rate <= 0.0 {
            return None;
        }
        let remaining = (self.duration - self.base).max(0.0) / self.rate as f64;
        match Duration::try_from_secs_f64(remaining) {
            Ok(delay) => Some(delay),
            Err(e) => {
                warn!(sound = %self.notifier.sound(), rate = self.rate, error = %e, "End of track out of range, not arming timer");
                None
            }
        }
    }

    fn arm_end_timer(&mut self) {
        self.cancel_end_timer();
        let Some(delay) = self.time_to_end() else {
            return;
        };
        let notifier = self.notifier.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                self.end_timer = Some(handle.spawn(async move {
                    tokio::time::sleep(delay).await;
                    notifier.notify(EngineEvent::Ended);
                }));
            }
            Err(_) => warn!(sound = %self.notifier.sound(), "No runtime for end-of-track timer"),
        }
    }
}

impl Sound for HeadlessSound {
    fn play(&mut self) {
        if self.started.is_none() {
            if self.duration > 0.0 && self.base >= self.duration {
                self.base = 0.0;
            }
            self.started = Some(Instant::now());
            self.arm_end_timer();
        }
        self.notifier.notify(EngineEvent::Played);
    }

    fn pause(&mut self) {
        if self.started.is_some() {
            self.base = self.position();
            self.started = None;
            self.cancel_end_timer();
        }
        self.notifier.notify(EngineEvent::Paused);
    }

    fn stop(&mut self) {
        let was_playing = self.started.take().is_some();
        self.base = 0.0;
        self.cancel_end_timer();
        if was_playing {
            self.notifier.notify(EngineEvent::Stopped);
        }
    }

    fn seek(&mut self, seconds: f64) {
        self.base = self.clamp(seconds);
        if self.started.is_some() {
            self.started = Some(Instant::now());
            self.arm_end_timer();
        }
    }

    fn position(&self) -> f64 {
        match self.started {
            Some(started) => self.clamp(self.base + started.elapsed().as_secs_f64() * self.rate as f64),
            None => self.base,
        }
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn rate(&self) -> f32 {
        self.rate
    }

    fn set_rate(&mut self, rate: f32) {
        self.rebase();
        self.rate = rate;
        if self.started.is_some() {
            self.arm_end_timer();
        }
    }

    fn volume(&self) -> f32 {
        self.volume
    }

    fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }
}

impl Drop for HeadlessSound {
    fn drop(&mut self) {
        self.cancel_end_timer();
    }
}
