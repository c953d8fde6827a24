//! Cancellable timers
//!
//! [`Ticker`] delivers a message on a fixed period; [`Deadline`] delivers one
//! message after a delay. Both post into the session's channels instead of
//! calling back into controllers, and both stop when dropped.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};

/// Periodic message source
#[derive(Debug)]
pub struct Ticker {
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Start ticking; the first message arrives one period from now
    pub fn start<T>(period: Duration, tx: mpsc::UnboundedSender<T>, message: T) -> Self
    where
        T: Clone + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if tx.send(message.clone()).is_err() {
                    break;
                }
            }
        });
        Self {
            handle: Some(handle),
        }
    }

    /// Stop ticking; safe to call repeatedly
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One-shot message source
#[derive(Debug)]
pub struct Deadline {
    handle: Option<JoinHandle<()>>,
}

impl Deadline {
    pub fn start<T>(after: Duration, tx: mpsc::UnboundedSender<T>, message: T) -> Self
    where
        T: Send + 'static,
    {
        let handle = tokio::spawn(async move {
            sleep(after).await;
            let _ = tx.send(message);
        });
        Self {
            handle: Some(handle),
        }
    }

    /// Cancel before it fires; safe to call repeatedly
    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    pub fn is_armed(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }
}

impl Drop for Deadline {
    fn drop(&mut self) {
        self.cancel();
    }
}
