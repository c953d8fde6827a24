//! Job progress and linear ETA

use std::time::{Duration, Instant};

/// Completion counter for one generation request
///
/// `done` only grows. The ETA is always derived from the current `done`
/// count so it reflects overall throughput, not the slot that just finished.
#[derive(Debug, Clone)]
pub struct JobProgress {
    done: u32,
    total: u32,
    started_at: Instant,
}

impl JobProgress {
    pub fn new(total: u32, started_at: Instant) -> Self {
        Self {
            done: 0,
            total,
            started_at,
        }
    }

    pub fn done(&self) -> u32 {
        self.done
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    /// Count one more completed slot (saturates at `total`)
    pub fn record_done(&mut self) -> u32 {
        if self.done < self.total {
            self.done += 1;
        }
        self.done
    }

    /// Estimated time remaining as seen at `now`
    pub fn eta_at(&self, now: Instant) -> Option<Duration> {
        linear_eta(
            now.saturating_duration_since(self.started_at),
            self.done,
            self.total,
        )
    }
}

/// `(elapsed / done) * (total - done)`; `None` until something completed
pub fn linear_eta(elapsed: Duration, done: u32, total: u32) -> Option<Duration> {
    if done == 0 {
        return None;
    }
    let remaining = total.saturating_sub(done);
    Some(elapsed.div_f64(done as f64).mul_f64(remaining as f64))
}

/// ETA rounded to whole seconds
pub fn eta_secs(eta: Duration) -> u64 {
    eta.as_secs_f64().round() as u64
}
