//! Generation jobs
//!
//! A generation request streams its outcome back slot by slot. This module
//! decodes that stream ([`consumer`]), the older single-archive response
//! ([`legacy`]), and tracks completion ([`progress`]).
//!
//! Only one job may run at a time; [`GenerationGuard`] rejects re-entrant
//! requests instead of letting two streams write into the same store.

pub mod consumer;
pub mod legacy;
pub mod progress;
pub mod record;

pub use consumer::{RecordDecoder, StreamingJobConsumer};
pub use progress::JobProgress;
pub use record::{JobRecord, ProgressMark};

use crate::error::{Error, Result};
use crate::store::ArtifactStore;
use pulsemix_common::VersionId;
use std::time::Duration;
use uuid::Uuid;

/// Per-slot outcome produced while a job is consumed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobUpdate {
    SlotReady {
        version: VersionId,
        done: u32,
        total: u32,
        eta: Option<Duration>,
    },
    SlotFailed {
        version: VersionId,
        reason: String,
    },
}

/// Final state of the store once a job ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSummary {
    pub ready: Vec<VersionId>,
    pub failed: Vec<VersionId>,
    /// Slots never reported; unavailable for playback and navigation
    pub pending: Vec<VersionId>,
    /// Transport error that ended the stream early, if any
    pub read_error: Option<String>,
}

impl JobSummary {
    pub fn from_store(store: &ArtifactStore, read_error: Option<String>) -> Self {
        Self {
            ready: store.ready_keys(),
            failed: store.failed_keys(),
            pending: store.pending_keys(),
            read_error,
        }
    }

    /// Whether the stream ended before every slot reported
    pub fn is_truncated(&self) -> bool {
        !self.pending.is_empty()
    }

    /// `StreamTruncated` when slots were left pending
    pub fn check_complete(&self) -> Result<()> {
        if self.is_truncated() {
            return Err(Error::StreamTruncated {
                pending: self.pending.clone(),
            });
        }
        Ok(())
    }
}

/// Rejects a second generation request while one is in flight
#[derive(Debug, Default)]
pub struct GenerationGuard {
    active: Option<Uuid>,
}

impl GenerationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the guard for a new job
    pub fn try_begin(&mut self) -> Result<Uuid> {
        if let Some(job_id) = self.active {
            return Err(Error::precondition(format!(
                "A generation request is already in progress (job {})",
                job_id
            )));
        }
        let job_id = Uuid::new_v4();
        self.active = Some(job_id);
        Ok(job_id)
    }

    /// Release the guard; stale ids are ignored
    pub fn finish(&mut self, job_id: Uuid) -> bool {
        if self.active == Some(job_id) {
            self.active = None;
            true
        } else {
            false
        }
    }

    pub fn active(&self) -> Option<Uuid> {
        self.active
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }
}
