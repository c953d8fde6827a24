//! Streaming job consumer
//!
//! Turns the chunked `/mix-all` response body into per-slot outcomes.
//!
//! Bytes are accumulated in one buffer and split on `\n`. Every fragment but
//! the last is a complete line; the last is kept for the next read. Lines are
//! decoded as UTF-8 only once complete, so a chunk boundary may fall anywhere,
//! including inside a multi-byte character. Malformed lines are logged and
//! dropped without ending the stream.

use super::progress::{eta_secs, JobProgress};
use super::record::{parse_record, JobRecord};
use super::{JobSummary, JobUpdate};
use crate::error::Error;
use crate::store::{ArtifactStore, AudioBlob};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use pulsemix_common::SLOT_COUNT;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Incremental newline-delimited record decoder
#[derive(Debug, Default)]
pub struct RecordDecoder {
    buffer: Vec<u8>,
    // Prefix of `buffer` already known to hold no newline
    scanned: usize,
}

impl RecordDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every record completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<JobRecord> {
        self.buffer.extend_from_slice(chunk);

        let mut records = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = self.buffer[from..].iter().position(|b| *b == b'\n') {
            let end = from + offset;
            if let Some(record) = decode_line(&self.buffer[start..end]) {
                records.push(record);
            }
            start = end + 1;
            from = start;
        }
        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        records
    }

    /// Decode whatever is left after the stream ended
    ///
    /// The trailing fragment is parsed once; if it is incomplete it is dropped.
    pub fn finish(&mut self) -> Option<JobRecord> {
        let rest = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        decode_line(&rest)
    }

    /// Bytes currently held back waiting for a newline
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }
}

fn decode_line(raw: &[u8]) -> Option<JobRecord> {
    let text = match std::str::from_utf8(raw) {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, bytes = raw.len(), "Discarding job record with invalid UTF-8");
            return None;
        }
    };
    let line = text.trim();
    if line.is_empty() {
        return None;
    }
    match parse_record(line) {
        Ok(record) => Some(record),
        Err(e) => {
            warn!(error = %e, "Discarding malformed job record");
            None
        }
    }
}

/// Applies decoded records to an [`ArtifactStore`] and tracks progress
#[derive(Debug)]
pub struct StreamingJobConsumer {
    decoder: RecordDecoder,
    progress: JobProgress,
    default_media_type: String,
    outcomes_seen: usize,
}

impl StreamingJobConsumer {
    /// Start consuming a fresh job; progress starts at `started_at`
    pub fn new(default_media_type: impl Into<String>, started_at: Instant) -> Self {
        Self {
            decoder: RecordDecoder::new(),
            progress: JobProgress::new(SLOT_COUNT as u32, started_at),
            default_media_type: default_media_type.into(),
            outcomes_seen: 0,
        }
    }

    pub fn progress(&self) -> &JobProgress {
        &self.progress
    }

    /// Feed one chunk of the response body
    pub fn feed(&mut self, chunk: &[u8], store: &mut ArtifactStore, now: Instant) -> Vec<JobUpdate> {
        let records = self.decoder.push(chunk);
        let mut updates = Vec::with_capacity(records.len());
        for record in records {
            if let Some(update) = self.apply(record, store, now) {
                updates.push(update);
            }
        }
        updates
    }

    /// Flush the trailing fragment and summarise the store
    pub fn finish(
        &mut self,
        store: &mut ArtifactStore,
        now: Instant,
        read_error: Option<String>,
    ) -> (Vec<JobUpdate>, JobSummary) {
        let mut updates = Vec::new();
        if self.decoder.pending_len() > 0 {
            debug!(bytes = self.decoder.pending_len(), "Flushing unterminated job record");
        }
        if let Some(record) = self.decoder.finish() {
            if let Some(update) = self.apply(record, store, now) {
                updates.push(update);
            }
        }

        let summary = JobSummary::from_store(store, read_error);
        if !summary.pending.is_empty() {
            warn!(pending = ?summary.pending, "Job stream ended before every slot reported");
        }
        info!(
            ready = summary.ready.len(),
            failed = summary.failed.len(),
            pending = summary.pending.len(),
            "Job stream finished"
        );
        (updates, summary)
    }

    /// Drive a whole byte stream to completion
    ///
    /// A read error ends consumption early; slots not yet reported stay pending.
    pub async fn consume<S, E>(
        &mut self,
        mut stream: S,
        store: &mut ArtifactStore,
        mut on_update: impl FnMut(&JobUpdate),
    ) -> JobSummary
    where
        S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
        E: std::fmt::Display,
    {
        let mut read_error = None;
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => {
                    for update in self.feed(&chunk, store, Instant::now()) {
                        on_update(&update);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Job stream read failed, ending consumption");
                    read_error = Some(e.to_string());
                    break;
                }
            }
        }

        let (updates, summary) = self.finish(store, Instant::now(), read_error);
        for update in &updates {
            on_update(update);
        }
        summary
    }

    fn apply(&mut self, record: JobRecord, store: &mut ArtifactStore, now: Instant) -> Option<JobUpdate> {
        if !matches!(record, JobRecord::Interim { .. }) {
            self.outcomes_seen += 1;
            if self.outcomes_seen > SLOT_COUNT {
                warn!(
                    seen = self.outcomes_seen,
                    slots = SLOT_COUNT,
                    version = %record.version(),
                    "Job stream sent more outcomes than there are slots"
                );
            }
        }

        match record {
            JobRecord::Done {
                version,
                progress,
                payload,
                media_type,
            } => {
                let media_type = media_type.unwrap_or_else(|| self.default_media_type.clone());
                if !store.put(version, AudioBlob::new(payload, media_type)) {
                    return None;
                }
                let done = self.progress.record_done();
                if let Some(mark) = progress {
                    if mark.done != done {
                        debug!(
                            version = %version,
                            reported = mark.done,
                            counted = done,
                            "Server progress differs from local count"
                        );
                    }
                }
                let eta = self.progress.eta_at(now);
                info!(
                    version = %version,
                    done,
                    total = self.progress.total(),
                    eta_secs = ?eta.map(eta_secs),
                    "Version ready"
                );
                Some(JobUpdate::SlotReady {
                    version,
                    done,
                    total: self.progress.total(),
                    eta,
                })
            }
            JobRecord::Failed { version, reason } => {
                if !store.mark_failed(version) {
                    return None;
                }
                let reason = reason.unwrap_or_else(|| Error::SlotFailed(version).to_string());
                warn!(version = %version, reason = %reason, "Version failed");
                Some(JobUpdate::SlotFailed { version, reason })
            }
            JobRecord::Interim {
                version,
                status,
                progress,
            } => {
                debug!(version = %version, status = %status, progress = ?progress, "Interim job status");
                None
            }
        }
    }
}
