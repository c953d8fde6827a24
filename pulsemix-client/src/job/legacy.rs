//! Single-archive `/mix-all` responses
//!
//! Older servers answer a generation request with one archive holding
//! `{version}_mixed.{ext}` entries instead of a record stream. Every slot is
//! settled at once: present entries become ready, missing ones fail.

use super::{JobSummary, JobUpdate};
use crate::archive::{find_entry, ArchiveCodec};
use crate::error::Error;
use crate::store::{ArtifactStore, AudioBlob};
use pulsemix_common::{VersionId, SLOT_COUNT};
use tracing::{info, warn};

/// Archive entry name for one slot
pub fn entry_name(version: VersionId, extension: &str) -> String {
    format!("{}_mixed.{}", version, extension)
}

/// Whether a response content type denotes the archive variant
pub fn is_archive_content_type(content_type: Option<&str>) -> bool {
    match content_type {
        Some(ct) => {
            let ct = ct.to_ascii_lowercase();
            ct.contains("zip") || ct.starts_with("application/octet-stream")
        }
        None => false,
    }
}

/// Unpack an archive response into the store
pub fn apply_archive(
    body: &[u8],
    codec: &dyn ArchiveCodec,
    store: &mut ArtifactStore,
    extension: &str,
    media_type: &str,
) -> (Vec<JobUpdate>, JobSummary) {
    let mut updates = Vec::new();

    let entries = match codec.unpack(body) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "Could not unpack mix archive, failing every slot");
            for version in store.fail_pending() {
                updates.push(JobUpdate::SlotFailed {
                    version,
                    reason: e.to_string(),
                });
            }
            return (updates, JobSummary::from_store(store, None));
        }
    };

    let mut done = 0u32;
    for version in VersionId::ALL {
        let name = entry_name(version, extension);
        match find_entry(&entries, &name) {
            Some(entry) => {
                if store.put(version, AudioBlob::new(entry.data.clone(), media_type)) {
                    done += 1;
                    updates.push(JobUpdate::SlotReady {
                        version,
                        done,
                        total: SLOT_COUNT as u32,
                        eta: None,
                    });
                }
            }
            None => {
                let missing = Error::ArchiveEntryMissing(name);
                warn!(version = %version, error = %missing, "Version missing from archive");
                if store.mark_failed(version) {
                    updates.push(JobUpdate::SlotFailed {
                        version,
                        reason: missing.to_string(),
                    });
                }
            }
        }
    }

    info!(ready = done, entries = entries.len(), "Mix archive unpacked");
    (updates, JobSummary::from_store(store, None))
}
