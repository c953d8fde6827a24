//! Artifact store
//!
//! Fixed table of version slots, each holding at most one audio payload and a
//! readiness state. A slot moves out of `Pending` exactly once per session,
//! either to `Ready` (with payload) or to `Failed`. Ordered queries follow slot
//! declaration order so navigation is deterministic regardless of arrival order.

use bytes::Bytes;
use pulsemix_common::{VersionId, SLOT_COUNT};
use serde::Serialize;
use tracing::{debug, warn};

/// Binary audio payload with its declared media type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBlob {
    pub bytes: Bytes,
    pub media_type: String,
}

impl AudioBlob {
    pub fn new(bytes: impl Into<Bytes>, media_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            media_type: media_type.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Readiness of one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotState {
    Pending,
    Ready,
    Failed,
}

impl std::fmt::Display for SlotState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotState::Pending => write!(f, "PENDING"),
            SlotState::Ready => write!(f, "READY"),
            SlotState::Failed => write!(f, "FAILED"),
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    state: SlotState,
    payload: Option<AudioBlob>,
}

impl Slot {
    fn empty() -> Self {
        Self {
            state: SlotState::Pending,
            payload: None,
        }
    }
}

/// Keyed table of generated artifacts for one session
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    slots: [Slot; SLOT_COUNT],
}

impl ArtifactStore {
    /// Create a store with every slot pending
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Slot::empty()),
        }
    }

    /// Return every slot to pending and drop all payloads
    pub fn reset(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = Slot::empty();
        }
    }

    /// Store a payload and mark the slot ready
    ///
    /// Returns `false` (and keeps the existing value) if the slot has already
    /// been settled this session.
    pub fn put(&mut self, key: VersionId, payload: AudioBlob) -> bool {
        let slot = &mut self.slots[key.index()];
        if slot.state != SlotState::Pending {
            warn!(
                version = %key,
                state = %slot.state,
                "Ignoring second write to an already settled slot"
            );
            return false;
        }
        debug!(version = %key, bytes = payload.len(), "Artifact stored");
        slot.payload = Some(payload);
        slot.state = SlotState::Ready;
        true
    }

    /// Mark a pending slot as failed
    ///
    /// Returns `false` if the slot was already settled.
    pub fn mark_failed(&mut self, key: VersionId) -> bool {
        let slot = &mut self.slots[key.index()];
        if slot.state != SlotState::Pending {
            warn!(
                version = %key,
                state = %slot.state,
                "Ignoring failure report for an already settled slot"
            );
            return false;
        }
        slot.state = SlotState::Failed;
        true
    }

    /// Payload for `key`, if ready
    pub fn get(&self, key: VersionId) -> Option<&AudioBlob> {
        self.slots[key.index()].payload.as_ref()
    }

    pub fn state(&self, key: VersionId) -> SlotState {
        self.slots[key.index()].state
    }

    pub fn is_ready(&self, key: VersionId) -> bool {
        self.state(key) == SlotState::Ready
    }

    /// Ready slots in declaration order
    pub fn ready_keys(&self) -> Vec<VersionId> {
        self.keys_in(SlotState::Ready)
    }

    /// Failed slots in declaration order
    pub fn failed_keys(&self) -> Vec<VersionId> {
        self.keys_in(SlotState::Failed)
    }

    /// Slots never settled, in declaration order
    pub fn pending_keys(&self) -> Vec<VersionId> {
        self.keys_in(SlotState::Pending)
    }

    /// Mark every still-pending slot failed, returning the affected keys
    pub fn fail_pending(&mut self) -> Vec<VersionId> {
        let pending = self.pending_keys();
        for key in &pending {
            self.slots[key.index()].state = SlotState::Failed;
        }
        pending
    }

    fn keys_in(&self, state: SlotState) -> Vec<VersionId> {
        VersionId::ALL
            .iter()
            .copied()
            .filter(|k| self.state(*k) == state)
            .collect()
    }
}

impl Default for ArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(data: &[u8]) -> AudioBlob {
        AudioBlob::new(data.to_vec(), "audio/mpeg")
    }

    #[test]
    fn test_new_store_is_all_pending() {
        let store = ArtifactStore::new();
        assert_eq!(store.pending_keys(), VersionId::ALL.to_vec());
        assert!(store.ready_keys().is_empty());
    }

    #[test]
    fn test_put_then_get_returns_identical_bytes() {
        let mut store = ArtifactStore::new();
        let payload: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        assert!(store.put(VersionId::V2, blob(&payload)));

        let got = store.get(VersionId::V2).unwrap();
        assert_eq!(got.bytes.as_ref(), payload.as_slice());
        assert_eq!(got.media_type, "audio/mpeg");
        assert!(store.is_ready(VersionId::V2));
    }

    #[test]
    fn test_second_write_keeps_first_value() {
        let mut store = ArtifactStore::new();
        assert!(store.put(VersionId::V1, blob(b"first")));
        assert!(!store.put(VersionId::V1, blob(b"second")));
        assert!(!store.mark_failed(VersionId::V1));

        assert_eq!(store.get(VersionId::V1).unwrap().bytes.as_ref(), b"first");
        assert_eq!(store.state(VersionId::V1), SlotState::Ready);
    }

    #[test]
    fn test_failed_slot_cannot_become_ready() {
        let mut store = ArtifactStore::new();
        assert!(store.mark_failed(VersionId::V3));
        assert!(!store.put(VersionId::V3, blob(b"late")));
        assert!(store.get(VersionId::V3).is_none());
    }

    #[test]
    fn test_ready_keys_follow_declaration_order() {
        let mut store = ArtifactStore::new();
        store.put(VersionId::V4, blob(b"4"));
        store.put(VersionId::V1, blob(b"1"));
        store.put(VersionId::V3, blob(b"3"));

        assert_eq!(
            store.ready_keys(),
            vec![VersionId::V1, VersionId::V3, VersionId::V4]
        );
    }

    #[test]
    fn test_reset_clears_payloads() {
        let mut store = ArtifactStore::new();
        store.put(VersionId::V1, blob(b"1"));
        store.mark_failed(VersionId::V2);
        store.reset();

        assert_eq!(store.pending_keys().len(), SLOT_COUNT);
        assert!(store.get(VersionId::V1).is_none());
    }

    #[test]
    fn test_fail_pending_only_touches_pending() {
        let mut store = ArtifactStore::new();
        store.put(VersionId::V2, blob(b"2"));
        let failed = store.fail_pending();

        assert_eq!(failed, vec![VersionId::V1, VersionId::V3, VersionId::V4]);
        assert!(store.is_ready(VersionId::V2));
    }
}
