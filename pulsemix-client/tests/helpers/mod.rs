//! Test helper modules for PulseMix client integration tests
//!
//! Provides reusable test infrastructure components:
//! - MockBackend: scripted audio engine that records every call
//! - TestServer: axum stand-in for the mixing service
//! - build_zip: in-memory zip archives

#![allow(dead_code)]

pub mod mock_backend;
pub mod test_server;
pub mod zip;

pub use mock_backend::{Call, MockBackend, MockHandle};
pub use test_server::{MixBehavior, RecordedRequest, TestServer};
pub use zip::build_zip;

use pulsemix_client::playback::EngineMessage;
use tokio::sync::mpsc;

/// Drain every queued engine callback into `handle`
pub fn pump<F: FnMut(EngineMessage)>(rx: &mut mpsc::UnboundedReceiver<EngineMessage>, mut handle: F) -> usize {
    let mut count = 0;
    while let Ok(message) = rx.try_recv() {
        handle(message);
        count += 1;
    }
    count
}

/// One NDJSON line reporting a finished version
pub fn done_line(version: &str, done: u32, payload: &[u8]) -> String {
    use base64::Engine;
    format!(
        "{{\"version\":\"{}\",\"status\":\"done\",\"progress\":\"{}/4\",\"data\":\"{}\"}}\n",
        version,
        done,
        base64::engine::general_purpose::STANDARD.encode(payload)
    )
}

/// One NDJSON line reporting a failed version
pub fn failed_line(version: &str, reason: &str) -> String {
    format!(
        "{{\"version\":\"{}\",\"status\":\"failed\",\"reason\":\"{}\"}}\n",
        version, reason
    )
}
