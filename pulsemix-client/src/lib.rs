//! # PulseMix Client Library
//!
//! Client for a remote heartbeat-mixing service: submits a generation request,
//! consumes the streamed per-version results, plays and navigates the
//! generated versions, previews background tracks, and saves tempo-adjusted or
//! downloaded files.
//!
//! **Architecture:** single-threaded and event driven. A [`session::Session`]
//! owns all state; network waits, engine callbacks and timers reach it as
//! messages.

pub mod api;
pub mod archive;
pub mod command;
pub mod error;
pub mod job;
pub mod playback;
pub mod save;
pub mod session;
pub mod state;
pub mod store;
pub mod tempo;

pub use error::{Error, Result};
pub use state::EventBus;
pub use store::{ArtifactStore, AudioBlob, SlotState};
