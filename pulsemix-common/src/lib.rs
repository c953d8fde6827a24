//! # PulseMix Common Library
//!
//! Shared code for the PulseMix crates including:
//! - Version slot identifiers and skip directions
//! - Client event types
//! - Configuration loading
//! - Time formatting helpers

pub mod config;
pub mod error;
pub mod events;
pub mod time;
pub mod version;

pub use error::{Error, Result};
pub use events::{ClientEvent, NoticeLevel, TransportState};
pub use version::{Direction, VersionId, SLOT_COUNT};
