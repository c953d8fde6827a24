//! Mixing service access
//!
//! [`MixClient`] wraps the service's HTTP endpoints; [`AvailabilityMonitor`]
//! keeps a running view of whether the service answers.

pub mod client;
pub mod monitor;

pub use client::{track_url, CuePayload, MixClient, MixResponse};
pub use monitor::{Availability, AvailabilityMonitor};
