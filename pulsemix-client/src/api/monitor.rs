//! Server availability monitor
//!
//! Probes the health endpoint on a fixed interval and publishes the result on
//! a watch channel. Only transitions are logged and broadcast.

use super::client::MixClient;
use crate::state::EventBus;
use pulsemix_common::ClientEvent;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Last known state of the mixing service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    /// No probe has completed yet
    Unknown,
    Available,
    Unavailable,
}

impl Availability {
    /// Generation is refused only when the server is known to be down
    pub fn allows_generation(&self) -> bool {
        !matches!(self, Availability::Unavailable)
    }
}

impl std::fmt::Display for Availability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Availability::Unknown => write!(f, "unknown"),
            Availability::Available => write!(f, "ready"),
            Availability::Unavailable => write!(f, "sleeping"),
        }
    }
}

/// Background health probe loop
#[derive(Debug)]
pub struct AvailabilityMonitor {
    status_rx: watch::Receiver<Availability>,
    handle: JoinHandle<()>,
}

impl AvailabilityMonitor {
    /// Start probing; the first probe runs immediately
    pub fn spawn(client: MixClient, interval: Duration, events: EventBus) -> Self {
        let (status_tx, status_rx) = watch::channel(Availability::Unknown);
        let handle = tokio::spawn(async move {
            loop {
                let next = if client.health().await {
                    Availability::Available
                } else {
                    Availability::Unavailable
                };
                let previous = status_tx.send_replace(next);
                if previous != next {
                    match next {
                        Availability::Available => info!(server = %client.base_url(), "Mixing service available"),
                        _ => warn!(server = %client.base_url(), "Mixing service unavailable"),
                    }
                    events.broadcast_event(ClientEvent::AvailabilityChanged {
                        available: next == Availability::Available,
                        timestamp: pulsemix_common::time::now(),
                    });
                }
                // Re-poll after each probe regardless of outcome
                tokio::time::sleep(interval).await;
            }
        });
        Self { status_rx, handle }
    }

    pub fn current(&self) -> Availability {
        *self.status_rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Availability> {
        self.status_rx.clone()
    }
}

impl Drop for AvailabilityMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
