//! Event types for the PulseMix client
//!
//! Every user-visible state change is reported as a [`ClientEvent`]. The front
//! end prints them as text, or as one JSON object per line in machine mode.

use crate::version::VersionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Transport state of a playback session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    Stopped,
    Playing,
    Paused,
}

impl std::fmt::Display for TransportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportState::Stopped => write!(f, "stopped"),
            TransportState::Playing => write!(f, "playing"),
            TransportState::Paused => write!(f, "paused"),
        }
    }
}

/// Severity of a user-facing notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Client event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// A generation request was accepted and streaming began
    GenerationStarted {
        job_id: Uuid,
        track_name: String,
        timestamp: DateTime<Utc>,
    },

    /// One slot finished rendering and its artifact is playable
    SlotReady {
        job_id: Uuid,
        version: VersionId,
        done: u32,
        total: u32,
        /// Estimated seconds remaining, absent before the first completion
        eta_secs: Option<u64>,
        timestamp: DateTime<Utc>,
    },

    /// One slot was reported failed (or its archive entry was missing)
    SlotFailed {
        job_id: Uuid,
        version: VersionId,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The generation job ended (normally, truncated, or rejected by the server)
    GenerationFinished {
        job_id: Uuid,
        ready: Vec<VersionId>,
        failed: Vec<VersionId>,
        /// Slots never reported before the stream ended
        pending: Vec<VersionId>,
        timestamp: DateTime<Utc>,
    },

    /// Main transport changed state
    TransportChanged {
        version: Option<VersionId>,
        old_state: TransportState,
        new_state: TransportState,
        timestamp: DateTime<Utc>,
    },

    /// Preview transport started or stopped
    PreviewChanged {
        track: Option<String>,
        playing: bool,
        timestamp: DateTime<Utc>,
    },

    /// Availability of the mixing service changed
    AvailabilityChanged {
        available: bool,
        timestamp: DateTime<Utc>,
    },

    /// A file was written to the output directory
    FileSaved {
        path: PathBuf,
        bytes: u64,
        timestamp: DateTime<Utc>,
    },

    /// Free-form message for the user
    Notice {
        level: NoticeLevel,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl ClientEvent {
    /// Get event type name as string
    pub fn event_type(&self) -> &str {
        match self {
            ClientEvent::GenerationStarted { .. } => "GenerationStarted",
            ClientEvent::SlotReady { .. } => "SlotReady",
            ClientEvent::SlotFailed { .. } => "SlotFailed",
            ClientEvent::GenerationFinished { .. } => "GenerationFinished",
            ClientEvent::TransportChanged { .. } => "TransportChanged",
            ClientEvent::PreviewChanged { .. } => "PreviewChanged",
            ClientEvent::AvailabilityChanged { .. } => "AvailabilityChanged",
            ClientEvent::FileSaved { .. } => "FileSaved",
            ClientEvent::Notice { .. } => "Notice",
        }
    }

    /// Shorthand for an info notice stamped now
    pub fn info(message: impl Into<String>) -> Self {
        Self::notice(NoticeLevel::Info, message)
    }

    /// Shorthand for a warning notice stamped now
    pub fn warning(message: impl Into<String>) -> Self {
        Self::notice(NoticeLevel::Warning, message)
    }

    /// Shorthand for an error notice stamped now
    pub fn error(message: impl Into<String>) -> Self {
        Self::notice(NoticeLevel::Error, message)
    }

    fn notice(level: NoticeLevel, message: impl Into<String>) -> Self {
        ClientEvent::Notice {
            level,
            message: message.into(),
            timestamp: crate::time::now(),
        }
    }

    /// Human-readable single-line rendering
    pub fn describe(&self) -> String {
        match self {
            ClientEvent::GenerationStarted { track_name, .. } => {
                format!("Mixing with track {:?}...", track_name)
            }
            ClientEvent::SlotReady { version, done, total, eta_secs, .. } => match eta_secs {
                Some(eta) if done < total => format!(
                    "{} ready ({}/{}), about {} left",
                    version,
                    done,
                    total,
                    crate::time::format_eta(std::time::Duration::from_secs(*eta))
                ),
                _ => format!("{} ready ({}/{})", version, done, total),
            },
            ClientEvent::SlotFailed { version, reason, .. } => {
                format!("{} failed: {}", version, reason)
            }
            ClientEvent::GenerationFinished { ready, pending, .. } => {
                let mut line = if ready.is_empty() {
                    "All mixing methods failed.".to_string()
                } else {
                    format!(
                        "{}/{} styles generated: {}",
                        ready.len(),
                        crate::version::SLOT_COUNT,
                        join_versions(ready)
                    )
                };
                if !pending.is_empty() {
                    line.push_str(&format!(" (never reported: {})", join_versions(pending)));
                }
                line
            }
            ClientEvent::TransportChanged { version, new_state, .. } => match version {
                Some(v) => format!("{} {}", v, new_state),
                None => format!("player {}", new_state),
            },
            ClientEvent::PreviewChanged { track, playing, .. } => {
                let name = track.as_deref().unwrap_or("-");
                if *playing {
                    format!("Previewing {}", name)
                } else {
                    format!("Preview of {} stopped", name)
                }
            }
            ClientEvent::AvailabilityChanged { available, .. } => {
                if *available {
                    "Server ready".to_string()
                } else {
                    "Server sleeping".to_string()
                }
            }
            ClientEvent::FileSaved { path, bytes, .. } => {
                format!("Saved {} ({} bytes)", path.display(), bytes)
            }
            ClientEvent::Notice { message, .. } => message.clone(),
        }
    }
}

fn join_versions(versions: &[VersionId]) -> String {
    versions
        .iter()
        .map(|v| v.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
