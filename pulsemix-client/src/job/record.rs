//! Streamed job records
//!
//! The `/mix-all` endpoint answers with newline-delimited JSON. Each line
//! describes one slot:
//!
//! ```text
//! {"version":"v2","status":"done","progress":"2/4","data":"<base64>"}
//! {"version":"v3","status":"failed"}
//! ```
//!
//! Any other status is interim progress and carries no payload.

use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use pulsemix_common::VersionId;
use serde::Deserialize;
use std::str::FromStr;
use tracing::warn;

/// Wire shape of one line, before validation
#[derive(Debug, Deserialize)]
struct WireRecord {
    version: String,
    status: String,
    #[serde(default)]
    progress: Option<String>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default, alias = "mime")]
    media_type: Option<String>,
    #[serde(default, alias = "error")]
    reason: Option<String>,
}

/// Completed-over-total counter reported by the server (`"n/total"`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressMark {
    pub done: u32,
    pub total: u32,
}

impl FromStr for ProgressMark {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (done, total) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| Error::RecordParse(format!("progress {:?} is not n/total", s)))?;
        let done: u32 = done
            .trim()
            .parse()
            .map_err(|_| Error::RecordParse(format!("progress {:?} has a bad count", s)))?;
        let total: u32 = total
            .trim()
            .parse()
            .map_err(|_| Error::RecordParse(format!("progress {:?} has a bad total", s)))?;
        if total == 0 || done > total {
            return Err(Error::RecordParse(format!(
                "progress {:?} is out of range",
                s
            )));
        }
        Ok(Self { done, total })
    }
}

/// One validated record from the job stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobRecord {
    /// Slot rendered successfully
    Done {
        version: VersionId,
        progress: Option<ProgressMark>,
        payload: Bytes,
        media_type: Option<String>,
    },
    /// Slot failed on the server
    Failed {
        version: VersionId,
        reason: Option<String>,
    },
    /// Any other status; informational only
    Interim {
        version: VersionId,
        status: String,
        progress: Option<ProgressMark>,
    },
}

impl JobRecord {
    pub fn version(&self) -> VersionId {
        match self {
            JobRecord::Done { version, .. }
            | JobRecord::Failed { version, .. }
            | JobRecord::Interim { version, .. } => *version,
        }
    }
}

/// Decode one trimmed, non-empty line
pub fn parse_record(line: &str) -> Result<JobRecord> {
    let wire: WireRecord = serde_json::from_str(line)
        .map_err(|e| Error::RecordParse(format!("invalid JSON: {}", e)))?;

    let version: VersionId = wire
        .version
        .parse()
        .map_err(|_| Error::RecordParse(format!("unknown version {:?}", wire.version)))?;

    let progress = match wire.progress.as_deref() {
        Some(raw) => match raw.parse::<ProgressMark>() {
            Ok(mark) => Some(mark),
            Err(e) => {
                warn!(version = %version, error = %e, "Ignoring malformed progress field");
                None
            }
        },
        None => None,
    };

    match wire.status.trim().to_ascii_lowercase().as_str() {
        "done" => {
            let data = wire.data.ok_or_else(|| {
                Error::RecordParse(format!("{} reported done without data", version))
            })?;
            let payload = BASE64
                .decode(data.trim())
                .map_err(|e| Error::RecordParse(format!("{} has invalid base64: {}", version, e)))?;
            Ok(JobRecord::Done {
                version,
                progress,
                payload: Bytes::from(payload),
                media_type: wire.media_type,
            })
        }
        "failed" | "error" => Ok(JobRecord::Failed {
            version,
            reason: wire.reason,
        }),
        other => Ok(JobRecord::Interim {
            version,
            status: other.to_string(),
            progress,
        }),
    }
}
