//! Tempo adjustment
//!
//! Sends the active artifact back to the server with one speed token and saves
//! every file of the returned archive. The mix itself is never regenerated and
//! the artifact store is not modified.
//!
//! The request is split in two halves so the session loop can keep running
//! while the server works: [`TempoAdjustmentPipeline::begin`] checks every
//! precondition and hands out a [`TempoRequest`]; [`TempoAdjustmentPipeline::complete`]
//! unpacks and saves the response.

use crate::api::MixClient;
use crate::archive::ArchiveCodec;
use crate::error::{Error, Result};
use crate::save::SaveSink;
use crate::state::EventBus;
use crate::store::{ArtifactStore, AudioBlob};
use bytes::Bytes;
use pulsemix_common::{ClientEvent, VersionId};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{info, warn};

/// Discrete speed choices offered by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TempoOption {
    /// 80% speed
    Slower20,
    /// 90% speed
    Slower10,
    /// 110% speed
    Faster10,
    /// 125% speed
    Faster25,
    /// Every speed above in one archive
    All,
}

impl TempoOption {
    pub const ALL: [TempoOption; 5] = [
        TempoOption::Slower20,
        TempoOption::Slower10,
        TempoOption::Faster10,
        TempoOption::Faster25,
        TempoOption::All,
    ];

    /// Token sent in the `speeds` form field
    pub fn token(&self) -> &'static str {
        match self {
            TempoOption::Slower20 => "0.8",
            TempoOption::Slower10 => "0.9",
            TempoOption::Faster10 => "1.1",
            TempoOption::Faster25 => "1.25",
            TempoOption::All => "all",
        }
    }

    /// Speed factor, `None` for the combined option
    pub fn rate(&self) -> Option<f32> {
        match self {
            TempoOption::Slower20 => Some(0.8),
            TempoOption::Slower10 => Some(0.9),
            TempoOption::Faster10 => Some(1.1),
            TempoOption::Faster25 => Some(1.25),
            TempoOption::All => None,
        }
    }
}

impl std::fmt::Display for TempoOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for TempoOption {
    type Err = pulsemix_common::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let wanted = s.trim().trim_start_matches('x').to_ascii_lowercase();
        TempoOption::ALL
            .into_iter()
            .find(|option| option.token() == wanted)
            .ok_or_else(|| {
                let tokens: Vec<&str> = TempoOption::ALL.iter().map(|o| o.token()).collect();
                pulsemix_common::Error::InvalidInput(format!(
                    "Unknown tempo option {:?}; choose one of {}",
                    s,
                    tokens.join(", ")
                ))
            })
    }
}

/// Everything needed to send one adjustment request
#[derive(Debug, Clone)]
pub struct TempoRequest {
    pub version: VersionId,
    pub blob: AudioBlob,
    pub option: TempoOption,
}

pub struct TempoAdjustmentPipeline {
    codec: Box<dyn ArchiveCodec>,
    extension: String,
    selected: Option<TempoOption>,
    in_flight: Option<VersionId>,
}

impl TempoAdjustmentPipeline {
    pub fn new(codec: Box<dyn ArchiveCodec>, extension: impl Into<String>) -> Self {
        Self {
            codec,
            extension: extension.into(),
            selected: None,
            in_flight: None,
        }
    }

    pub fn select(&mut self, option: TempoOption) {
        self.selected = Some(option);
    }

    pub fn selected(&self) -> Option<TempoOption> {
        self.selected
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Check preconditions and claim the pipeline for one request
    pub fn begin(&mut self, active: Option<VersionId>, store: &ArtifactStore) -> Result<TempoRequest> {
        if let Some(version) = self.in_flight {
            return Err(Error::precondition(format!(
                "A tempo adjustment of {} is already in progress",
                version
            )));
        }
        let version = active.ok_or_else(|| Error::precondition("Select a version before adjusting its tempo"))?;
        let blob = store
            .get(version)
            .filter(|_| store.is_ready(version))
            .cloned()
            .ok_or_else(|| Error::precondition(format!("Version {} is not ready", version)))?;
        let option = self
            .selected
            .ok_or_else(|| Error::precondition("Choose a tempo option first"))?;

        self.in_flight = Some(version);
        Ok(TempoRequest { version, blob, option })
    }

    /// Release the pipeline, then unpack and save the server's answer
    pub async fn complete<S: SaveSink>(
        &mut self,
        response: Result<Bytes>,
        sink: &S,
        events: &EventBus,
    ) -> Result<Vec<PathBuf>> {
        let version = self.in_flight.take();
        let body = response?;

        let entries = self.codec.unpack(&body)?;
        if entries.is_empty() {
            return Err(Error::Archive("tempo archive has no entries".to_string()));
        }

        let mut saved = Vec::with_capacity(entries.len());
        for entry in &entries {
            let path = sink.save(&entry.name, &entry.data).await?;
            events.broadcast_event(ClientEvent::FileSaved {
                path: path.clone(),
                bytes: entry.data.len() as u64,
                timestamp: pulsemix_common::time::now(),
            });
            saved.push(path);
        }
        info!(version = ?version, files = saved.len(), "Tempo adjustment saved");
        Ok(saved)
    }

    /// Run one adjustment end to end
    pub async fn run<S: SaveSink>(
        &mut self,
        client: &MixClient,
        active: Option<VersionId>,
        store: &ArtifactStore,
        sink: &S,
        events: &EventBus,
    ) -> Result<Vec<PathBuf>> {
        let request = self.begin(active, store)?;
        let response = client
            .adjust_bpm(request.version, &request.blob, &self.extension, request.option)
            .await;
        if let Err(e) = &response {
            warn!(version = %request.version, error = %e, "Tempo adjustment request failed");
        }
        self.complete(response, sink, events).await
    }
}
