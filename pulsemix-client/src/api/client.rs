//! HTTP client for the mixing service

use crate::error::{Error, Result};
use crate::job::legacy::is_archive_content_type;
use crate::store::AudioBlob;
use crate::tempo::TempoOption;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use pulsemix_common::config::ServerConfig;
use pulsemix_common::VersionId;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

const USER_AGENT: &str = concat!("pulsemix/", env!("CARGO_PKG_VERSION"));

/// Body of a generation response
pub enum MixResponse {
    /// Newline-delimited records, read as they arrive
    Stream(BoxStream<'static, reqwest::Result<Bytes>>),
    /// Legacy single archive holding every version
    Archive(Bytes),
}

impl std::fmt::Debug for MixResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MixResponse::Stream(_) => write!(f, "MixResponse::Stream"),
            MixResponse::Archive(body) => write!(f, "MixResponse::Archive({} bytes)", body.len()),
        }
    }
}

/// The user's heartbeat cue, ready to upload
#[derive(Debug, Clone)]
pub struct CuePayload {
    pub file_name: String,
    pub bytes: Bytes,
    pub media_type: String,
}

impl CuePayload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>, media_type: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
            media_type: media_type.into(),
        }
    }

    /// Read a cue file from disk, guessing its media type from the extension
    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        if bytes.is_empty() {
            return Err(Error::precondition(format!("Cue file {} is empty", path.display())));
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "cue".to_string());
        let media_type = media_type_for_path(path);
        Ok(Self::new(file_name, bytes, media_type))
    }
}

fn media_type_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("flac") => "audio/flac",
        Some("ogg") => "audio/ogg",
        Some("m4a") | Some("mp4") => "audio/mp4",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Deserialize)]
struct TrackList {
    #[serde(default)]
    tracks: Option<Vec<String>>,
}

/// Client for the remote mixing service
#[derive(Debug, Clone)]
pub struct MixClient {
    http_client: reqwest::Client,
    base_url: String,
    health_timeout: Duration,
}

impl MixClient {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        Self::with_timeouts(
            config.base_url.trim(),
            Duration::from_secs(config.request_timeout_secs),
            Duration::from_secs(config.health_timeout_secs),
        )
    }

    pub fn with_timeouts(base_url: &str, request_timeout: Duration, health_timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            health_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probe `GET /`; only a 200 within the health timeout counts as available
    pub async fn health(&self) -> bool {
        let url = format!("{}/", self.base_url);
        match self.http_client.get(&url).timeout(self.health_timeout).send().await {
            Ok(response) => {
                let ok = response.status() == StatusCode::OK;
                if !ok {
                    debug!(status = response.status().as_u16(), "Health probe answered without 200");
                }
                ok
            }
            Err(e) => {
                debug!(error = %e, "Health probe failed");
                false
            }
        }
    }

    /// Background tracks offered by the server; a missing list is empty
    pub async fn list_tracks(&self) -> Result<Vec<String>> {
        let url = format!("{}/tracks", self.base_url);
        let response = self.http_client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::RequestFailed {
                endpoint: "/tracks".to_string(),
                status: status.as_u16(),
            });
        }
        let list: TrackList = response.json().await?;
        let tracks = list.tracks.unwrap_or_default();
        debug!(count = tracks.len(), "Track list fetched");
        Ok(tracks)
    }

    /// Submit a generation request
    ///
    /// Any non-success status fails here, before a body is read.
    pub async fn mix_all(&self, cue: &CuePayload, track_name: &str) -> Result<MixResponse> {
        let url = format!("{}/mix-all", self.base_url);
        let picked = Part::bytes(cue.bytes.to_vec())
            .file_name(cue.file_name.clone())
            .mime_str(&cue.media_type)?;
        let form = Form::new()
            .part("picked", picked)
            .text("track_name", track_name.to_string());

        info!(track = %track_name, cue_bytes = cue.bytes.len(), "Submitting generation request");
        let response = self.http_client.post(&url).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "Generation request rejected");
            return Err(Error::RequestFailed {
                endpoint: "/mix-all".to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if is_archive_content_type(content_type.as_deref()) {
            debug!(content_type = ?content_type, "Generation answered with an archive");
            Ok(MixResponse::Archive(response.bytes().await?))
        } else {
            debug!(content_type = ?content_type, "Generation answered with a record stream");
            Ok(MixResponse::Stream(response.bytes_stream().boxed()))
        }
    }

    /// Ask the server to re-time one artifact; returns the archive body
    pub async fn adjust_bpm(
        &self,
        version: VersionId,
        blob: &AudioBlob,
        extension: &str,
        option: TempoOption,
    ) -> Result<Bytes> {
        let url = format!("{}/adjust-bpm", self.base_url);
        let file = Part::bytes(blob.bytes.to_vec())
            .file_name(format!("{}.{}", version, extension))
            .mime_str(&blob.media_type)?;
        let form = Form::new()
            .part("file", file)
            .text("speeds", option.token().to_string());

        info!(version = %version, speeds = option.token(), "Submitting tempo adjustment");
        let response = self.http_client.post(&url).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::RequestFailed {
                endpoint: "/adjust-bpm".to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?)
    }
}

/// `{base}/tracks/{name}` with the name encoded as one path segment
pub fn track_url(base_url: &str, name: &str) -> Result<String> {
    let invalid = |detail: String| -> Error { pulsemix_common::Error::InvalidInput(detail).into() };

    let mut url = Url::parse(base_url).map_err(|e| invalid(format!("Invalid server URL {}: {}", base_url, e)))?;
    url.path_segments_mut()
        .map_err(|_| invalid(format!("Server URL {} cannot carry a path", base_url)))?
        .pop_if_empty()
        .push("tracks")
        .push(name);
    Ok(url.to_string())
}
