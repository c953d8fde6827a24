//! File saving
//!
//! Tempo adjustment and download both end in one or more named files. Names
//! come from the server (archive entries) or from configuration, so they are
//! checked to stay inside the output directory.

use crate::error::{Error, Result};
use crate::state::EventBus;
use crate::store::ArtifactStore;
use pulsemix_common::{ClientEvent, VersionId};
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use tracing::info;

/// Destination for saved files
pub trait SaveSink {
    /// Write `bytes` under the relative `name`; returns the full path
    fn save(&self, name: &str, bytes: &[u8]) -> impl Future<Output = Result<PathBuf>> + Send;
}

/// Saves into one directory, creating subdirectories as needed
#[derive(Debug, Clone)]
pub struct DirectorySink {
    directory: PathBuf,
}

impl DirectorySink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    fn target(&self, name: &str) -> Result<PathBuf> {
        let relative = Path::new(name);
        let mut components = relative.components().peekable();
        if components.peek().is_none() {
            return Err(Error::Archive("refusing to save a file without a name".to_string()));
        }
        if !components.all(|c| matches!(c, Component::Normal(_))) {
            return Err(Error::Archive(format!("refusing to save outside the output directory: {}", name)));
        }
        Ok(self.directory.join(relative))
    }
}

impl SaveSink for DirectorySink {
    async fn save(&self, name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.target(name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        info!(path = %path.display(), bytes = bytes.len(), "File saved");
        Ok(path)
    }
}

/// File name for a downloaded version: `{prefix}_{version}.{ext}`
pub fn download_name(prefix: &str, version: VersionId, extension: &str) -> String {
    format!("{}_{}.{}", prefix, version, extension)
}

/// Save the active version's artifact through `sink`
pub async fn download_version<S: SaveSink>(
    sink: &S,
    active: Option<VersionId>,
    store: &ArtifactStore,
    prefix: &str,
    extension: &str,
    events: &EventBus,
) -> Result<PathBuf> {
    let version = active.ok_or_else(|| Error::precondition("Nothing to download: no version is active"))?;
    let blob = store
        .get(version)
        .filter(|_| store.is_ready(version))
        .ok_or_else(|| Error::precondition(format!("Version {} is not ready", version)))?;

    let path = sink
        .save(&download_name(prefix, version, extension), &blob.bytes)
        .await?;
    events.broadcast_event(ClientEvent::FileSaved {
        path: path.clone(),
        bytes: blob.len() as u64,
        timestamp: pulsemix_common::time::now(),
    });
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::AudioBlob;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_directory_sink_writes_nested_names() {
        let dir = TempDir::new().unwrap();
        let sink = DirectorySink::new(dir.path());

        let path = sink.save("speeds/v1_0.8.mp3", b"abc").await.unwrap();

        assert_eq!(path, dir.path().join("speeds").join("v1_0.8.mp3"));
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_directory_sink_rejects_escaping_names() {
        let dir = TempDir::new().unwrap();
        let sink = DirectorySink::new(dir.path());

        assert!(sink.save("../evil.mp3", b"x").await.is_err());
        assert!(sink.save("/etc/evil.mp3", b"x").await.is_err());
        assert!(sink.save("", b"x").await.is_err());
    }

    #[tokio::test]
    async fn test_download_requires_ready_active_version() {
        let dir = TempDir::new().unwrap();
        let sink = DirectorySink::new(dir.path());
        let events = EventBus::new();
        let mut store = ArtifactStore::new();
        store.mark_failed(VersionId::V2);

        let none = download_version(&sink, None, &store, "pulsemix", "mp3", &events).await;
        assert!(matches!(none, Err(Error::Precondition(_))));

        let failed = download_version(&sink, Some(VersionId::V2), &store, "pulsemix", "mp3", &events).await;
        assert!(matches!(failed, Err(Error::Precondition(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_download_saves_with_prefix() {
        let dir = TempDir::new().unwrap();
        let sink = DirectorySink::new(dir.path());
        let events = EventBus::new();
        let mut rx = events.subscribe_events();
        let mut store = ArtifactStore::new();
        store.put(VersionId::V3, AudioBlob::new(vec![9u8, 8, 7], "audio/mpeg"));

        let path = download_version(&sink, Some(VersionId::V3), &store, "pulsemix", "mp3", &events)
            .await
            .unwrap();

        assert_eq!(path.file_name().unwrap(), "pulsemix_v3.mp3");
        assert_eq!(std::fs::read(&path).unwrap(), vec![9u8, 8, 7]);
        assert_eq!(rx.try_recv().unwrap().event_type(), "FileSaved");
    }
}
