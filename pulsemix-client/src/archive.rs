//! Archive unpacking
//!
//! The mixing service returns multi-file results as a zip container. The
//! container format is hidden behind [`ArchiveCodec`] so the rest of the client
//! only sees named in-memory buffers.

use crate::error::{Error, Result};
use bytes::Bytes;
use std::io::Read;

/// One file extracted from an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Normalized path inside the archive (`/`-separated)
    pub name: String,
    pub data: Bytes,
}

impl ArchiveEntry {
    /// Last path component of `name`
    pub fn file_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }
}

/// Unpacks a multi-entry archive into buffers
pub trait ArchiveCodec: Send + Sync {
    fn unpack(&self, bytes: &[u8]) -> Result<Vec<ArchiveEntry>>;
}

/// Find an entry by file name, ignoring any directory prefix
pub fn find_entry<'a>(entries: &'a [ArchiveEntry], file_name: &str) -> Option<&'a ArchiveEntry> {
    entries.iter().find(|e| e.file_name() == file_name)
}

/// Zip container with stored or deflated entries
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipCodec;

impl ArchiveCodec for ZipCodec {
    fn unpack(&self, bytes: &[u8]) -> Result<Vec<ArchiveEntry>> {
        let archive = rawzip::ZipArchive::from_slice(bytes)
            .map_err(|e| Error::Archive(format!("invalid zip archive: {:?}", e)))?;

        let mut entries = Vec::new();
        for entry in archive.entries() {
            let entry = entry.map_err(|e| Error::Archive(format!("zip entry error: {:?}", e)))?;
            if entry.is_dir() {
                continue;
            }
            let name = entry
                .file_path()
                .try_normalize()
                .map_err(|e| Error::Archive(format!("failed to normalize zip path: {:?}", e)))?
                .as_ref()
                .to_string();

            let wayfinder = entry.wayfinder();
            let slice_entry = archive
                .get_entry(wayfinder)
                .map_err(|e| Error::Archive(format!("failed to get entry data: {:?}", e)))?;
            let data = slice_entry.data();

            let mut out = Vec::new();
            match entry.compression_method() {
                rawzip::CompressionMethod::Store => {
                    out.extend_from_slice(data);
                }
                rawzip::CompressionMethod::Deflate => {
                    let mut decoder = flate2::read::DeflateDecoder::new(data);
                    decoder
                        .read_to_end(&mut out)
                        .map_err(|e| Error::Archive(format!("inflate {} failed: {}", name, e)))?;
                }
                method => {
                    return Err(Error::Archive(format!(
                        "unsupported compression method for {}: {:?}",
                        name, method
                    )));
                }
            }

            entries.push(ArchiveEntry {
                name,
                data: Bytes::from(out),
            });
        }
        Ok(entries)
    }
}
