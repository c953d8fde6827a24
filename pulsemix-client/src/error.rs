//! Error types for pulsemix-client
//!
//! Every failure is local and non-fatal: callers turn these into user notices
//! and keep the session alive. Malformed streamed records never surface here;
//! they are logged and skipped by the job consumer.

use pulsemix_common::VersionId;
use thiserror::Error;

/// Main error type for pulsemix-client
#[derive(Error, Debug)]
pub enum Error {
    /// Non-success HTTP status on an initiating request (no retry)
    #[error("Request to {endpoint} failed with status {status}")]
    RequestFailed { endpoint: String, status: u16 },

    /// Transport-level HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// One streamed line could not be decoded
    #[error("Record parse error: {0}")]
    RecordParse(String),

    /// The server reported failure for one version
    #[error("Version {0} failed on the server")]
    SlotFailed(VersionId),

    /// The job stream ended before every slot reported
    #[error("Stream ended early; unreported slots: {pending:?}")]
    StreamTruncated { pending: Vec<VersionId> },

    /// An expected entry was absent from an archive
    #[error("Archive entry missing: {0}")]
    ArchiveEntryMissing(String),

    /// Archive could not be read
    #[error("Archive error: {0}")]
    Archive(String),

    /// User action attempted without the required prior state
    #[error("{0}")]
    Precondition(String),

    /// Audio engine reported an error
    #[error("Audio engine error: {0}")]
    Engine(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors from the shared library (config, invalid input)
    #[error(transparent)]
    Common(#[from] pulsemix_common::Error),
}

impl Error {
    /// Shorthand for a precondition violation
    pub fn precondition(message: impl Into<String>) -> Self {
        Error::Precondition(message.into())
    }
}

/// Convenience Result type using pulsemix-client Error
pub type Result<T> = std::result::Result<T, Error>;
