//! Centralized error types for mbox2eml.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mbox2eml library.
///
/// Archive-level and configuration errors abort a run. `Write` and
/// `MalformedMessage` are per-message: the driver counts them and moves on.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// The archive path does not exist.
    #[error("MBOX file not found: {0}")]
    ArchiveNotFound(PathBuf),

    /// The archive exists but could not be opened or read.
    #[error("Cannot read MBOX '{path}': {source}")]
    ArchiveUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Invalid options (batch limits, name lengths).
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// An output file could not be created or written.
    #[error("Cannot write '{path}': {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A message could not be serialized because its structure is unusable.
    #[error("Message {index} is malformed: {reason}")]
    MalformedMessage { index: u64, reason: String },

    /// Other I/O error with the associated path (batch copies, manifests).
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The batch manifest is missing or cannot be parsed.
    #[error("Invalid manifest '{path}': {reason}")]
    InvalidManifest { path: PathBuf, reason: String },
}

/// Convenience alias for `Result<T, ConvertError>`.
pub type Result<T> = std::result::Result<T, ConvertError>;

impl ConvertError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `Write` variant from a path and an `io::Error`.
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    /// Map an error from opening the archive to `ArchiveNotFound` or `ArchiveUnreadable`.
    pub fn archive(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::ArchiveNotFound(path)
        } else {
            Self::ArchiveUnreadable { path, source }
        }
    }

    /// `true` for errors that only affect a single message.
    pub fn is_per_message(&self) -> bool {
        matches!(self, Self::Write { .. } | Self::MalformedMessage { .. })
    }
}
