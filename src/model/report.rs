//! Output files, batches, and the final conversion report.

use std::path::PathBuf;

use serde::Serialize;

/// A successfully written `.eml` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputFile {
    pub path: PathBuf,
    /// Size in bytes as written.
    pub size: u64,
}

impl OutputFile {
    /// Build from an existing file, reading its size from the filesystem.
    pub fn from_path(path: impl Into<PathBuf>) -> crate::error::Result<Self> {
        let path = path.into();
        let size = std::fs::metadata(&path)
            .map_err(|e| crate::error::ConvertError::io(&path, e))?
            .len();
        Ok(Self { path, size })
    }

    /// File name component, lossily converted.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// A group of output files meant to be imported together.
///
/// Holds `len() <= max_count` and `total_size <= max_bytes`, except when a
/// single file larger than `max_bytes` sits alone in its batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Batch {
    pub files: Vec<OutputFile>,
    pub total_size: u64,
    /// Directory the batch was copied into, once laid out on disk.
    pub directory: Option<PathBuf>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub(crate) fn push(&mut self, file: OutputFile) {
        self.total_size += file.size;
        self.files.push(file);
    }

    /// `true` if this batch is a lone file exceeding `max_bytes`.
    pub fn is_oversized(&self, max_bytes: u64) -> bool {
        self.files.len() == 1 && self.total_size > max_bytes
    }
}

/// Running message counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
}

/// How a run ended, as seen by a non-interactive caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Every message was written.
    Complete,
    /// Some messages failed, at least one succeeded.
    Partial,
    /// Messages were found but none could be written.
    Failed,
    /// The archive contained no messages.
    Empty,
}

impl Outcome {
    /// Process exit status: 0 complete, 1 partial, 2 failed or empty.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Complete => 0,
            Self::Partial => 1,
            Self::Failed | Self::Empty => 2,
        }
    }
}

impl Counts {
    pub fn outcome(&self) -> Outcome {
        if self.total == 0 {
            Outcome::Empty
        } else if self.succeeded == 0 {
            Outcome::Failed
        } else if self.failed > 0 {
            Outcome::Partial
        } else {
            Outcome::Complete
        }
    }
}

/// Result of a finished conversion. Built once by the driver, never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    pub archive: PathBuf,
    pub output_dir: PathBuf,
    pub counts: Counts,
    /// Header decode fallbacks encountered while naming files.
    pub decode_fallbacks: u64,
    /// Files written, in archive order.
    pub files: Vec<OutputFile>,
    /// Batches, empty unless batching was requested.
    pub batches: Vec<Batch>,
    /// Path of the human-readable manifest, if one was written.
    pub manifest: Option<PathBuf>,
}

impl ConversionReport {
    pub fn outcome(&self) -> Outcome {
        self.counts.outcome()
    }

    pub fn exit_code(&self) -> i32 {
        self.outcome().exit_code()
    }
}
