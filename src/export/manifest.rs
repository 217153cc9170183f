//! Batch manifest: a plain-text import guide plus a machine-readable twin.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use humansize::{format_size, BINARY};
use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};
use crate::export::batch::batch_dir_name;
use crate::model::report::{Batch, Counts};

/// Human-readable import guide written next to the batch directories.
pub const INSTRUCTIONS_FILE: &str = "IMPORT_INSTRUCTIONS.txt";

/// JSON manifest read back by `verify`.
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestBatch {
    /// Directory name relative to the manifest.
    pub directory: String,
    pub messages: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub generated_at: DateTime<Local>,
    pub total_messages: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub batches: Vec<ManifestBatch>,
}

impl Manifest {
    pub fn new(counts: Counts, batches: &[Batch]) -> Self {
        let batches = batches
            .iter()
            .enumerate()
            .map(|(i, batch)| ManifestBatch {
                directory: batch
                    .directory
                    .as_deref()
                    .and_then(Path::file_name)
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| batch_dir_name(i + 1, batch)),
                messages: batch.len(),
                bytes: batch.total_size,
            })
            .collect();
        Self {
            generated_at: Local::now(),
            total_messages: counts.total,
            succeeded: counts.succeeded,
            failed: counts.failed,
            batches,
        }
    }

    /// Number of messages the batch directories should hold in total.
    pub fn expected_messages(&self) -> u64 {
        self.batches.iter().map(|b| b.messages as u64).sum()
    }

    /// Read `manifest.json` from `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let data = std::fs::read_to_string(&path).map_err(|e| ConvertError::InvalidManifest {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        serde_json::from_str(&data).map_err(|e| ConvertError::InvalidManifest {
            path,
            reason: e.to_string(),
        })
    }

    /// Plain-text import guide.
    pub fn render_instructions(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "MBOX to EML Batch Import Instructions");
        let _ = writeln!(
            out,
            "Generated: {}",
            self.generated_at.format("%Y-%m-%d %H:%M:%S")
        );
        let _ = writeln!(out);
        let _ = writeln!(out, "Total messages: {}", self.total_messages);
        if self.failed > 0 {
            let _ = writeln!(out, "Failed to convert: {}", self.failed);
        }
        let _ = writeln!(out, "Batches: {}", self.batches.len());
        let _ = writeln!(out);
        let _ = writeln!(out, "Import one batch at a time:");
        for (i, batch) in self.batches.iter().enumerate() {
            let _ = writeln!(
                out,
                "Batch {}: {} ({} messages, {})",
                i + 1,
                batch.directory,
                batch.messages,
                format_size(batch.bytes, BINARY)
            );
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "Expected messages: {}", self.expected_messages());
        out
    }

    /// Write both manifest files into `dir`, replacing earlier ones.
    /// Returns the path of the text guide.
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let text_path = dir.join(INSTRUCTIONS_FILE);
        std::fs::write(&text_path, self.render_instructions())
            .map_err(|e| ConvertError::io(&text_path, e))?;

        let json_path = dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|e| {
            ConvertError::io(&json_path, std::io::Error::new(std::io::ErrorKind::Other, e))
        })?;
        std::fs::write(&json_path, json).map_err(|e| ConvertError::io(&json_path, e))?;

        tracing::info!(path = %text_path.display(), "Manifest written");
        Ok(text_path)
    }
}
