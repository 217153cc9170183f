//! Check a batch layout against its manifest before importing it.

use std::path::{Path, PathBuf};

use mail_parser::MessageParser;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{ConvertError, Result};
use crate::export::batch::is_eml;
use crate::export::manifest::Manifest;

/// Per-directory tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchCheck {
    pub directory: String,
    pub expected: usize,
    pub found: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerifyReport {
    /// Messages the manifest says the batches hold.
    pub expected: u64,
    /// `.eml` files actually present in the listed batch directories.
    pub found: u64,
    /// Files that do not parse as a message.
    pub unparseable: Vec<PathBuf>,
    /// Batch directories listed in the manifest but absent on disk.
    pub missing_batches: Vec<String>,
    pub batches: Vec<BatchCheck>,
}

impl VerifyReport {
    pub fn is_ok(&self) -> bool {
        self.found == self.expected
            && self.unparseable.is_empty()
            && self.missing_batches.is_empty()
    }
}

/// Verify the batch layout rooted at `dir` (the directory holding `manifest.json`).
pub fn verify(dir: &Path) -> Result<VerifyReport> {
    let manifest = Manifest::load(dir)?;
    let parser = MessageParser::default();
    let mut report = VerifyReport {
        expected: manifest.expected_messages(),
        ..VerifyReport::default()
    };

    for entry in &manifest.batches {
        let batch_dir = dir.join(&entry.directory);
        if !batch_dir.is_dir() {
            warn!(dir = %batch_dir.display(), "Batch directory missing");
            report.missing_batches.push(entry.directory.clone());
            report.batches.push(BatchCheck {
                directory: entry.directory.clone(),
                expected: entry.messages,
                found: 0,
            });
            continue;
        }

        let mut found = 0;
        let listing = std::fs::read_dir(&batch_dir).map_err(|e| ConvertError::io(&batch_dir, e))?;
        for item in listing {
            let path = item.map_err(|e| ConvertError::io(&batch_dir, e))?.path();
            if !path.is_file() || !is_eml(&path) {
                continue;
            }
            found += 1;
            let data = std::fs::read(&path).map_err(|e| ConvertError::io(&path, e))?;
            let parses = parser
                .parse(data.as_slice())
                .is_some_and(|msg| !msg.headers().is_empty());
            if !parses {
                debug!(path = %path.display(), "File does not parse as a message");
                report.unparseable.push(path);
            }
        }

        report.found += found as u64;
        report.batches.push(BatchCheck {
            directory: entry.directory.clone(),
            expected: entry.messages,
            found,
        });
    }

    report.unparseable.sort();
    Ok(report)
}
