//! Conversion driver: archive in, `.eml` files and optional import batches out.
//!
//! The driver does no console output. Front ends register an observer and
//! render [`ProgressEvent`]s however they like.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{ConvertError, Result};
use crate::export::batch::{partition, scan_eml_dir, sort_by_size, write_batch, BatchOptions};
use crate::export::eml::{write_to_dir, SerializeOptions};
use crate::export::manifest::Manifest;
use crate::export::naming::{file_stem, NamingOptions};
use crate::model::report::{Batch, ConversionReport, Counts, OutputFile};
use crate::parser::header::DecodeFallback;
use crate::parser::mbox::{MboxReader, ReaderOptions};
use crate::parser::message;

/// Subdirectory holding the written messages when batching is enabled.
pub const ALL_EML_DIR: &str = "all_eml";

/// Everything a conversion run needs besides its paths.
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    pub naming: NamingOptions,
    pub serialize: SerializeOptions,
    pub reader: ReaderOptions,
    /// Batch layout stage; `None` writes files straight into the output directory.
    pub batch: Option<BatchOptions>,
}

impl ConvertOptions {
    pub fn validate(&self) -> Result<()> {
        self.naming.validate()?;
        if self.reader.read_buffer_size == 0 {
            return Err(ConvertError::Configuration(
                "read_buffer_size must be at least 1".to_string(),
            ));
        }
        if self.reader.max_message_size == 0 {
            return Err(ConvertError::Configuration(
                "max_message_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Progress notifications emitted during a run.
#[derive(Debug)]
pub enum ProgressEvent<'a> {
    /// The archive was opened; `total_bytes` is its size when known.
    Started { total_bytes: Option<u64> },
    MessageWritten {
        index: u64,
        file: &'a OutputFile,
        counts: Counts,
        /// Archive bytes consumed so far.
        position: u64,
    },
    MessageFailed {
        index: u64,
        error: &'a ConvertError,
        counts: Counts,
        position: u64,
    },
    /// A header could not be decoded and a placeholder was used. Not an error.
    DecodeFallback {
        index: u64,
        fallback: &'a DecodeFallback,
    },
    BatchWritten {
        /// 1-based batch number.
        index: usize,
        directory: &'a Path,
        messages: usize,
        bytes: u64,
    },
    Finished { counts: Counts },
}

/// Convert every message of `archive` into a `.eml` file under `output_dir`.
///
/// Options are validated and the archive opened before anything is created on
/// disk. Failures of a single message are counted and reported through the
/// observer; archive read errors abort the run.
pub fn convert(
    archive: &Path,
    output_dir: &Path,
    options: &ConvertOptions,
    observer: &mut dyn FnMut(&ProgressEvent<'_>),
) -> Result<ConversionReport> {
    options.validate()?;
    let mut reader = MboxReader::open(archive, options.reader.clone())?;
    observer(&ProgressEvent::Started {
        total_bytes: reader.file_size(),
    });

    let eml_dir = match options.batch {
        Some(_) => output_dir.join(ALL_EML_DIR),
        None => output_dir.to_path_buf(),
    };
    std::fs::create_dir_all(&eml_dir).map_err(|e| ConvertError::io(&eml_dir, e))?;
    info!(
        archive = %archive.display(),
        output = %eml_dir.display(),
        "Converting archive"
    );

    let mut counts = Counts::default();
    let mut decode_fallbacks = 0u64;
    let mut files = Vec::new();

    while let Some(raw) = reader.next() {
        let raw = raw?;
        if raw.truncated {
            warn!(index = raw.index, "Message was truncated at the size limit");
        }
        let record = message::from_raw(raw);
        counts.total += 1;

        let stem = file_stem(&record, &options.naming);
        for fallback in &stem.fallbacks {
            decode_fallbacks += 1;
            debug!(index = record.index, word = %fallback.word, reason = %fallback.reason, "Header decode fallback");
            observer(&ProgressEvent::DecodeFallback {
                index: record.index,
                fallback,
            });
        }

        match write_to_dir(&record, &eml_dir, &stem.stem, &options.serialize) {
            Ok(file) => {
                counts.succeeded += 1;
                observer(&ProgressEvent::MessageWritten {
                    index: record.index,
                    file: &file,
                    counts,
                    position: reader.position(),
                });
                files.push(file);
            }
            Err(error) if error.is_per_message() => {
                counts.failed += 1;
                warn!(index = record.index, error = %error, "Skipping message");
                observer(&ProgressEvent::MessageFailed {
                    index: record.index,
                    error: &error,
                    counts,
                    position: reader.position(),
                });
            }
            Err(error) => return Err(error),
        }
    }

    let (batches, manifest) = match options.batch {
        Some(batch_options) if !files.is_empty() => {
            let (batches, manifest) =
                lay_out_batches(&files, output_dir, &batch_options, counts, observer)?;
            (batches, Some(manifest))
        }
        _ => (Vec::new(), None),
    };

    info!(
        total = counts.total,
        succeeded = counts.succeeded,
        failed = counts.failed,
        batches = batches.len(),
        "Conversion finished"
    );
    observer(&ProgressEvent::Finished { counts });

    Ok(ConversionReport {
        archive: archive.to_path_buf(),
        output_dir: output_dir.to_path_buf(),
        counts,
        decode_fallbacks,
        files,
        batches,
        manifest,
    })
}

/// Run only the batching stage over a directory of existing `.eml` files.
pub fn batch_existing(
    eml_dir: &Path,
    output_dir: &Path,
    options: &BatchOptions,
    observer: &mut dyn FnMut(&ProgressEvent<'_>),
) -> Result<ConversionReport> {
    let files = scan_eml_dir(eml_dir)?;
    let total_bytes = files.iter().map(|f| f.size).sum();
    observer(&ProgressEvent::Started {
        total_bytes: Some(total_bytes),
    });

    let counts = Counts {
        total: files.len() as u64,
        succeeded: files.len() as u64,
        failed: 0,
    };

    let (batches, manifest) = if files.is_empty() {
        warn!(dir = %eml_dir.display(), "No .eml files found");
        (Vec::new(), None)
    } else {
        std::fs::create_dir_all(output_dir).map_err(|e| ConvertError::io(output_dir, e))?;
        let (batches, manifest) = lay_out_batches(&files, output_dir, options, counts, observer)?;
        (batches, Some(manifest))
    };

    observer(&ProgressEvent::Finished { counts });

    Ok(ConversionReport {
        archive: eml_dir.to_path_buf(),
        output_dir: output_dir.to_path_buf(),
        counts,
        decode_fallbacks: 0,
        files,
        batches,
        manifest,
    })
}

fn lay_out_batches(
    files: &[OutputFile],
    root: &Path,
    options: &BatchOptions,
    counts: Counts,
    observer: &mut dyn FnMut(&ProgressEvent<'_>),
) -> Result<(Vec<Batch>, PathBuf)> {
    let mut ordered = files.to_vec();
    if options.sort_by_size {
        sort_by_size(&mut ordered);
    }

    let mut batches = partition(&ordered, &options.limits);
    info!(
        files = ordered.len(),
        batches = batches.len(),
        max_count = options.limits.max_count(),
        max_bytes = options.limits.max_bytes(),
        "Partitioned files into batches"
    );

    for (i, batch) in batches.iter_mut().enumerate() {
        let directory = write_batch(root, i + 1, batch)?;
        observer(&ProgressEvent::BatchWritten {
            index: i + 1,
            directory: &directory,
            messages: batch.len(),
            bytes: batch.total_size,
        });
    }

    let manifest = Manifest::new(counts, &batches).write(root)?;
    Ok((batches, manifest))
}
