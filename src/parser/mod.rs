//! Email parsing: MBOX streaming reader, header/body splitting, header decoding, and EML re-parsing.

pub mod eml;
pub mod header;
pub mod mbox;
pub mod message;

use std::path::Path;

use crate::error::Result;
use crate::model::message::MessageRecord;

use self::mbox::{MboxReader, ReaderOptions};

/// Open an archive and return a lazy, single-pass sequence of message records.
///
/// Fails immediately with `ArchiveNotFound` / `ArchiveUnreadable`. Read errors
/// later in the archive surface as an `Err` item ending the sequence.
pub fn extract(
    path: impl AsRef<Path>,
    options: ReaderOptions,
) -> Result<impl Iterator<Item = Result<MessageRecord>>> {
    let reader = MboxReader::open(path, options)?;
    Ok(reader.map(|raw| raw.map(message::from_raw)))
}
