//! Parser for individual `.eml` files (RFC 5322 messages without MBOX framing).

use std::path::Path;

use crate::error::{ConvertError, Result};
use crate::model::message::MessageRecord;
use crate::parser::message::split_message;

/// Parse a single `.eml` file back into a [`MessageRecord`].
///
/// `index` is recorded as given; the offset is always 0 and there is no envelope.
pub fn parse_eml(path: impl AsRef<Path>, index: u64) -> Result<MessageRecord> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| ConvertError::io(path, e))?;
    Ok(parse_eml_bytes(&data, index))
}

/// Parse in-memory `.eml` bytes.
pub fn parse_eml_bytes(data: &[u8], index: u64) -> MessageRecord {
    let (headers, body) = split_message(data);
    MessageRecord {
        index,
        offset: 0,
        envelope: None,
        headers,
        body,
    }
}
