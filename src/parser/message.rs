//! Split raw RFC 5322 bytes into ordered header fields and an opaque body.
//!
//! Parsing never fails. Whatever cannot be read as a header section becomes
//! body; a message with no usable headers is left for the serializer to reject.

use crate::model::message::{Header, MessageRecord};
use crate::parser::header::{decode_header_bytes, split_header_line};
use crate::parser::mbox::RawMessage;

/// Build a [`MessageRecord`] from a framed archive message.
pub fn from_raw(raw: RawMessage) -> MessageRecord {
    let (headers, body) = split_message(&raw.bytes);
    MessageRecord {
        index: raw.index,
        offset: raw.offset,
        envelope: Some(raw.envelope),
        headers,
        body,
    }
}

/// Split message bytes into headers and body.
///
/// The header section ends at the first blank line, or at the first line that
/// is neither a field nor a continuation (that line then starts the body).
/// Header bytes decode as UTF-8 with a Windows-1252 fallback; the body is
/// returned verbatim.
pub fn split_message(bytes: &[u8]) -> (Vec<Header>, Vec<u8>) {
    let mut headers: Vec<Header> = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let line_end = bytes[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| pos + i + 1)
            .unwrap_or(bytes.len());
        let line = strip_line_ending(&bytes[pos..line_end]);

        if line.is_empty() {
            return (headers, bytes[line_end..].to_vec());
        }

        let is_continuation = line[0] == b' ' || line[0] == b'\t';
        if is_continuation {
            match headers.last_mut() {
                Some(last) => {
                    last.raw.push('\n');
                    last.raw.push_str(&decode_header_bytes(line));
                }
                None => break,
            }
        } else {
            let text = decode_header_bytes(line);
            match split_header_line(&text) {
                Some((name, value)) => headers.push(Header {
                    name: name.to_string(),
                    raw: value.to_string(),
                }),
                None => break,
            }
        }

        pos = line_end;
    }

    (headers, bytes[pos..].to_vec())
}

fn strip_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
