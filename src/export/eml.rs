//! Write messages as individual `.eml` files.
//!
//! An `.eml` file is the RFC 5322 message without the MBOX `From ` separator:
//! headers in source order, a blank line, and the body.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConvertError, Result};
use crate::export::naming::create_unique;
use crate::model::message::MessageRecord;
use crate::model::report::OutputFile;

/// Line terminator used in written files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    #[default]
    Lf,
    Crlf,
}

impl LineEnding {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Self::Lf => b"\n",
            Self::Crlf => b"\r\n",
        }
    }
}

/// What to do with body bytes that are not valid UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextPolicy {
    /// Substitute U+FFFD for invalid sequences; output is always UTF-8.
    #[default]
    Replace,
    /// Copy body bytes verbatim (8-bit bodies survive untouched).
    Preserve,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SerializeOptions {
    pub line_ending: LineEnding,
    pub text_policy: TextPolicy,
}

/// Render a message to wire bytes.
///
/// Fails with `MalformedMessage` if the record has no header fields.
pub fn render(record: &MessageRecord, options: &SerializeOptions) -> Result<Vec<u8>> {
    if record.headers.is_empty() {
        return Err(ConvertError::MalformedMessage {
            index: record.index,
            reason: "no header fields".to_string(),
        });
    }

    let eol = options.line_ending.as_bytes();
    let mut out = Vec::with_capacity(record.body.len() + 1024);

    for header in &record.headers {
        out.extend_from_slice(header.name.as_bytes());
        out.push(b':');
        for (i, line) in header.raw.split('\n').enumerate() {
            if i > 0 {
                out.extend_from_slice(eol);
            }
            out.extend_from_slice(line.trim_end_matches('\r').as_bytes());
        }
        out.extend_from_slice(eol);
    }
    out.extend_from_slice(eol);

    match options.text_policy {
        TextPolicy::Replace => {
            let text = String::from_utf8_lossy(&record.body);
            normalize_line_endings(text.as_bytes(), eol, &mut out);
        }
        TextPolicy::Preserve => normalize_line_endings(&record.body, eol, &mut out),
    }

    Ok(out)
}

/// Serialize a message to exactly `path`, which must not exist yet.
pub fn serialize(
    record: &MessageRecord,
    path: &Path,
    options: &SerializeOptions,
) -> Result<OutputFile> {
    let bytes = render(record, options)?;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| ConvertError::write(path, e))?;
    finish_write(&mut file, path, &bytes)
}

/// Serialize a message into `dir` as `{stem}.eml`, adding `_1`, `_2`, … on clashes.
pub fn write_to_dir(
    record: &MessageRecord,
    dir: &Path,
    stem: &str,
    options: &SerializeOptions,
) -> Result<OutputFile> {
    let bytes = render(record, options)?;
    let (path, mut file) = create_unique(dir, stem, "eml")?;
    finish_write(&mut file, &path, &bytes)
}

fn finish_write(file: &mut std::fs::File, path: &Path, bytes: &[u8]) -> Result<OutputFile> {
    let written = file.write_all(bytes).and_then(|()| file.flush());
    if let Err(e) = written {
        // Do not leave a partial message behind
        let _ = std::fs::remove_file(path);
        return Err(ConvertError::write(path, e));
    }
    debug!(path = %path.display(), size = bytes.len(), "Wrote message");
    Ok(OutputFile {
        path: path.to_path_buf(),
        size: bytes.len() as u64,
    })
}

/// Copy `input` to `out`, rewriting every `\n` / `\r\n` terminator as `eol`.
fn normalize_line_endings(input: &[u8], eol: &[u8], out: &mut Vec<u8>) {
    let mut lines = input.split(|&b| b == b'\n').peekable();
    while let Some(line) = lines.next() {
        let is_last = lines.peek().is_none();
        if is_last {
            // Text after the final newline (empty if input ended with one)
            out.extend_from_slice(line);
        } else {
            out.extend_from_slice(line.strip_suffix(b"\r").unwrap_or(line));
            out.extend_from_slice(eol);
        }
    }
}
