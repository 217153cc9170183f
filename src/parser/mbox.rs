//! Streaming MBOX reader.
//!
//! Yields one raw message per `From ` separator, reading line by line with a
//! large buffer. Never loads the whole archive into memory and is tolerant of
//! malformed input: a broken message never stops the messages after it.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{ConvertError, Result};

/// Size of the internal read buffer (1 MB for fast sequential reads).
pub const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Default maximum message size in bytes (256 MB).
pub const MAX_MESSAGE_SIZE: usize = 256 * 1024 * 1024;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Tuning knobs for [`MboxReader`].
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    pub read_buffer_size: usize,
    /// Messages beyond this size are truncated (with a warning).
    pub max_message_size: usize,
    /// Undo mboxrd quoting: `>From ` → `From `, `>>From ` → `>From `.
    pub unescape_from: bool,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            read_buffer_size: READ_BUFFER_SIZE,
            max_message_size: MAX_MESSAGE_SIZE,
            unescape_from: true,
        }
    }
}

/// One message as framed by the archive, before header parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// 1-based position within the archive.
    pub index: u64,
    /// Byte offset of the separator line.
    pub offset: u64,
    /// The separator line without `From ` and the line ending.
    pub envelope: String,
    /// Message bytes (headers + body), separator and framing blank line removed.
    pub bytes: Vec<u8>,
    /// `true` if the message hit `max_message_size` and lost its tail.
    pub truncated: bool,
}

/// Lazy, single-pass iterator over the messages of an MBOX archive.
///
/// Restarting requires opening the archive again. A read error is yielded
/// once as `ArchiveUnreadable`, after which the iterator is exhausted.
pub struct MboxReader<R: BufRead> {
    reader: R,
    path: PathBuf,
    options: ReaderOptions,
    file_size: Option<u64>,
    offset: u64,
    count: u64,
    /// Separator line already consumed for the next message: `(offset, line)`.
    pending: Option<(u64, Vec<u8>)>,
    done: bool,
    line_buf: Vec<u8>,
}

impl MboxReader<BufReader<File>> {
    /// Open an archive for reading.
    ///
    /// Fails with `ArchiveNotFound` if nothing exists at `path`, and with
    /// `ArchiveUnreadable` if it is not a readable regular file.
    pub fn open(path: impl AsRef<Path>, options: ReaderOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&path).map_err(|e| ConvertError::archive(&path, e))?;
        if metadata.is_dir() {
            return Err(ConvertError::ArchiveUnreadable {
                path,
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "is a directory"),
            });
        }

        let file = File::open(&path).map_err(|e| ConvertError::archive(&path, e))?;
        let reader = BufReader::with_capacity(options.read_buffer_size, file);
        debug!(path = %path.display(), size = metadata.len(), "Opened MBOX archive");

        let mut mbox = Self::from_reader(reader, options);
        mbox.path = path;
        mbox.file_size = Some(metadata.len());
        Ok(mbox)
    }
}

impl<R: BufRead> MboxReader<R> {
    /// Wrap any buffered reader (in-memory archives, pipes).
    pub fn from_reader(reader: R, options: ReaderOptions) -> Self {
        Self {
            reader,
            path: PathBuf::from("<stream>"),
            options,
            file_size: None,
            offset: 0,
            count: 0,
            pending: None,
            done: false,
            line_buf: Vec::with_capacity(4096),
        }
    }

    /// Path of the archive (`<stream>` for readers).
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total archive size, when known.
    pub fn file_size(&self) -> Option<u64> {
        self.file_size
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.offset
    }

    /// Read the next line into `line_buf`. Returns `false` at EOF.
    fn read_line(&mut self) -> std::io::Result<bool> {
        self.line_buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.line_buf)?;
        if n == 0 {
            return Ok(false);
        }
        if self.offset == 0 && self.line_buf.starts_with(UTF8_BOM) {
            self.line_buf.drain(..UTF8_BOM.len());
        }
        self.offset += n as u64;
        Ok(true)
    }

    fn unreadable(&mut self, source: std::io::Error) -> ConvertError {
        self.done = true;
        ConvertError::ArchiveUnreadable {
            path: self.path.clone(),
            source,
        }
    }

    /// Skip anything before the first separator.
    fn find_first_separator(&mut self) -> std::io::Result<Option<(u64, Vec<u8>)>> {
        let mut skipped: u64 = 0;
        loop {
            let line_offset = self.offset;
            if !self.read_line()? {
                if skipped > 0 {
                    warn!(bytes = skipped, "No 'From ' separator found; content ignored");
                }
                return Ok(None);
            }
            if is_mbox_separator(&self.line_buf) {
                if skipped > 0 {
                    warn!(bytes = skipped, "Skipped content before first 'From ' separator");
                }
                return Ok(Some((line_offset, self.line_buf.clone())));
            }
            if !is_blank_line(&self.line_buf) {
                skipped += self.line_buf.len() as u64;
            }
        }
    }

    fn read_message(&mut self) -> std::io::Result<Option<RawMessage>> {
        let (start, separator) = match self.pending.take() {
            Some(p) => p,
            None => match self.find_first_separator()? {
                Some(p) => p,
                None => {
                    self.done = true;
                    return Ok(None);
                }
            },
        };

        let mut bytes: Vec<u8> = Vec::with_capacity(64 * 1024);
        let mut prev_line_was_empty = false;
        let mut truncated = false;

        loop {
            let line_offset = self.offset;
            if !self.read_line()? {
                self.done = true;
                break;
            }

            if is_mbox_separator(&self.line_buf) {
                if !prev_line_was_empty {
                    warn!(
                        offset = line_offset,
                        "Found 'From ' separator without preceding blank line"
                    );
                }
                self.pending = Some((line_offset, self.line_buf.clone()));
                break;
            }

            prev_line_was_empty = is_blank_line(&self.line_buf);

            let line = if self.options.unescape_from && is_quoted_from(&self.line_buf) {
                &self.line_buf[1..]
            } else {
                &self.line_buf[..]
            };

            if truncated {
                continue;
            }
            if bytes.len() + line.len() <= self.options.max_message_size {
                bytes.extend_from_slice(line);
            } else {
                warn!(
                    offset = start,
                    max_size = self.options.max_message_size,
                    "Message exceeds maximum size, truncating body"
                );
                truncated = true;
            }
        }

        if !truncated {
            strip_framing_blank_line(&mut bytes);
        }

        self.count += 1;
        Ok(Some(RawMessage {
            index: self.count,
            offset: start,
            envelope: envelope_text(&separator),
            bytes,
            truncated,
        }))
    }
}

impl<R: BufRead> Iterator for MboxReader<R> {
    type Item = Result<RawMessage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done && self.pending.is_none() {
            return None;
        }
        match self.read_message() {
            Ok(Some(msg)) => Some(Ok(msg)),
            Ok(None) => None,
            Err(e) => Some(Err(self.unreadable(e))),
        }
    }
}

/// Check whether a line is an MBOX separator (`From ` at the start).
fn is_mbox_separator(line: &[u8]) -> bool {
    line.starts_with(b"From ")
}

/// Check for an mboxrd-quoted separator: one or more `>` followed by `From `.
fn is_quoted_from(line: &[u8]) -> bool {
    let unquoted = line.iter().position(|&b| b != b'>').unwrap_or(line.len());
    unquoted > 0 && line[unquoted..].starts_with(b"From ")
}

/// Check whether a line is blank (empty or only whitespace / CR / LF).
fn is_blank_line(line: &[u8]) -> bool {
    line.iter()
        .all(|&b| b == b'\n' || b == b'\r' || b == b' ' || b == b'\t')
}

/// Remove the single blank line that separates a message from the next `From `
/// (or ends the archive).
fn strip_framing_blank_line(bytes: &mut Vec<u8>) {
    if bytes.ends_with(b"\n\r\n") {
        bytes.truncate(bytes.len() - 2);
    } else if bytes.ends_with(b"\n\n") {
        bytes.truncate(bytes.len() - 1);
    }
}

fn envelope_text(separator: &[u8]) -> String {
    let rest = separator.strip_prefix(b"From ").unwrap_or(separator);
    String::from_utf8_lossy(rest).trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(data: &[u8]) -> Vec<RawMessage> {
        MboxReader::from_reader(data, ReaderOptions::default())
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_is_mbox_separator() {
        assert!(is_mbox_separator(
            b"From user@example.com Thu Jan 01 00:00:00 2024\n"
        ));
        assert!(!is_mbox_separator(b"from user@example.com\n")); // lowercase
        assert!(!is_mbox_separator(b">From user@example.com\n")); // escaped
        assert!(!is_mbox_separator(b"Subject: From here\n"));
    }

    #[test]
    fn test_is_quoted_from() {
        assert!(is_quoted_from(b">From the start\n"));
        assert!(is_quoted_from(b">>From nested\n"));
        assert!(!is_quoted_from(b"> From quoted reply\n"));
        assert!(!is_quoted_from(b"From bare\n"));
        assert!(!is_quoted_from(b">>>\n"));
    }

    #[test]
    fn test_is_blank_line() {
        assert!(is_blank_line(b"\n"));
        assert!(is_blank_line(b"\r\n"));
        assert!(is_blank_line(b"  \n"));
        assert!(!is_blank_line(b"hello\n"));
    }

    #[test]
    fn test_splits_messages_and_strips_framing() {
        let data = b"From a@b.com Mon Jan 01 00:00:00 2024\n\
Subject: One\n\
\n\
Body one\n\
\n\
From c@d.com Mon Jan 01 00:00:00 2024\n\
Subject: Two\n\
\n\
Body two\n";
        let msgs = read_all(data);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].index, 1);
        assert_eq!(msgs[0].envelope, "a@b.com Mon Jan 01 00:00:00 2024");
        assert_eq!(msgs[0].bytes, b"Subject: One\n\nBody one\n");
        assert_eq!(msgs[1].index, 2);
        assert_eq!(msgs[1].bytes, b"Subject: Two\n\nBody two\n");
    }

    #[test]
    fn test_offsets_point_at_separators() {
        let data = b"From a\nX: 1\n\nb\n\nFrom c\nX: 2\n\nd\n";
        let msgs = read_all(data);
        assert_eq!(msgs[0].offset, 0);
        assert_eq!(msgs[1].offset, 16);
        assert_eq!(&data[16..22], b"From c");
    }

    #[test]
    fn test_unescapes_quoted_from() {
        let data = b"From a\nSubject: q\n\n>From the start\n>>From nested\n> From reply\n";
        let msgs = read_all(data);
        assert_eq!(msgs.len(), 1);
        assert_eq!(
            msgs[0].bytes,
            b"Subject: q\n\nFrom the start\n>From nested\n> From reply\n"
        );
    }

    #[test]
    fn test_keeps_quoting_when_disabled() {
        let options = ReaderOptions {
            unescape_from: false,
            ..ReaderOptions::default()
        };
        let data: &[u8] = b"From a\nSubject: q\n\n>From here\n";
        let msgs: Vec<_> = MboxReader::from_reader(data, options)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(msgs[0].bytes, b"Subject: q\n\n>From here\n");
    }

    #[test]
    fn test_separator_without_blank_line_still_splits() {
        let data = b"From a\nSubject: 1\n\nbody\nFrom b\nSubject: 2\n\nbody\n";
        let msgs = read_all(data);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].bytes, b"Subject: 1\n\nbody\n");
    }

    #[test]
    fn test_crlf_framing() {
        let data = b"From a\r\nSubject: 1\r\n\r\nbody\r\n\r\nFrom b\r\nSubject: 2\r\n\r\nx\r\n";
        let msgs = read_all(data);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].bytes, b"Subject: 1\r\n\r\nbody\r\n");
    }

    #[test]
    fn test_truncated_final_message() {
        let data = b"From a\nSubject: 1\n\nfull\n\nFrom b\nSubject: cut";
        let msgs = read_all(data);
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[1].bytes, b"Subject: cut");
    }

    #[test]
    fn test_preamble_is_skipped() {
        let data = b"garbage line\n\nFrom a\nSubject: 1\n\nx\n";
        let msgs = read_all(data);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].offset, 14);
    }

    #[test]
    fn test_bom_before_first_separator() {
        let mut data = UTF8_BOM.to_vec();
        data.extend_from_slice(b"From a\nSubject: 1\n\nx\n");
        let msgs = read_all(&data);
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].envelope, "a");
    }

    #[test]
    fn test_empty_input() {
        assert!(read_all(b"").is_empty());
        assert!(read_all(b"no separators at all\n").is_empty());
    }

    #[test]
    fn test_max_message_size_truncates() {
        let options = ReaderOptions {
            max_message_size: 16,
            ..ReaderOptions::default()
        };
        let data: &[u8] = b"From a\nSubject: 1\n\nlong body line\n\nFrom b\nS: 2\n\nx\n";
        let msgs: Vec<_> = MboxReader::from_reader(data, options)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(msgs.len(), 2);
        assert!(msgs[0].truncated);
        assert_eq!(msgs[0].bytes, b"Subject: 1\n\n");
        assert!(!msgs[1].truncated);
    }

    #[test]
    fn test_open_missing_file() {
        let err = MboxReader::open("/definitely/not/here.mbox", ReaderOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, ConvertError::ArchiveNotFound(_)));
    }

    #[test]
    fn test_open_directory_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let err = MboxReader::open(dir.path(), ReaderOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, ConvertError::ArchiveUnreadable { .. }));
    }
}
