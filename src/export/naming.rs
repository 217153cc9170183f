//! File naming: header sanitizing, index-prefixed stems, and collision-free creation.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};
use crate::model::address::EmailAddress;
use crate::model::message::MessageRecord;
use crate::parser::header::{decode_encoded_words, DecodeFallback};

/// Placeholder for empty components in detailed mode.
pub const UNNAMED: &str = "unnamed_email";

/// Placeholder for an empty subject in simple mode.
pub const NO_SUBJECT: &str = "No_Subject";

/// Marker appended to truncated names.
const ELLIPSIS: &str = "...";

/// Characters that are never allowed in a sanitized name.
const FORBIDDEN: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Stop probing for a free name after this many suffixes.
const MAX_SUFFIX: u32 = 100_000;

/// UTF-8 byte ceiling for one name component. Two components plus the index,
/// a collision suffix and the extension stay well under the 255-byte file name
/// limit of common filesystems.
pub const MAX_COMPONENT_BYTES: usize = 100;

/// A filesystem-safe name component.
///
/// Never empty, never longer than the bound it was built with (nor than
/// [`MAX_COMPONENT_BYTES`] bytes), free of path separators, reserved
/// characters, and control characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedName {
    name: String,
    fallbacks: Vec<DecodeFallback>,
}

impl SanitizedName {
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Encoded-words that could not be decoded while building the name.
    pub fn fallbacks(&self) -> &[DecodeFallback] {
        &self.fallbacks
    }

    pub fn into_string(self) -> String {
        self.name
    }
}

impl std::fmt::Display for SanitizedName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Turn an arbitrary (possibly RFC 2047 encoded) header value into a safe name.
///
/// Steps: decode encoded-words, collapse whitespace runs to one space, replace
/// reserved and control characters with `_`, trim, truncate (with a `...`
/// marker when there is room), and substitute `placeholder` if nothing is
/// left. Pure: no I/O.
///
/// Whitespace is collapsed before control characters are replaced, so CR, LF
/// and TAB inside a value become a single space rather than `_`.
///
/// The result holds at most `max_len` characters and at most
/// [`MAX_COMPONENT_BYTES`] bytes; truncation always lands on a character
/// boundary.
pub fn sanitize(value: &str, max_len: usize, placeholder: &str) -> SanitizedName {
    let max_len = max_len.max(1);
    let decoded = decode_encoded_words(value);

    let mut cleaned = String::with_capacity(decoded.text.len());
    let mut in_space = false;
    for c in decoded.text.chars() {
        if c.is_whitespace() {
            if !in_space {
                cleaned.push(' ');
            }
            in_space = true;
            continue;
        }
        in_space = false;
        if c.is_control() || FORBIDDEN.contains(&c) {
            cleaned.push('_');
        } else {
            cleaned.push(c);
        }
    }

    let trimmed = cleaned.trim();
    let name = if trimmed.is_empty() {
        prefix_within(placeholder, max_len, MAX_COMPONENT_BYTES).to_string()
    } else if trimmed.chars().count() <= max_len && trimmed.len() <= MAX_COMPONENT_BYTES {
        trimmed.to_string()
    } else if max_len >= 4 {
        let kept = prefix_within(trimmed, max_len - 4, MAX_COMPONENT_BYTES - ELLIPSIS.len());
        format!("{}{ELLIPSIS}", kept.trim_end())
    } else {
        prefix_within(trimmed, max_len, MAX_COMPONENT_BYTES).to_string()
    };

    SanitizedName {
        name,
        fallbacks: decoded.fallbacks,
    }
}

/// Longest prefix of `s` with at most `max_chars` characters and `max_bytes` bytes.
fn prefix_within(s: &str, max_chars: usize, max_bytes: usize) -> &str {
    let end = s
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take(max_chars)
        .take_while(|&end| end <= max_bytes)
        .last()
        .unwrap_or(0);
    &s[..end]
}

/// Which file name layout to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamingMode {
    /// `{index:04}_{subject}_{sender}.eml`, placeholder `unnamed_email`.
    #[default]
    Detailed,
    /// `{index:05}_{subject}.eml`, placeholder `No_Subject`.
    Simple,
}

/// Naming parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingOptions {
    pub mode: NamingMode,
    pub subject_max_len: usize,
    pub sender_max_len: usize,
    /// Subject bound used in simple mode.
    pub simple_subject_max_len: usize,
}

impl Default for NamingOptions {
    fn default() -> Self {
        Self {
            mode: NamingMode::Detailed,
            subject_max_len: 100,
            sender_max_len: 100,
            simple_subject_max_len: 50,
        }
    }
}

impl NamingOptions {
    /// Reject zero-length bounds.
    pub fn validate(&self) -> Result<()> {
        let bounds = [
            ("subject_max_len", self.subject_max_len),
            ("sender_max_len", self.sender_max_len),
            ("simple_subject_max_len", self.simple_subject_max_len),
        ];
        for (name, value) in bounds {
            if value == 0 {
                return Err(ConvertError::Configuration(format!(
                    "{name} must be at least 1"
                )));
            }
        }
        Ok(())
    }
}

/// A file stem for one message plus the decode fallbacks met while building it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStem {
    pub stem: String,
    pub fallbacks: Vec<DecodeFallback>,
}

/// Build the index-prefixed file stem (no extension) for a message.
pub fn file_stem(record: &MessageRecord, options: &NamingOptions) -> FileStem {
    let subject_raw = record
        .header_value("subject")
        .unwrap_or_else(|| "No Subject".to_string());

    match options.mode {
        NamingMode::Simple => {
            let subject = sanitize(&subject_raw, options.simple_subject_max_len, NO_SUBJECT);
            FileStem {
                stem: format!("{:05}_{}", record.index, subject),
                fallbacks: subject.fallbacks,
            }
        }
        NamingMode::Detailed => {
            let subject = sanitize(&subject_raw, options.subject_max_len, UNNAMED);

            let from_raw = record
                .header_value("from")
                .unwrap_or_else(|| "Unknown Sender".to_string());
            let from_decoded = decode_encoded_words(&from_raw);
            let sender = EmailAddress::parse(&from_decoded.text);
            let sender = sanitize(sender.sender_token(), options.sender_max_len, UNNAMED);

            let mut fallbacks = subject.fallbacks.clone();
            fallbacks.extend(from_decoded.fallbacks);
            FileStem {
                stem: format!("{:04}_{}_{}", record.index, subject, sender),
                fallbacks,
            }
        }
    }
}

/// Create `{dir}/{stem}.{ext}` exclusively, falling back to `{stem}_1.{ext}`,
/// `{stem}_2.{ext}`, … when the name is taken. Never opens an existing file.
pub fn create_unique(dir: &Path, stem: &str, ext: &str) -> Result<(PathBuf, File)> {
    let name = |suffix: String| {
        if ext.is_empty() {
            format!("{stem}{suffix}")
        } else {
            format!("{stem}{suffix}.{ext}")
        }
    };

    let mut candidate = dir.join(name(String::new()));
    for counter in 1..=MAX_SUFFIX {
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(file) => return Ok((candidate, file)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                candidate = dir.join(name(format!("_{counter}")));
            }
            Err(e) => return Err(ConvertError::write(&candidate, e)),
        }
    }
    Err(ConvertError::write(
        &candidate,
        std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            "no free file name left for this stem",
        ),
    ))
}

/// Split a file name into stem and extension for [`create_unique`].
pub fn split_file_name(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => (&name[..pos], &name[pos + 1..]),
        _ => (name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::message::Header;

    fn record(index: u64, headers: &[(&str, &str)]) -> MessageRecord {
        MessageRecord {
            index,
            headers: headers.iter().map(|(n, v)| Header::new(*n, v)).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_sanitize_replaces_reserved_characters() {
        let name = sanitize(r#"a<b>c:d"e/f\g|h?i*j"#, 100, UNNAMED);
        assert_eq!(name.as_str(), "a_b_c_d_e_f_g_h_i_j");
    }

    #[test]
    fn test_sanitize_collapses_whitespace_and_trims() {
        let name = sanitize("  Hello \t\r\n   World  ", 100, UNNAMED);
        assert_eq!(name.as_str(), "Hello World");
    }

    #[test]
    fn test_sanitize_replaces_control_characters() {
        let name = sanitize("bell\u{7}null\u{0}del\u{7f}", 100, UNNAMED);
        assert_eq!(name.as_str(), "bell_null_del_");
    }

    #[test]
    fn test_sanitize_truncates_with_ellipsis() {
        let long = "x".repeat(150);
        let name = sanitize(&long, 100, UNNAMED);
        assert_eq!(name.as_str().chars().count(), 99);
        assert!(name.as_str().ends_with("..."));
    }

    #[test]
    fn test_sanitize_truncates_by_characters_not_bytes() {
        let name = sanitize("ñandú ñandú ñandú", 10, UNNAMED);
        assert_eq!(name.as_str(), "ñandú...");
        assert!(name.as_str().chars().count() <= 10);
    }

    #[test]
    fn test_sanitize_caps_multibyte_names_in_bytes() {
        let name = sanitize(&"日本語".repeat(40), 100, UNNAMED);
        let s = name.as_str();
        assert!(s.len() <= MAX_COMPONENT_BYTES, "{} bytes", s.len());
        assert!(s.ends_with("..."));
        assert!(s.starts_with("日本語日本語"));

        let short = sanitize(&"ü".repeat(60), 100, UNNAMED);
        assert_eq!(short.as_str().chars().count(), 48 + 3);
        assert!(short.as_str().len() <= MAX_COMPONENT_BYTES);
    }

    #[test]
    fn test_sanitize_line_breaks_become_spaces() {
        let name = sanitize("one\r\ntwo\tthree", 100, UNNAMED);
        assert_eq!(name.as_str(), "one two three");
    }

    #[test]
    fn test_sanitize_tiny_bound() {
        assert_eq!(sanitize("abcdef", 3, UNNAMED).as_str(), "abc");
        assert_eq!(sanitize("", 3, UNNAMED).as_str(), "unn");
        assert_eq!(sanitize("abc", 0, UNNAMED).as_str(), "a");
    }

    #[test]
    fn test_sanitize_empty_uses_placeholder() {
        assert_eq!(sanitize("", 100, UNNAMED).as_str(), "unnamed_email");
        assert_eq!(sanitize("   \t ", 100, NO_SUBJECT).as_str(), "No_Subject");
    }

    #[test]
    fn test_sanitize_decodes_encoded_words() {
        let name = sanitize("=?UTF-8?Q?Caf=C3=A9_con_le=C3=B1a?=", 100, UNNAMED);
        assert_eq!(name.as_str(), "Café con leña");
        assert!(name.fallbacks().is_empty());
    }

    #[test]
    fn test_sanitize_reports_decode_fallback() {
        let name = sanitize("=?UTF-8?B?***?=", 100, UNNAMED);
        assert_eq!(name.as_str(), "_");
        assert_eq!(name.fallbacks().len(), 1);
    }

    #[test]
    fn test_sanitize_never_produces_unsafe_output() {
        let inputs = [
            "", " ", "/", "../../etc/passwd", "a\0b", "\u{1f}\u{1e}", "<>:\"/\\|?*",
            "=?UTF-8?B?Lw==?=", "C:\\Windows\\System32", "line\nbreak", "ok",
        ];
        for input in inputs {
            for max_len in [1usize, 2, 5, 10, 100] {
                let name = sanitize(input, max_len, UNNAMED);
                let s = name.as_str();
                assert!(!s.is_empty(), "empty for {input:?}");
                assert!(s.chars().count() <= max_len, "too long for {input:?}");
                assert!(!s.contains(FORBIDDEN), "reserved char for {input:?}");
                assert!(!s.chars().any(|c| c.is_control()), "control for {input:?}");
            }
        }
    }

    #[test]
    fn test_detailed_stem() {
        let r = record(1, &[("From", "Alice <a@b.com>"), ("Subject", "Hello")]);
        let stem = file_stem(&r, &NamingOptions::default());
        assert_eq!(stem.stem, "0001_Hello_a@b.com");
        assert!(stem.fallbacks.is_empty());
    }

    #[test]
    fn test_detailed_stem_fits_file_name_limit() {
        let subject = "日本語".repeat(40);
        let sender = format!("{}@example.com", "ü".repeat(60));
        let r = record(9999, &[("From", sender.as_str()), ("Subject", subject.as_str())]);
        let stem = file_stem(&r, &NamingOptions::default());
        assert!(stem.stem.starts_with("9999_日本語"));
        assert!(stem.stem.len() + "_99999.eml".len() <= 255, "{} bytes", stem.stem.len());
    }

    #[test]
    fn test_detailed_stem_missing_headers() {
        let r = record(12, &[]);
        let stem = file_stem(&r, &NamingOptions::default());
        assert_eq!(stem.stem, "0012_No Subject_Unknown Sender");
    }

    #[test]
    fn test_detailed_stem_encoded_sender_name() {
        let r = record(3, &[("From", "=?UTF-8?B?Sm9zw6k=?="), ("Subject", "x")]);
        let stem = file_stem(&r, &NamingOptions::default());
        assert_eq!(stem.stem, "0003_x_José");
    }

    #[test]
    fn test_simple_stem() {
        let options = NamingOptions {
            mode: NamingMode::Simple,
            ..NamingOptions::default()
        };
        let r = record(7, &[("Subject", "Quarterly: report?")]);
        assert_eq!(file_stem(&r, &options).stem, "00007_Quarterly_ report_");

        let r = record(8, &[("Subject", "")]);
        assert_eq!(file_stem(&r, &options).stem, "00008_No_Subject");
    }

    #[test]
    fn test_validate_rejects_zero_bounds() {
        let options = NamingOptions {
            sender_max_len: 0,
            ..NamingOptions::default()
        };
        assert!(matches!(
            options.validate(),
            Err(ConvertError::Configuration(_))
        ));
        assert!(NamingOptions::default().validate().is_ok());
    }

    #[test]
    fn test_create_unique_appends_counter() {
        let dir = tempfile::tempdir().unwrap();
        let (p0, _) = create_unique(dir.path(), "0001_Hello", "eml").unwrap();
        let (p1, _) = create_unique(dir.path(), "0001_Hello", "eml").unwrap();
        let (p2, _) = create_unique(dir.path(), "0001_Hello", "eml").unwrap();
        assert_eq!(p0.file_name().unwrap(), "0001_Hello.eml");
        assert_eq!(p1.file_name().unwrap(), "0001_Hello_1.eml");
        assert_eq!(p2.file_name().unwrap(), "0001_Hello_2.eml");
    }

    #[test]
    fn test_create_unique_missing_dir_is_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = create_unique(&missing, "x", "eml").unwrap_err();
        assert!(matches!(err, ConvertError::Write { .. }));
    }

    #[test]
    fn test_split_file_name() {
        assert_eq!(split_file_name("0001_a.eml"), ("0001_a", "eml"));
        assert_eq!(split_file_name("a.b.eml"), ("a.b", "eml"));
        assert_eq!(split_file_name("noext"), ("noext", ""));
    }
}
