//! RFC 5322 header lines and RFC 2047 encoded-word decoding.
//!
//! Decoding is best effort. Words that look like encoded-words but cannot be
//! decoded are reported as [`DecodeFallback`] values instead of errors.

use std::fmt;

use tracing::debug;

/// Text substituted for an encoded-word whose payload could not be decoded.
pub const PLACEHOLDER_SEGMENT: &str = "_";

/// Why an encoded-word was not decoded cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// Encoding letter other than `B` or `Q`.
    UnknownEncoding(String),
    /// Base64 payload with invalid characters or length.
    InvalidPayload,
    /// Charset label unknown to `encoding_rs`; bytes were read as lossy UTF-8.
    UnknownCharset(String),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownEncoding(e) => write!(f, "unknown encoding '{e}'"),
            Self::InvalidPayload => write!(f, "invalid encoded payload"),
            Self::UnknownCharset(c) => write!(f, "unknown charset '{c}'"),
        }
    }
}

/// A recoverable decoding problem. Never aborts anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeFallback {
    /// The offending encoded-word, verbatim.
    pub word: String,
    pub reason: FallbackReason,
}

/// Decoded header text plus any fallbacks taken while producing it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    pub fallbacks: Vec<DecodeFallback>,
}

impl DecodedText {
    pub fn is_clean(&self) -> bool {
        self.fallbacks.is_empty()
    }
}

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
pub fn decode_header_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Split a header line into `(name, raw_value)`.
///
/// Returns `None` if the line is not a syntactically valid field: the name
/// must be non-empty printable ASCII without spaces or colons.
pub fn split_header_line(line: &str) -> Option<(&str, &str)> {
    let colon = line.find(':')?;
    let name = &line[..colon];
    if name.is_empty() || !name.bytes().all(|b| (33..=126).contains(&b)) {
        return None;
    }
    Some((name, &line[colon + 1..]))
}

/// Decode RFC 2047 encoded-words in a header value.
///
/// Example: `"=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="` → `"Hola mundo"`
///
/// Whitespace between two adjacent encoded-words is dropped (RFC 2047 §6.2).
/// Text that is not an encoded-word is copied unchanged.
pub fn decode_encoded_words(input: &str) -> DecodedText {
    let mut out = DecodedText {
        text: String::with_capacity(input.len()),
        fallbacks: Vec::new(),
    };
    let mut remaining = input;
    let mut last_was_encoded = false;

    while let Some(start) = remaining.find("=?") {
        let before = &remaining[..start];
        if !last_was_encoded || !before.trim().is_empty() {
            out.text.push_str(before);
        }

        let after_start = &remaining[start + 2..];
        match parse_word(after_start) {
            Some(word) => {
                let verbatim = &remaining[start..start + 2 + word.consumed];
                match decode_word(&word) {
                    Ok(text) => out.text.push_str(&text),
                    Err(fallback) => {
                        debug!(word = verbatim, reason = %fallback.0, "Encoded-word fallback");
                        if let Some(text) = fallback.1 {
                            out.text.push_str(&text);
                        } else {
                            out.text.push_str(PLACEHOLDER_SEGMENT);
                        }
                        out.fallbacks.push(DecodeFallback {
                            word: verbatim.to_string(),
                            reason: fallback.0,
                        });
                    }
                }
                remaining = &remaining[start + 2 + word.consumed..];
                last_was_encoded = true;
            }
            None => {
                out.text.push_str("=?");
                remaining = after_start;
                last_was_encoded = false;
            }
        }
    }

    out.text.push_str(remaining);
    out
}

struct EncodedWord<'a> {
    charset: &'a str,
    encoding: &'a str,
    payload: &'a str,
    consumed: usize, // bytes consumed from the string *after* the initial "=?"
}

/// Recognize `charset?encoding?payload?=`. Syntax only, no decoding.
fn parse_word(s: &str) -> Option<EncodedWord<'_>> {
    let first_q = s.find('?')?;
    let charset = &s[..first_q];

    let rest = &s[first_q + 1..];
    let second_q = rest.find('?')?;
    let encoding = &rest[..second_q];

    let rest2 = &rest[second_q + 1..];
    let end = rest2.find("?=")?;
    let payload = &rest2[..end];

    let no_space = |t: &str| !t.chars().any(char::is_whitespace);
    if charset.is_empty() || encoding.is_empty() || !no_space(charset) || !no_space(encoding) {
        return None;
    }
    if !no_space(payload) {
        return None;
    }

    Some(EncodedWord {
        charset,
        encoding,
        payload,
        consumed: first_q + 1 + second_q + 1 + end + 2,
    })
}

/// Decode one recognized word. On failure returns the reason and, when
/// something usable was still recovered, the recovered text.
fn decode_word(word: &EncodedWord<'_>) -> Result<String, (FallbackReason, Option<String>)> {
    let bytes = match word.encoding.to_ascii_uppercase().as_str() {
        "B" => decode_base64(word.payload).ok_or((FallbackReason::InvalidPayload, None))?,
        "Q" => decode_q_encoding(word.payload),
        other => return Err((FallbackReason::UnknownEncoding(other.to_string()), None)),
    };

    // RFC 2231 language suffix: "utf-8*en"
    let charset = word.charset.split('*').next().unwrap_or(word.charset);
    decode_charset(charset, &bytes).map_err(|lossy| {
        (
            FallbackReason::UnknownCharset(charset.to_string()),
            Some(lossy),
        )
    })
}

/// Strict base64 decoding. Missing `=` padding is tolerated.
fn decode_base64(input: &str) -> Option<Vec<u8>> {
    let data = input.trim_end_matches('=').as_bytes();
    if data.len() % 4 == 1 {
        return None;
    }

    let mut out = Vec::with_capacity(data.len() * 3 / 4);
    let mut acc: u32 = 0;
    let mut bits = 0u32;
    for &c in data {
        acc = (acc << 6) | u32::from(b64val(c)?);
        bits += 6;
        if bits >= 8 {
            bits -= 8;
            out.push((acc >> bits) as u8);
            acc &= (1 << bits) - 1;
        }
    }
    Some(out)
}

fn b64val(c: u8) -> Option<u8> {
    match c {
        b'A'..=b'Z' => Some(c - b'A'),
        b'a'..=b'z' => Some(c - b'a' + 26),
        b'0'..=b'9' => Some(c - b'0' + 52),
        b'+' => Some(62),
        b'/' => Some(63),
        _ => None,
    }
}

/// Decode Q-encoding (RFC 2047): underscores → spaces, `=XX` → byte.
///
/// A stray `=` that is not followed by two hex digits is kept literally.
fn decode_q_encoding(input: &str) -> Vec<u8> {
    let bytes = input.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' if i + 2 < bytes.len() => {
                match (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        result.push((hi << 4) | lo);
                        i += 3;
                    }
                    _ => {
                        result.push(b'=');
                        i += 1;
                    }
                }
            }
            b => {
                result.push(b);
                i += 1;
            }
        }
    }
    result
}

fn hex_val(c: u8) -> Option<u8> {
    (c as char).to_digit(16).map(|d| d as u8)
}

/// Decode bytes using a named charset. `Err` carries a lossy UTF-8 rendering
/// when the label is unknown.
fn decode_charset(charset: &str, bytes: &[u8]) -> Result<String, String> {
    match charset.to_ascii_lowercase().as_str() {
        "utf-8" | "utf8" | "us-ascii" => Ok(String::from_utf8_lossy(bytes).into_owned()),
        _ => match encoding_rs::Encoding::for_label(charset.as_bytes()) {
            Some(encoding) => {
                let (decoded, _, _) = encoding.decode(bytes);
                Ok(decoded.into_owned())
            }
            None => Err(String::from_utf8_lossy(bytes).into_owned()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(input: &str) -> String {
        decode_encoded_words(input).text
    }

    #[test]
    fn test_decode_base64_encoded_word() {
        assert_eq!(decode("=?UTF-8?B?SG9sYSBtdW5kbw==?="), "Hola mundo");
    }

    #[test]
    fn test_decode_q_encoded_word() {
        assert_eq!(decode("=?ISO-8859-1?Q?caf=E9?="), "café");
    }

    #[test]
    fn test_decode_multiple_encoded_words() {
        assert_eq!(decode("=?UTF-8?B?SG9sYQ==?= =?UTF-8?B?IG11bmRv?="), "Hola mundo");
    }

    #[test]
    fn test_decode_mixed_plain_and_encoded() {
        assert_eq!(decode("Re: =?UTF-8?B?SG9sYQ==?= there"), "Re: Hola there");
    }

    #[test]
    fn test_decode_iso8859_encoded_word() {
        assert_eq!(decode("=?ISO-8859-1?Q?R=E9sum=E9_du_projet?="), "Résumé du projet");
    }

    #[test]
    fn test_decode_utf8_base64_japanese() {
        assert_eq!(decode("=?UTF-8?B?5bGx55Sw5aSq6YOO?="), "山田太郎");
    }

    #[test]
    fn test_decode_windows1252_encoded_word() {
        assert_eq!(decode("=?Windows-1252?Q?M=FCller?="), "Müller");
    }

    #[test]
    fn test_decode_missing_padding() {
        assert_eq!(decode("=?UTF-8?B?SG9sYQ?="), "Hola");
    }

    #[test]
    fn test_plain_text_is_clean() {
        let decoded = decode_encoded_words("Normal subject");
        assert_eq!(decoded.text, "Normal subject");
        assert!(decoded.is_clean());
    }

    #[test]
    fn test_not_an_encoded_word_passes_through() {
        let decoded = decode_encoded_words("a =? b ?= c");
        assert_eq!(decoded.text, "a =? b ?= c");
        assert!(decoded.is_clean());
    }

    #[test]
    fn test_invalid_base64_falls_back_to_placeholder() {
        let decoded = decode_encoded_words("Hi =?UTF-8?B?!!!!?= there");
        assert_eq!(decoded.text, "Hi _ there");
        assert_eq!(decoded.fallbacks.len(), 1);
        assert_eq!(decoded.fallbacks[0].word, "=?UTF-8?B?!!!!?=");
        assert_eq!(decoded.fallbacks[0].reason, FallbackReason::InvalidPayload);
    }

    #[test]
    fn test_unknown_encoding_falls_back() {
        let decoded = decode_encoded_words("=?UTF-8?X?abc?=");
        assert_eq!(decoded.text, PLACEHOLDER_SEGMENT);
        assert_eq!(
            decoded.fallbacks[0].reason,
            FallbackReason::UnknownEncoding("X".to_string())
        );
    }

    #[test]
    fn test_unknown_charset_decodes_lossy() {
        let decoded = decode_encoded_words("=?x-klingon?Q?Qapla=27?=");
        assert_eq!(decoded.text, "Qapla'");
        assert_eq!(
            decoded.fallbacks[0].reason,
            FallbackReason::UnknownCharset("x-klingon".to_string())
        );
    }

    #[test]
    fn test_q_stray_equals_kept() {
        assert_eq!(decode_q_encoding("a=ZZb"), b"a=ZZb");
        assert_eq!(decode_q_encoding("50="), b"50=");
    }

    #[test]
    fn test_split_header_line() {
        assert_eq!(split_header_line("Subject: Hi"), Some(("Subject", " Hi")));
        assert_eq!(split_header_line("X-Empty:"), Some(("X-Empty", "")));
        assert_eq!(split_header_line("not a header"), None);
        assert_eq!(split_header_line("Bad Name: x"), None);
        assert_eq!(split_header_line(": x"), None);
    }

    #[test]
    fn test_decode_header_bytes_latin1_fallback() {
        assert_eq!(decode_header_bytes(b"Subject: caf\xe9"), "Subject: café");
        assert_eq!(decode_header_bytes("Subject: café".as_bytes()), "Subject: café");
    }
}
