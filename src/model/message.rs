//! In-memory message record produced by the extractor.

/// A single header field.
///
/// `raw` holds everything after the colon exactly as it appeared in the
/// archive, including the leading space and any folding. Folded lines are
/// joined with `\n`; the serializer chooses the final line ending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Field name as written (case preserved).
    pub name: String,
    /// Raw field body, folding preserved.
    pub raw: String,
}

impl Header {
    /// Build a header from a name and an unfolded value (`"Name: value"`).
    pub fn new(name: impl Into<String>, value: &str) -> Self {
        Self {
            name: name.into(),
            raw: format!(" {value}"),
        }
    }

    /// The unfolded, trimmed value. Encoded-words are NOT decoded here.
    pub fn value(&self) -> String {
        let mut out = String::with_capacity(self.raw.len());
        for (i, line) in self.raw.split('\n').enumerate() {
            let line = line.trim_end_matches('\r');
            if i > 0 {
                out.push(' ');
                out.push_str(line.trim_start());
            } else {
                out.push_str(line);
            }
        }
        out.trim().to_string()
    }

    /// Case-insensitive name comparison.
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// One logical email extracted from an archive.
///
/// Headers keep their original order, duplicates included. The body is
/// opaque bytes (possibly multipart) with the archive's line endings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageRecord {
    /// 1-based position within the archive.
    pub index: u64,

    /// Byte offset of the `From ` separator line inside the archive.
    pub offset: u64,

    /// Text of the `From ` separator line after the `From ` prefix, if any.
    pub envelope: Option<String>,

    /// Header fields in source order.
    pub headers: Vec<Header>,

    /// Raw body bytes.
    pub body: Vec<u8>,
}

impl MessageRecord {
    /// First header with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&Header> {
        self.headers.iter().find(|h| h.is(name))
    }

    /// Unfolded value of the first header with the given name.
    pub fn header_value(&self, name: &str) -> Option<String> {
        self.header(name).map(Header::value)
    }

    /// All headers with the given name, in order.
    pub fn headers_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Header> + 'a {
        self.headers.iter().filter(move |h| h.is(name))
    }
}
