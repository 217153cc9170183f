//! Sender address extraction for file naming.

/// A sender split into display name and bare address.
///
/// # Examples
/// - `"Juan García <juan@ejemplo.com>"` → `display_name = "Juan García"`, `address = "juan@ejemplo.com"`
/// - `"juan@ejemplo.com (Juan)"` → `display_name = "(Juan)"`, `address = "juan@ejemplo.com"`
/// - `"Undisclosed"` → `display_name = "Undisclosed"`, `address = ""`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EmailAddress {
    /// Human-readable display name (may be empty).
    pub display_name: String,
    /// The bare email address (`user@domain`), empty if none was found.
    pub address: String,
}

impl EmailAddress {
    /// Parse a decoded `From` value.
    ///
    /// Angle-bracket form wins when it contains an address; otherwise the
    /// first address-looking token anywhere in the value is used.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::default();
        }

        if let (Some(start), Some(end)) = (trimmed.rfind('<'), trimmed.rfind('>')) {
            if end > start {
                let inner = trimmed[start + 1..end].trim();
                if let Some(addr) = find_address(inner) {
                    return Self {
                        display_name: strip_quotes(&trimmed[..start]),
                        address: addr.to_string(),
                    };
                }
            }
        }

        match find_address(trimmed) {
            Some(addr) => {
                let rest = trimmed.replacen(addr, "", 1);
                Self {
                    display_name: strip_quotes(&rest),
                    address: addr.to_string(),
                }
            }
            None => Self {
                display_name: strip_quotes(trimmed),
                address: String::new(),
            },
        }
    }

    /// Token used for the sender part of a file name: the address if one
    /// was found, otherwise the display name.
    pub fn sender_token(&self) -> &str {
        if self.address.is_empty() {
            &self.display_name
        } else {
            &self.address
        }
    }
}

/// Find the first `[\w.-]+@[\w.-]+` run in `s`.
pub fn find_address(s: &str) -> Option<&str> {
    let is_part = |c: char| c.is_alphanumeric() || c == '_' || c == '.' || c == '-';

    for (at, _) in s.match_indices('@') {
        let start = s[..at]
            .char_indices()
            .rev()
            .take_while(|&(_, c)| is_part(c))
            .last()
            .map(|(i, _)| i);
        let end = s[at + 1..]
            .char_indices()
            .take_while(|&(_, c)| is_part(c))
            .last()
            .map(|(i, c)| at + 1 + i + c.len_utf8());

        if let (Some(start), Some(end)) = (start, end) {
            return Some(&s[start..end]);
        }
    }
    None
}

/// Strip surrounding double-quotes and trim whitespace.
fn strip_quotes(s: &str) -> String {
    let trimmed = s.trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.display_name.is_empty(), self.address.is_empty()) {
            (_, true) => write!(f, "{}", self.display_name),
            (true, false) => write!(f, "{}", self.address),
            (false, false) => write!(f, "{} <{}>", self.display_name, self.address),
        }
    }
}
