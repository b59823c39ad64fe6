//! Server reply classification
//!
//! POP3 answers every command with a single status line: `+OK ...` for
//! success, anything else (normally `-ERR ...`) for failure. The counts
//! mailbiff cares about ride along as the first number after `+OK`.

use std::fmt;

/// A status line received from a mail server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerReply {
    line: String,
}

impl ServerReply {
    /// Wrap a raw line; trailing CR/LF is dropped.
    #[must_use]
    pub fn new(line: &str) -> Self {
        Self {
            line: line.trim_end_matches(['\r', '\n']).to_string(),
        }
    }

    /// `true` for `+OK` replies.
    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.line.starts_with("+OK")
    }

    /// `true` for a SASL continuation (`+ <base64>`).
    #[must_use]
    pub fn is_continuation(&self) -> bool {
        self.line.starts_with("+ ")
    }

    /// Payload of a continuation line.
    #[must_use]
    pub fn continuation_data(&self) -> Option<&str> {
        self.line.strip_prefix("+ ").map(str::trim)
    }

    /// First integer following `+OK`, if the reply is positive.
    #[must_use]
    pub fn count(&self) -> Option<i64> {
        let rest = self.line.strip_prefix("+OK")?;
        leading_integer(rest.trim_start())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.line
    }
}

impl fmt::Display for ServerReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line)
    }
}

/// Parse an optionally signed decimal integer at the start of `s`.
pub(crate) fn leading_integer(s: &str) -> Option<i64> {
    let digits_start = usize::from(s.starts_with(['-', '+']));
    let end = s[digits_start..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(s.len(), |i| i + digits_start);
    if end == digits_start {
        return None;
    }
    s[..end].parse().ok()
}

/// Extract the APOP challenge from a POP3 greeting.
///
/// Scans from the end of the line: the last `<` wins, paired with the
/// first `>` after it. The returned token excludes the brackets.
#[must_use]
pub fn apop_challenge(greeting: &str) -> Option<&str> {
    let open = greeting.rfind('<')?;
    let close = greeting[open..].find('>')? + open;
    Some(&greeting[open + 1..close])
}
