//! Incremental line extraction over raw socket reads
//!
//! Servers deliver bytes in arbitrary chunks. [`LineBuffer`] owns
//! everything read so far and hands out complete lines one at a time,
//! keeping any partial trailing line until the next read completes it.

/// Maximum line length handed to callers, including the terminator.
pub const MAX_LINE_LEN: usize = 1024;

/// Owned byte queue that yields newline-terminated lines.
#[derive(Debug, Default, Clone)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            pending: Vec::new(),
        }
    }

    /// Append a freshly read chunk.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Bytes buffered but not yet returned as a line.
    #[must_use]
    pub fn peek(&self) -> &[u8] {
        &self.pending
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop everything buffered.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Remove and return the next line, at most `max_len - 1` bytes.
    ///
    /// A line ends at `\n` (kept in the result) or at a NUL byte
    /// (consumed, not kept). When neither appears within the limit and
    /// the buffer already holds `max_len - 1` bytes, the over-long line
    /// is cut at the limit. Otherwise `None` is returned and nothing is
    /// consumed; read more bytes and retry.
    pub fn extract_line(&mut self, max_len: usize) -> Option<Vec<u8>> {
        let limit = max_len.saturating_sub(1);
        if limit == 0 {
            return None;
        }

        let window = &self.pending[..self.pending.len().min(limit)];
        match window.iter().position(|&b| b == b'\n' || b == 0) {
            Some(pos) if self.pending[pos] == b'\n' => Some(self.consume(pos + 1, pos + 1)),
            Some(pos) => Some(self.consume(pos, pos + 1)),
            None if self.pending.len() >= limit => Some(self.consume(limit, limit)),
            None => None,
        }
    }

    /// Take `consumed` bytes off the front, returning the first `keep`.
    fn consume(&mut self, keep: usize, consumed: usize) -> Vec<u8> {
        let mut line: Vec<u8> = self.pending.drain(..consumed).collect();
        line.truncate(keep);
        line
    }
}
