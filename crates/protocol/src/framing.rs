//! Newline-delimited framing.
//!
//! A connection is a byte stream of UTF-8 text with one JSON message per
//! line. Reads can split a message anywhere, so [`LineBuffer`] accumulates
//! bytes across reads and only hands out complete lines.

use serde::Serialize;

use crate::error::{ProtocolError, Result};

/// Maximum length of a single line (1 MiB).
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Accumulates partial reads and yields complete lines.
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
    max_line: usize,
    /// Set while skipping the rest of an over-long line.
    discarding: bool,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    /// Create a buffer with the default line limit.
    pub fn new() -> Self {
        Self::with_max_line(MAX_LINE_LENGTH)
    }

    /// Create a buffer with a custom line limit.
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_line,
            discarding: false,
        }
    }

    /// Number of buffered bytes not yet returned as a line.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Append bytes from a read.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Take the next complete line.
    ///
    /// Returns `None` when no full line is buffered. Empty lines are skipped
    /// and a trailing `\r` is stripped. A line longer than the limit yields a
    /// single [`ProtocolError::LineTooLong`] and is dropped up to its newline.
    pub fn next_line(&mut self) -> Option<Result<String>> {
        loop {
            let newline = self.buf.iter().position(|&b| b == b'\n');

            let Some(pos) = newline else {
                if !self.discarding && self.buf.len() > self.max_line {
                    self.buf.clear();
                    self.discarding = true;
                    return Some(Err(ProtocolError::LineTooLong { max: self.max_line }));
                }
                if self.discarding {
                    self.buf.clear();
                }
                return None;
            };

            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();

            if self.discarding {
                self.discarding = false;
                continue;
            }
            if line.len() > self.max_line {
                return Some(Err(ProtocolError::LineTooLong { max: self.max_line }));
            }
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            return Some(
                String::from_utf8(line)
                    .map_err(|e| ProtocolError::Malformed(format!("invalid UTF-8: {e}"))),
            );
        }
    }
}

/// Serialize a message as a single JSON line, newline included.
pub fn encode_line<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let mut bytes =
        serde_json::to_vec(message).map_err(|e| ProtocolError::Serialization(e.to_string()))?;
    bytes.push(b'\n');
    Ok(bytes)
}
