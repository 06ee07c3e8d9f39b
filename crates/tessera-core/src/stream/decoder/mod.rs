//! Line-framed stream decoder
//!
//! Handles:
//! - Records split across network chunks at any byte offset
//! - Incomplete UTF-8 sequences across chunk boundaries
//! - CRLF line endings, `:` comment lines and blank separators
//! - Payloads that are not yet complete JSON even though a newline arrived

use super::frame::{DATA_PREFIX, StreamFrame};

/// Buffered decoder for `data: <json>` line records
///
/// No line is processed until its terminating `\n` has arrived. A data line
/// whose payload does not parse is never dropped on the spot: it is deferred
/// and retried joined with the next line once more data arrives.
#[derive(Debug, Default)]
pub struct LineDecoder {
    /// Decoded text not yet split into lines
    buffer: String,
    /// Trailing bytes of an incomplete UTF-8 sequence
    incomplete_utf8: Vec<u8>,
    /// Payload that failed to parse and waits for its continuation
    deferred: Option<String>,
    /// Deferred payloads given up on
    discarded: usize,
}

/// What happened to one extracted line
#[derive(Debug, PartialEq, Eq)]
enum LineResult {
    Handled,
    Deferred,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and return every frame completed by them
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamFrame> {
        let bytes_to_decode = if self.incomplete_utf8.is_empty() {
            chunk.to_vec()
        } else {
            let mut combined = std::mem::take(&mut self.incomplete_utf8);
            combined.extend_from_slice(chunk);
            combined
        };

        let (valid_str, remaining_bytes) = Self::decode_utf8_with_remainder(&bytes_to_decode);
        self.incomplete_utf8 = remaining_bytes;
        self.buffer.push_str(&valid_str);

        let mut frames = Vec::new();
        self.drain_lines(&mut frames);
        frames
    }

    /// Flush at end of body.
    ///
    /// Processes every buffered line, then any final unterminated line, using
    /// the same rules as [`feed`](Self::feed). A payload still deferred after
    /// that can never complete and is discarded.
    pub fn finish(&mut self) -> Vec<StreamFrame> {
        if !self.incomplete_utf8.is_empty() {
            let tail = std::mem::take(&mut self.incomplete_utf8);
            tracing::warn!(bytes = tail.len(), "stream ended inside a UTF-8 sequence");
            self.buffer.push_str(&String::from_utf8_lossy(&tail));
        }

        let mut frames = Vec::new();
        while self.buffer.contains('\n') {
            self.drain_lines(&mut frames);
        }

        let rest = std::mem::take(&mut self.buffer);
        if !rest.is_empty() {
            let line = rest.strip_suffix('\r').unwrap_or(&rest);
            self.handle_line(line, &mut frames);
        }

        if let Some(payload) = self.deferred.take() {
            tracing::warn!(payload_len = payload.len(), "discarding unparseable stream record");
            self.discarded += 1;
        }

        frames
    }

    /// Extract complete lines until the buffer has none or a line is deferred
    fn drain_lines(&mut self, frames: &mut Vec<StreamFrame>) {
        while let Some(pos) = self.buffer.find('\n') {
            let raw: String = self.buffer.drain(..=pos).collect();
            let line = &raw[..raw.len() - 1];
            let line = line.strip_suffix('\r').unwrap_or(line);

            if self.handle_line(line, frames) == LineResult::Deferred {
                break;
            }
        }
    }

    fn handle_line(&mut self, line: &str, frames: &mut Vec<StreamFrame>) -> LineResult {
        if let Some(prefix) = self.deferred.take() {
            if line.is_empty() || line.starts_with(':') {
                self.deferred = Some(prefix);
                return LineResult::Handled;
            }

            if Self::is_independent_record(line) {
                // The deferred payload never completed; a fresh record began
                tracing::warn!(payload_len = prefix.len(), "discarding unparseable stream record");
                self.discarded += 1;
            } else {
                let joined = format!("{}\n{}", prefix, line);
                return match StreamFrame::parse(&joined) {
                    Ok(parsed) => {
                        frames.extend(parsed);
                        LineResult::Handled
                    }
                    Err(_) => {
                        self.deferred = Some(joined);
                        LineResult::Deferred
                    }
                };
            }
        }

        if line.is_empty() || line.starts_with(':') {
            return LineResult::Handled;
        }

        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            tracing::trace!(line_len = line.len(), "skipping non-data line");
            return LineResult::Handled;
        };

        match StreamFrame::parse(payload) {
            Ok(parsed) => {
                if parsed.is_empty() {
                    tracing::trace!("ignoring unrecognised record");
                }
                frames.extend(parsed);
                LineResult::Handled
            }
            Err(e) => {
                tracing::debug!(error = %e, "record incomplete, deferring");
                self.deferred = Some(payload.to_string());
                LineResult::Deferred
            }
        }
    }

    /// A `data:` line that stands on its own as a complete record
    fn is_independent_record(line: &str) -> bool {
        line.strip_prefix(DATA_PREFIX)
            .is_some_and(|payload| StreamFrame::parse(payload).is_ok())
    }

    /// Decode bytes as UTF-8, returning the valid string and any trailing incomplete bytes
    fn decode_utf8_with_remainder(bytes: &[u8]) -> (String, Vec<u8>) {
        if let Ok(s) = std::str::from_utf8(bytes) {
            return (s.to_string(), Vec::new());
        }

        // Find the last valid UTF-8 boundary by scanning backwards
        let mut valid_end = bytes.len();

        for i in 1..=4.min(bytes.len()) {
            let pos = bytes.len() - i;
            let byte = bytes[pos];

            if !Self::is_continuation_byte(byte) {
                let expected_len = Self::utf8_char_len(byte);
                let actual_remaining = bytes.len() - pos;

                if actual_remaining < expected_len {
                    valid_end = pos;
                }
                break;
            }
        }

        let valid_bytes = &bytes[..valid_end];
        let remaining_bytes = bytes[valid_end..].to_vec();

        match std::str::from_utf8(valid_bytes) {
            Ok(s) => (s.to_string(), remaining_bytes),
            Err(e) => {
                // Invalid bytes in the middle, not a split sequence
                tracing::warn!(
                    position = e.valid_up_to(),
                    "invalid UTF-8 in stream, replacing"
                );
                (
                    String::from_utf8_lossy(valid_bytes).into_owned(),
                    remaining_bytes,
                )
            }
        }
    }

    /// Check if a byte is a UTF-8 continuation byte (10xxxxxx)
    #[inline]
    fn is_continuation_byte(byte: u8) -> bool {
        (byte & 0b1100_0000) == 0b1000_0000
    }

    /// Get the expected length of a UTF-8 character from its first byte
    #[inline]
    fn utf8_char_len(first_byte: u8) -> usize {
        if first_byte & 0b1000_0000 == 0 {
            1
        } else if first_byte & 0b1110_0000 == 0b1100_0000 {
            2
        } else if first_byte & 0b1111_0000 == 0b1110_0000 {
            3
        } else if first_byte & 0b1111_1000 == 0b1111_0000 {
            4
        } else {
            1
        }
    }

    /// Whether a payload is waiting for its continuation
    pub fn has_deferred(&self) -> bool {
        self.deferred.is_some()
    }

    /// Number of deferred payloads that never completed
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// Check if there's remaining data in the buffer
    pub fn has_remaining(&self) -> bool {
        !self.buffer.is_empty() || !self.incomplete_utf8.is_empty() || self.deferred.is_some()
    }

    /// Get remaining buffered text (for debugging)
    pub fn remaining(&self) -> &str {
        &self.buffer
    }

    /// Clear all buffered state
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.incomplete_utf8.clear();
        self.deferred = None;
    }
}
