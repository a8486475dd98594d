//! Stdio Frame Reader
//!
//! Turns an unbounded byte stream into complete, trimmed, non-empty lines.
//!
//! Input is split on `\n` as raw bytes and each line is decoded afterwards, so
//! a multi-byte character that straddles two reads is never mangled. Two
//! independent ceilings apply:
//!
//! - **buffer ceiling**: the unterminated tail kept between reads. Crossing it
//!   is fatal ([`FrameError::BufferOverflow`]).
//! - **message ceiling**: one trimmed line. Longer lines are dropped and
//!   counted; reading continues.

use crate::config::LimitsConfig;
use tracing::warn;

/// Stdio framing ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    pub max_buffer_bytes: usize,
    pub max_message_bytes: usize,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self::from(&LimitsConfig::default())
    }
}

impl From<&LimitsConfig> for FrameLimits {
    fn from(config: &LimitsConfig) -> Self {
        Self {
            max_buffer_bytes: config.max_buffer_bytes,
            max_message_bytes: config.max_message_bytes,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    /// Unconsumed input crossed the buffer ceiling
    #[error("stdio buffer overflow: {buffered} bytes pending, limit is {limit}")]
    BufferOverflow { buffered: usize, limit: usize },
}

/// Incremental line splitter
#[derive(Debug)]
pub struct FrameReader {
    limits: FrameLimits,
    pending: Vec<u8>,
    dropped: u64,
}

impl FrameReader {
    pub fn new(limits: FrameLimits) -> Self {
        Self {
            limits,
            pending: Vec::new(),
            dropped: 0,
        }
    }

    /// Feed one chunk and collect the lines it completes.
    ///
    /// # Errors
    ///
    /// [`FrameError::BufferOverflow`] when the retained tail exceeds the
    /// buffer ceiling. The reader must not be used afterwards.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, FrameError> {
        let retained = self.pending.len();
        self.pending.extend_from_slice(chunk);

        let mut lines = Vec::new();
        // The retained tail has no newline, so only the new chunk needs scanning
        if let Some(last_newline) = chunk.iter().rposition(|&b| b == b'\n') {
            let tail = self.pending.split_off(retained + last_newline + 1);
            let complete = std::mem::replace(&mut self.pending, tail);

            // `complete` ends with '\n', so the final split segment is empty
            for segment in complete[..complete.len() - 1].split(|&b| b == b'\n') {
                if let Some(line) = self.accept(segment) {
                    lines.push(line);
                }
            }
        }

        if self.pending.len() > self.limits.max_buffer_bytes {
            return Err(FrameError::BufferOverflow {
                buffered: self.pending.len(),
                limit: self.limits.max_buffer_bytes,
            });
        }

        Ok(lines)
    }

    /// End of input: hand out the unterminated final segment, if any.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        self.accept(&rest)
    }

    /// Lines discarded for exceeding the message ceiling
    pub fn dropped_messages(&self) -> u64 {
        self.dropped
    }

    /// Bytes held waiting for a newline
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }

    fn accept(&mut self, segment: &[u8]) -> Option<String> {
        let decoded = String::from_utf8_lossy(segment);
        let line = decoded.trim();
        if line.is_empty() {
            return None;
        }
        if line.len() > self.limits.max_message_bytes {
            self.dropped += 1;
            warn!(
                size = line.len(),
                limit = self.limits.max_message_bytes,
                dropped_total = self.dropped,
                "Dropping oversized message"
            );
            return None;
        }
        Some(line.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader() -> FrameReader {
        FrameReader::new(FrameLimits::default())
    }

    fn small(max_buffer_bytes: usize, max_message_bytes: usize) -> FrameReader {
        FrameReader::new(FrameLimits {
            max_buffer_bytes,
            max_message_bytes,
        })
    }

    #[test]
    fn test_incomplete_line_is_held() {
        let mut frames = reader();
        let lines = frames.push(br#"{"jsonrpc":"2.0","id":1,"#).unwrap();
        assert!(lines.is_empty());
        assert!(frames.pending_bytes() > 0);

        let lines = frames.push(b"\"method\":\"tools/list\"}\n").unwrap();
        assert_eq!(lines, vec![r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#]);
        assert_eq!(frames.pending_bytes(), 0);
    }

    #[test]
    fn test_two_requests_in_one_chunk() {
        let mut frames = reader();
        let lines = frames.push(b"{\"a\":1}\n{\"b\":2}\n").unwrap();
        assert_eq!(lines, vec!["{\"a\":1}", "{\"b\":2}"]);
    }

    #[test]
    fn test_blank_lines_and_whitespace_ignored() {
        let mut frames = reader();
        let lines = frames.push(b"\n   \n\t{\"a\":1}\r\n\n").unwrap();
        assert_eq!(lines, vec!["{\"a\":1}"]);
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let mut frames = reader();
        let text = "{\"q\":\"caf\u{e9}\"}\n".as_bytes();
        let split = text.iter().position(|&b| b == 0xC3).unwrap() + 1;

        assert!(frames.push(&text[..split]).unwrap().is_empty());
        let lines = frames.push(&text[split..]).unwrap();
        assert_eq!(lines, vec!["{\"q\":\"caf\u{e9}\"}"]);
    }

    #[test]
    fn test_oversized_message_dropped_and_counted() {
        let mut frames = small(1024, 8);
        let lines = frames.push(b"0123456789\nok\n").unwrap();

        assert_eq!(lines, vec!["ok"]);
        assert_eq!(frames.dropped_messages(), 1);
    }

    #[test]
    fn test_message_ceiling_applies_to_trimmed_line() {
        let mut frames = small(1024, 4);
        let lines = frames.push(b"   abcd   \n").unwrap();
        assert_eq!(lines, vec!["abcd"]);
        assert_eq!(frames.dropped_messages(), 0);
    }

    #[test]
    fn test_buffer_overflow_is_fatal() {
        let mut frames = small(16, 8);
        assert!(frames.push(b"0123456789").is_ok());

        let err = frames.push(b"0123456789").unwrap_err();
        assert_eq!(
            err,
            FrameError::BufferOverflow {
                buffered: 20,
                limit: 16
            }
        );
    }

    #[test]
    fn test_buffer_ceiling_counts_only_the_retained_tail() {
        let mut frames = small(16, 16);
        // 24 bytes in one chunk, but only 4 remain unterminated
        let lines = frames.push(b"0123456789\n012345678\nabcd").unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(frames.pending_bytes(), 4);
    }

    #[test]
    fn test_finish_returns_unterminated_tail() {
        let mut frames = reader();
        frames.push(b"{\"a\":1}\n{\"b\":").unwrap();
        frames.push(b"2}").unwrap();

        assert_eq!(frames.finish().as_deref(), Some("{\"b\":2}"));
        assert_eq!(frames.finish(), None);
    }

    #[test]
    fn test_finish_ignores_whitespace_tail() {
        let mut frames = reader();
        frames.push(b"{\"a\":1}\n  ").unwrap();
        assert_eq!(frames.finish(), None);
    }

    #[test]
    fn test_invalid_utf8_is_replaced_not_fatal() {
        let mut frames = reader();
        let lines = frames.push(b"\xff\xfe\n").unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains('\u{fffd}'));
    }
}
