//! Chunk-safe frame decoder for `text/event-stream` bodies.
//!
//! Network reads split the stream at arbitrary byte offsets: in the middle of
//! a field line, between the `\r` and `\n` of a CRLF, or inside a multi-byte
//! UTF-8 character. [`FrameDecoder`] buffers across reads so that the frames
//! it yields depend only on the total byte stream, never on how it was
//! fragmented.

use crate::error::{SseError, SseResult};

/// UTF-8 byte order mark, stripped once at the start of a stream.
const BOM: &[u8] = b"\xEF\xBB\xBF";

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// One complete SSE record: the lines preceding a blank line.
///
/// Line terminators are already stripped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    lines: Vec<String>,
}

impl Frame {
    /// Build a frame from individual lines.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    fn from_block(block: &str) -> Self {
        Self::from_lines(block.split('\n'))
    }

    /// The lines of this frame, in order.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

// ---------------------------------------------------------------------------
// FrameDecoder
// ---------------------------------------------------------------------------

/// Incremental decoder turning raw byte chunks into [`Frame`]s.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Undecoded bytes: an incomplete UTF-8 sequence, or a possible BOM prefix.
    pending: Vec<u8>,
    /// Decoded text with every line terminator normalised to `\n`.
    buffer: String,
    /// Bytes of `buffer` already known not to start a blank-line delimiter.
    scanned: usize,
    /// The previous character was a `\r`; a directly following `\n` belongs to it.
    after_cr: bool,
    bom_checked: bool,
    completed_lines: u64,
}

impl FrameDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of complete lines seen so far, blank lines included.
    ///
    /// Monotonic for the lifetime of the decoder.
    pub fn completed_lines(&self) -> u64 {
        self.completed_lines
    }

    /// Returns `true` if nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.buffer.is_empty()
    }

    /// Feed one network chunk and return every frame it completed.
    ///
    /// # Errors
    ///
    /// Returns [`SseError::Protocol`] if the stream contains invalid UTF-8.
    pub fn feed(&mut self, chunk: &[u8]) -> SseResult<Vec<Frame>> {
        if chunk.is_empty() {
            return Ok(Vec::new());
        }
        self.pending.extend_from_slice(chunk);

        if !self.bom_checked {
            if self.pending.len() < BOM.len() && BOM.starts_with(&self.pending) {
                return Ok(Vec::new());
            }
            if self.pending.starts_with(BOM) {
                self.pending.drain(..BOM.len());
            }
            self.bom_checked = true;
        }

        let valid = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(e) => {
                return Err(SseError::protocol(format!(
                    "invalid UTF-8 in event stream: {e}"
                )))
            }
        };

        let tail = self.pending.split_off(valid);
        let decoded = std::mem::replace(&mut self.pending, tail);
        // `decoded` holds exactly the valid prefix checked above.
        let text = String::from_utf8(decoded)
            .map_err(|e| SseError::protocol(format!("invalid UTF-8 in event stream: {e}")))?;
        self.push_text(&text);

        Ok(self.extract_frames())
    }

    /// Signal end of stream.
    ///
    /// Anything not terminated by a blank line is an incomplete frame and is
    /// discarded. Returns the number of discarded bytes.
    pub fn finish(&mut self) -> usize {
        let discarded = self.pending.len() + self.buffer.len();
        self.pending.clear();
        self.buffer.clear();
        self.scanned = 0;
        self.after_cr = false;
        discarded
    }

    fn push_text(&mut self, text: &str) {
        self.buffer.reserve(text.len());
        for ch in text.chars() {
            match ch {
                '\n' if self.after_cr => {
                    self.after_cr = false;
                }
                '\r' => {
                    self.after_cr = true;
                    self.completed_lines += 1;
                    self.buffer.push('\n');
                }
                '\n' => {
                    self.completed_lines += 1;
                    self.buffer.push('\n');
                }
                other => {
                    self.after_cr = false;
                    self.buffer.push(other);
                }
            }
        }
    }

    fn extract_frames(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut start = 0;
        let mut scan_from = self.scanned;

        loop {
            let rest = &self.buffer.as_bytes()[start..];
            if rest.first() == Some(&b'\n') {
                // Blank line with nothing pending: no frame to dispatch.
                start += 1;
                scan_from = start;
                continue;
            }
            match find_blank_line(rest, scan_from - start) {
                Some(pos) => {
                    frames.push(Frame::from_block(&self.buffer[start..start + pos]));
                    start += pos + 2;
                    scan_from = start;
                }
                None => break,
            }
        }

        self.buffer.drain(..start);
        // The last byte may be the first half of a delimiter.
        self.scanned = self.buffer.len().saturating_sub(1);
        frames
    }
}

/// Position of the first `\n\n` in `bytes` at or after `from`.
fn find_blank_line(bytes: &[u8], from: usize) -> Option<usize> {
    if bytes.len() < 2 {
        return None;
    }
    let from = from.min(bytes.len() - 1);
    bytes[from..]
        .windows(2)
        .position(|w| w == b"\n\n")
        .map(|pos| pos + from)
}
