use bytes::{Buf, BufMut, BytesMut};
use tracing::trace;

use crate::error::{FrameError, Result};

/// Line terminator used in both directions.
pub const LINE_TERMINATOR: &[u8; 2] = b"\r\n";

/// Leading marker of a server response line (`R <command> ...`).
pub const RESPONSE_MARKER: &str = "R ";

/// Default maximum line length: 64 KiB.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// One protocol line, terminator stripped and surrounding whitespace trimmed.
///
/// A frame produced by [`decode_frame`] is never empty and always contains
/// at least one space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    text: String,
}

impl Frame {
    /// Create a frame from already-trimmed text.
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// The frame text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Whether the line carries the response marker.
    pub fn is_response(&self) -> bool {
        self.text.starts_with(RESPONSE_MARKER)
    }

    /// Consume the frame and return its text.
    pub fn into_string(self) -> String {
        self.text
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

/// Encode a command into the wire format (`<command>\r\n`).
pub fn encode_frame(command: &str, dst: &mut BytesMut) -> Result<()> {
    if command.trim().is_empty() || command.contains(['\r', '\n']) {
        return Err(FrameError::InvalidCommand(command.to_string()));
    }
    dst.reserve(command.len() + LINE_TERMINATOR.len());
    dst.put_slice(command.as_bytes());
    dst.put_slice(LINE_TERMINATOR);
    Ok(())
}

/// Decode the next frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete line yet; the
/// partial line stays in `src`. Empty lines and lines without a space are
/// consumed and skipped.
pub fn decode_frame(src: &mut BytesMut, max_line_length: usize) -> Result<Option<Frame>> {
    loop {
        let Some(end) = find_terminator(src) else {
            if src.len() > max_line_length + LINE_TERMINATOR.len() {
                return Err(FrameError::LineTooLong {
                    size: src.len(),
                    max: max_line_length,
                });
            }
            return Ok(None);
        };

        if end > max_line_length {
            return Err(FrameError::LineTooLong {
                size: end,
                max: max_line_length,
            });
        }

        let line = src.split_to(end);
        src.advance(LINE_TERMINATOR.len());

        let text = String::from_utf8_lossy(&line);
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        if !text.contains(' ') {
            trace!(line = text, "discarding line without separator");
            continue;
        }

        return Ok(Some(Frame::new(text)));
    }
}

fn find_terminator(src: &[u8]) -> Option<usize> {
    src.windows(LINE_TERMINATOR.len())
        .position(|window| window == LINE_TERMINATOR)
}

/// Configuration for line framing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum line length in bytes. Default: 64 KiB.
    pub max_line_length: usize,
    /// Read timeout for blocking operations. Default: none (block indefinitely).
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            read_timeout: None,
            write_timeout: None,
        }
    }
}
