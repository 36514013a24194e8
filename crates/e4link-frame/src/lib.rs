//! CRLF line framing for the E4 streaming protocol.
//!
//! The streaming server speaks text: every request, response and data
//! sample is one line terminated by `\r\n`. A single socket read may carry
//! several lines or only part of one; the reader buffers the remainder so
//! callers always get complete, trimmed frames.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod line_codec;

pub use codec::{
    decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_MAX_LINE_LENGTH, LINE_TERMINATOR,
    RESPONSE_MARKER,
};
pub use error::{FrameError, Result};
#[cfg(feature = "async")]
pub use line_codec::LineCodec;
pub use reader::FrameReader;
pub use writer::FrameWriter;
