/// Errors that can occur during line framing.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// A line grew past the configured maximum without a terminator.
    #[error("line too long ({size} bytes without terminator, max {max})")]
    LineTooLong { size: usize, max: usize },

    /// An outgoing command would not fit on a single line.
    #[error("invalid command {0:?}: must be non-empty and contain no line breaks")]
    InvalidCommand(String),

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed by the server.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
