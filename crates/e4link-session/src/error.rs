use crate::response::Command;

/// Errors that end a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] e4link_transport::TransportError),

    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] e4link_frame::FrameError),

    /// The server closed the connection.
    #[error("server disconnected: {0}")]
    Disconnected(String),

    /// The protocol entered its terminal failure state.
    #[error("session failed: {0}")]
    Fatal(FatalReason),

    /// No data arrived within the configured read timeout.
    #[error("no data received within {0:?}")]
    Timeout(std::time::Duration),
}

/// Why the handshake entered its terminal failure state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FatalReason {
    /// The server answered a handshake request with `ERR`.
    #[error("server rejected {command}: {reason}")]
    Rejected { command: Command, reason: String },

    /// A response could not be trusted (malformed, or device count mismatch).
    #[error("protocol error: {message} (frame: {frame:?})")]
    Protocol { frame: String, message: String },

    /// The selected device id is not one the server reported.
    #[error("invalid device selection: {0}")]
    InvalidSelection(String),
}

pub type Result<T> = std::result::Result<T, SessionError>;
