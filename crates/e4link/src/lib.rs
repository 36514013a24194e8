//! Client for the Empatica E4 streaming server.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP connection to the streaming server
//! - [`frame`]: CRLF line framing over blocking streams (and tokio, behind `async`)
//! - [`session`]: handshake state machine, response and data-line parsing,
//!   sample demultiplexing

/// Re-export transport types.
pub mod transport {
    pub use e4link_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use e4link_frame::*;
}

/// Re-export session types.
pub mod session {
    pub use e4link_session::*;
}
