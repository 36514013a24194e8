//! TCP transport to the E4 streaming server.
//!
//! The streaming server exposes a plain TCP socket (port 28000 by default).
//! This is the lowest layer of e4link. Everything else builds on top of
//! the [`E4Stream`] type provided here.

pub mod error;
pub mod tcp;
pub mod traits;

pub use error::{Result, TransportError};
pub use tcp::{TcpTransport, DEFAULT_PORT};
pub use traits::E4Stream;
