use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::traits::E4Stream;

/// Default port of the E4 streaming server.
pub const DEFAULT_PORT: u16 = 28000;

/// TCP transport to the streaming server.
///
/// Connections are plain blocking TCP. Reconnection is left to the caller.
pub struct TcpTransport;

impl TcpTransport {
    /// Connect to the streaming server (blocking).
    ///
    /// `addr` is `host:port`; a bare host gets [`DEFAULT_PORT`].
    pub fn connect(addr: &str) -> Result<E4Stream> {
        let candidates = resolve(addr)?;
        let mut last_err = None;

        for candidate in candidates {
            match TcpStream::connect(candidate) {
                Ok(stream) => return Self::finish(addr, stream),
                Err(err) => last_err = Some(err),
            }
        }

        Err(TransportError::Connect {
            addr: addr.to_string(),
            source: last_err.unwrap_or_else(no_addresses),
        })
    }

    /// Connect with a bound on how long each connection attempt may take.
    pub fn connect_timeout(addr: &str, timeout: Duration) -> Result<E4Stream> {
        let candidates = resolve(addr)?;
        let mut last_err = None;

        for candidate in candidates {
            match TcpStream::connect_timeout(&candidate, timeout) {
                Ok(stream) => return Self::finish(addr, stream),
                Err(err) => last_err = Some(err),
            }
        }

        Err(TransportError::Connect {
            addr: addr.to_string(),
            source: last_err.unwrap_or_else(no_addresses),
        })
    }

    /// Connect using tokio.
    #[cfg(feature = "async")]
    pub async fn connect_async(addr: &str) -> Result<tokio::net::TcpStream> {
        let target = with_default_port(addr);
        let stream = tokio::net::TcpStream::connect(target.as_str())
            .await
            .map_err(|source| TransportError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        stream.set_nodelay(true)?;
        debug!(addr, "connected to streaming server (async)");
        Ok(stream)
    }

    fn finish(addr: &str, stream: TcpStream) -> Result<E4Stream> {
        // Commands are tiny and latency-sensitive.
        stream.set_nodelay(true)?;
        debug!(addr, "connected to streaming server");
        Ok(E4Stream::from_tcp(stream))
    }

    /// Transport name for diagnostics.
    pub fn transport_name() -> &'static str {
        "tcp"
    }
}

fn resolve(addr: &str) -> Result<Vec<SocketAddr>> {
    let target = with_default_port(addr);
    let candidates: Vec<SocketAddr> = target
        .to_socket_addrs()
        .map_err(|source| TransportError::Resolve {
            addr: addr.to_string(),
            source,
        })?
        .collect();

    if candidates.is_empty() {
        return Err(TransportError::Resolve {
            addr: addr.to_string(),
            source: no_addresses(),
        });
    }
    Ok(candidates)
}

fn with_default_port(addr: &str) -> String {
    if addr.parse::<SocketAddr>().is_ok() {
        return addr.to_string();
    }
    if let Ok(IpAddr::V6(ip)) = addr.parse::<IpAddr>() {
        return format!("[{ip}]:{DEFAULT_PORT}");
    }
    match addr.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') && port.parse::<u16>().is_ok() => {
            addr.to_string()
        }
        _ => format!("{addr}:{DEFAULT_PORT}"),
    }
}

fn no_addresses() -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "address resolved to nothing",
    )
}
