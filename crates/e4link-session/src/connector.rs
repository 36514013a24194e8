use e4link_frame::{FrameReader, FrameWriter};
use e4link_transport::{E4Stream, TcpTransport};

use crate::error::Result;
use crate::response::DeviceDescriptor;
use crate::session::{list_devices, Session, SessionConfig};

/// Connect to a streaming server with default configuration.
pub fn connect(addr: &str) -> Result<Session<E4Stream, E4Stream>> {
    connect_with_config(addr, &SessionConfig::default())
}

/// Connect with explicit configuration.
///
/// Only the TCP connection is made here; the handshake runs as part of
/// [`Session::run`].
pub fn connect_with_config(
    addr: &str,
    config: &SessionConfig,
) -> Result<Session<E4Stream, E4Stream>> {
    let (reader, writer) = open(addr, config)?;
    Ok(Session::new(reader, writer, config))
}

/// Connect, ask for the device list, and disconnect.
pub fn list_devices_at(addr: &str, config: &SessionConfig) -> Result<Vec<DeviceDescriptor>> {
    let (mut reader, mut writer) = open(addr, config)?;
    let devices = list_devices(&mut reader, &mut writer)?;
    if let Err(err) = writer.get_ref().shutdown() {
        tracing::debug!(error = %err, "shutdown after device listing failed");
    }
    Ok(devices)
}

fn open(
    addr: &str,
    config: &SessionConfig,
) -> Result<(FrameReader<E4Stream>, FrameWriter<E4Stream>)> {
    let stream = match config.read_timeout {
        Some(timeout) => TcpTransport::connect_timeout(addr, timeout)?,
        None => TcpTransport::connect(addr)?,
    };
    let reader_stream = stream.try_clone()?;

    let frame_config = config.frame_config();
    let reader = FrameReader::with_config_tcp(reader_stream, frame_config.clone())?;
    let writer = FrameWriter::with_config_tcp(stream, frame_config)?;
    Ok((reader, writer))
}
