use std::io::{ErrorKind, Write};

use bytes::BytesMut;
use e4link_transport::E4Stream;

use crate::codec::{encode_frame, FrameConfig};
use crate::error::{FrameError, Result};
use crate::reader::transport_to_frame_error;

const INITIAL_BUFFER_CAPACITY: usize = 256;

/// Writes complete command lines to any `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Encode and send one command line.
    ///
    /// A write timeout surfaces as `FrameError::Io` with kind `WouldBlock`
    /// or `TimedOut`; only `Interrupted` is retried.
    pub fn send(&mut self, command: &str) -> Result<()> {
        if command.len() > self.config.max_line_length {
            return Err(FrameError::LineTooLong {
                size: command.len(),
                max: self.config.max_line_length,
            });
        }

        self.buf.clear();
        encode_frame(command, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        tracing::debug!(command, "sent");
        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameWriter<E4Stream> {
    /// Create a frame writer for `E4Stream` and apply write timeout from config.
    pub fn with_config_tcp(inner: E4Stream, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn writes_command_with_terminator() {
        let mut writer = FrameWriter::new(Vec::new());
        writer.send("device_list").unwrap();
        writer.send("pause ON").unwrap();
        assert_eq!(writer.into_inner(), b"device_list\r\npause ON\r\n");
    }

    #[test]
    fn write_timeout_is_not_retried() {
        let cfg = FrameConfig {
            write_timeout: Some(std::time::Duration::from_millis(50)),
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(StalledWriter { calls: 0 }, cfg);
        let err = writer.send("pause ON").unwrap_err();
        assert!(matches!(err, FrameError::Io(ref e) if e.kind() == ErrorKind::WouldBlock));
        assert_eq!(writer.get_ref().calls, 1);
    }

    #[test]
    fn interrupted_write_is_retried() {
        let mut writer = FrameWriter::new(InterruptOnce {
            interrupted: false,
            out: Vec::new(),
        });
        writer.send("device_list").unwrap();
        assert_eq!(writer.get_ref().out, b"device_list\r\n");
    }

    #[test]
    fn rejects_oversized_command() {
        let cfg = FrameConfig {
            max_line_length: 8,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Vec::new(), cfg);
        let err = writer.send("device_subscribe bvp ON").unwrap_err();
        assert!(matches!(err, FrameError::LineTooLong { size: 23, max: 8 }));
        assert!(writer.get_ref().is_empty());
    }

    #[test]
    fn rejects_multi_line_command() {
        let mut writer = FrameWriter::new(Vec::new());
        let err = writer.send("pause ON\ndevice_list").unwrap_err();
        assert!(matches!(err, FrameError::InvalidCommand(_)));
    }

    #[test]
    fn write_zero_is_connection_closed() {
        let mut writer = FrameWriter::new(ZeroWriter);
        let err = writer.send("device_list").unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn partial_writes_are_completed() {
        let mut writer = FrameWriter::new(OneBytePerWrite { out: Vec::new() });
        writer.send("pause OFF").unwrap();
        assert_eq!(writer.get_ref().out, b"pause OFF\r\n");
    }

    #[test]
    fn broken_pipe_propagates() {
        let mut writer = FrameWriter::new(BrokenWriter);
        let err = writer.send("device_list").unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
    }

    #[test]
    fn cursor_writer_accessors() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        let _ = writer.get_mut();
        assert_eq!(writer.config().max_line_length, 64 * 1024);
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct OneBytePerWrite {
        out: Vec<u8>,
    }

    impl Write for OneBytePerWrite {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            match buf.first() {
                Some(byte) => {
                    self.out.push(*byte);
                    Ok(1)
                }
                None => Ok(0),
            }
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Every write reports that the send timeout elapsed.
    struct StalledWriter {
        calls: usize,
    }

    impl Write for StalledWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            self.calls += 1;
            Err(std::io::Error::from(ErrorKind::WouldBlock))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct InterruptOnce {
        interrupted: bool,
        out: Vec<u8>,
    }

    impl Write for InterruptOnce {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.out.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
