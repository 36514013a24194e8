//! Session orchestrator: drives the handshake and routes frames.

use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use e4link_frame::{
    Frame, FrameConfig, FrameError, FrameReader, FrameWriter, DEFAULT_MAX_LINE_LENGTH,
    RESPONSE_MARKER,
};
use e4link_transport::E4Stream;
use serde::Serialize;

use crate::channel::{ChannelSpec, StreamDescription};
use crate::data::{decode_data_frame, DecodeOutcome};
use crate::error::{FatalReason, Result, SessionError};
use crate::handshake::{Disposition, Handshake, HandshakeState, Request};
use crate::response::{parse_response, Command, DeviceDescriptor, ResponseError};
use crate::sink::{DeviceSelector, SampleSink};

/// Session configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Channels to subscribe, in order.
    pub channels: ChannelSpec,
    /// Device to connect to when the server reports several.
    pub device_id: Option<String>,
    /// Give up when no frame arrives for this long. `None` blocks forever.
    pub read_timeout: Option<Duration>,
    /// Longest line accepted from the server.
    pub max_line_length: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channels: ChannelSpec::default(),
            device_id: None,
            read_timeout: None,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl SessionConfig {
    /// Framing configuration derived from this session configuration.
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_line_length: self.max_line_length,
            read_timeout: self.read_timeout,
            write_timeout: self.read_timeout,
        }
    }
}

/// Counters kept over the life of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub frames: u64,
    pub samples_published: u64,
    /// Samples decoded while no subscriber was active.
    pub samples_skipped: u64,
    pub decode_errors: u64,
    pub unrecognized: u64,
    pub ignored_responses: u64,
}

/// Non-error ways a session ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// The server reported no devices.
    NoDevicesFound,
    /// The stop flag was raised.
    Stopped,
}

/// One connection to the streaming server.
pub struct Session<R, W> {
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
    handshake: Handshake,
    stats: SessionStats,
    read_timeout: Option<Duration>,
}

impl<R: Read, W: Write> Session<R, W> {
    pub fn new(reader: FrameReader<R>, writer: FrameWriter<W>, config: &SessionConfig) -> Self {
        let handshake = Handshake::new(config.channels.clone())
            .with_preselected_device(config.device_id.clone());
        Self {
            reader,
            writer,
            handshake,
            stats: SessionStats::default(),
            read_timeout: config.read_timeout,
        }
    }

    /// Run until the session ends.
    ///
    /// `stop` is checked between frames. A read that fails after `stop` was
    /// raised (typically because the socket was shut down to unblock it)
    /// counts as a stop, not an error.
    pub fn run(
        &mut self,
        sink: &mut dyn SampleSink,
        selector: &mut dyn DeviceSelector,
        stop: &AtomicBool,
    ) -> Result<SessionOutcome> {
        loop {
            if stop.load(Ordering::Relaxed) {
                tracing::info!(stats = ?self.stats, "session stopped");
                return Ok(SessionOutcome::Stopped);
            }
            match self.step(sink, selector) {
                Ok(Some(outcome)) => return Ok(outcome),
                Ok(None) => {}
                Err(err) if stop.load(Ordering::Relaxed) => {
                    tracing::debug!(error = %err, "read interrupted by stop request");
                    return Ok(SessionOutcome::Stopped);
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Send the pending request, if any, then read and route one frame.
    pub fn step(
        &mut self,
        sink: &mut dyn SampleSink,
        selector: &mut dyn DeviceSelector,
    ) -> Result<Option<SessionOutcome>> {
        match self.handshake.state() {
            HandshakeState::NoDevicesFound => return Ok(Some(SessionOutcome::NoDevicesFound)),
            HandshakeState::Fatal(reason) => return Err(SessionError::Fatal(reason.clone())),
            _ => {}
        }

        if let Some(request) = self.handshake.poll_request() {
            self.send(&request)?;
        }

        let frame = self.read_frame()?;
        self.stats.frames += 1;
        let was_streaming = matches!(self.handshake.state(), HandshakeState::Streaming);
        self.dispatch(&frame, sink, selector);
        if !was_streaming && matches!(self.handshake.state(), HandshakeState::Streaming) {
            if let Some(description) = self.description() {
                sink.stream_started(&description);
            }
        }

        match self.handshake.state() {
            HandshakeState::NoDevicesFound => {
                tracing::warn!("server reported no devices");
                Ok(Some(SessionOutcome::NoDevicesFound))
            }
            HandshakeState::Fatal(reason) => {
                tracing::error!(frame = %frame, reason = %reason, "session failed");
                Err(SessionError::Fatal(reason.clone()))
            }
            _ => Ok(None),
        }
    }

    pub fn state(&self) -> &HandshakeState {
        self.handshake.state()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Device the session connected to, once chosen.
    pub fn device(&self) -> Option<&DeviceDescriptor> {
        self.handshake.device()
    }

    /// Metadata of the published stream, once a device is chosen.
    pub fn description(&self) -> Option<StreamDescription> {
        self.device()
            .map(|device| StreamDescription::for_device(&device.name, &device.id))
    }

    /// Consume the session and return its reader and writer.
    pub fn into_parts(self) -> (FrameReader<R>, FrameWriter<W>) {
        (self.reader, self.writer)
    }

    fn send(&mut self, request: &Request) -> Result<()> {
        self.writer
            .send(&request.to_string())
            .map_err(|err| stream_error(err, self.read_timeout))
    }

    fn read_frame(&mut self) -> Result<Frame> {
        self.reader
            .read_frame()
            .map_err(|err| stream_error(err, self.read_timeout))
    }

    fn dispatch(
        &mut self,
        frame: &Frame,
        sink: &mut dyn SampleSink,
        selector: &mut dyn DeviceSelector,
    ) {
        let line = frame.as_str();
        let streaming = matches!(self.handshake.state(), HandshakeState::Streaming);
        if !streaming && line.starts_with(RESPONSE_MARKER) {
            self.handle_response(line, selector);
        } else {
            self.handle_data(line, sink);
        }
    }

    fn handle_response(&mut self, line: &str, selector: &mut dyn DeviceSelector) {
        match parse_response(line) {
            Ok(response) => {
                tracing::debug!(frame = line, state = %self.handshake.state(), "response");
                if let Disposition::Ignored(reason) = self.handshake.on_response(&response, selector)
                {
                    self.stats.ignored_responses += 1;
                    tracing::warn!(frame = line, %reason, "ignoring response");
                }
            }
            Err(ResponseError::UnknownCommand(command)) => {
                self.stats.ignored_responses += 1;
                tracing::warn!(frame = line, %command, "ignoring response to unknown command");
            }
            Err(err) => self.handshake.fail(FatalReason::Protocol {
                frame: line.to_string(),
                message: err.to_string(),
            }),
        }
    }

    fn handle_data(&mut self, line: &str, sink: &mut dyn SampleSink) {
        match decode_data_frame(line) {
            Ok(DecodeOutcome::Sample(sample)) => {
                if sink.has_active_subscriber() {
                    sink.publish(&sample.to_vector(), sample.timestamp);
                    self.stats.samples_published += 1;
                } else {
                    self.stats.samples_skipped += 1;
                }
            }
            Ok(DecodeOutcome::Unrecognized) => {
                self.stats.unrecognized += 1;
                tracing::info!(frame = line, "unrecognized frame");
            }
            Err(err) => {
                self.stats.decode_errors += 1;
                tracing::warn!(frame = line, error = %err, "dropping undecodable data frame");
            }
        }
    }
}

impl Session<E4Stream, E4Stream> {
    /// A second handle on the socket, for shutting it down from another
    /// thread to unblock a pending read.
    pub fn shutdown_handle(&self) -> Result<E4Stream> {
        Ok(self.reader.get_ref().try_clone()?)
    }
}

/// Ask the server for its devices without connecting to any.
///
/// Data lines and responses to other commands that arrive first are skipped.
pub fn list_devices<R: Read, W: Write>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
) -> Result<Vec<DeviceDescriptor>> {
    let read_timeout = reader.config().read_timeout;
    writer
        .send(&Request::DeviceList.to_string())
        .map_err(|err| stream_error(err, writer.config().write_timeout))?;
    loop {
        let frame = reader
            .read_frame()
            .map_err(|err| stream_error(err, read_timeout))?;
        if !frame.is_response() {
            tracing::debug!(frame = %frame, "skipping data line while listing devices");
            continue;
        }
        match parse_response(frame.as_str()) {
            Ok(response) if response.command == Command::List => return Ok(response.devices),
            Ok(_) | Err(ResponseError::UnknownCommand(_)) => {
                tracing::warn!(frame = %frame, "ignoring response while listing devices");
            }
            Err(err) => {
                let reason = FatalReason::Protocol {
                    frame: frame.to_string(),
                    message: err.to_string(),
                };
                tracing::error!(reason = %reason, "device listing failed");
                return Err(SessionError::Fatal(reason));
            }
        }
    }
}

/// Map a framing error, turning an elapsed socket timeout into `Timeout`.
fn stream_error(err: FrameError, timeout: Option<Duration>) -> SessionError {
    match err {
        FrameError::ConnectionClosed => {
            SessionError::Disconnected("connection closed by server".to_string())
        }
        FrameError::Io(io)
            if matches!(io.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
        {
            match timeout {
                Some(timeout) => SessionError::Timeout(timeout),
                None => SessionError::Frame(FrameError::Io(io)),
            }
        }
        other => SessionError::Frame(other),
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Cursor};

    use super::*;
    use crate::channel::{Channel, DataStream};
    use crate::sink::{FixedSelector, NoSelector, VecSink};

    fn session(script: &str, config: &SessionConfig) -> Session<Cursor<Vec<u8>>, Vec<u8>> {
        Session::new(
            FrameReader::new(Cursor::new(script.as_bytes().to_vec())),
            FrameWriter::new(Vec::new()),
            config,
        )
    }

    fn sent(session: Session<Cursor<Vec<u8>>, Vec<u8>>) -> Vec<String> {
        let (_, writer) = session.into_parts();
        String::from_utf8(writer.into_inner())
            .unwrap()
            .split_terminator("\r\n")
            .map(str::to_string)
            .collect()
    }

    fn acc_bvp() -> SessionConfig {
        SessionConfig {
            channels: ChannelSpec::new([Channel::Acc, Channel::Bvp]).unwrap(),
            ..SessionConfig::default()
        }
    }

    const HANDSHAKE: &str = "R device_list 1 | 9ff167 Empatica_E4\r\n\
        R device_connect OK\r\n\
        R pause ON\r\n\
        R device_subscribe acc OK\r\n\
        R device_subscribe bvp OK\r\n\
        R pause OFF\r\n";

    /// Raises the stop flag once it has seen `limit` samples.
    struct StopAfter<'a> {
        inner: VecSink,
        limit: usize,
        stop: &'a AtomicBool,
    }

    impl SampleSink for StopAfter<'_> {
        fn publish(&mut self, values: &[f64], timestamp: f64) {
            self.inner.publish(values, timestamp);
            if self.inner.samples.len() >= self.limit {
                self.stop.store(true, Ordering::Relaxed);
            }
        }
    }

    struct Idle;

    impl SampleSink for Idle {
        fn has_active_subscriber(&self) -> bool {
            false
        }

        fn publish(&mut self, _values: &[f64], _timestamp: f64) {
            panic!("publish without subscriber");
        }
    }

    /// Records the serial announced at stream start, then each sample.
    #[derive(Default)]
    struct Announced {
        serial: Option<String>,
        samples_before_start: usize,
        samples: usize,
    }

    impl SampleSink for Announced {
        fn stream_started(&mut self, description: &StreamDescription) {
            assert!(self.serial.is_none(), "stream_started called twice");
            self.serial = Some(description.serial.clone());
        }

        fn publish(&mut self, _values: &[f64], _timestamp: f64) {
            if self.serial.is_none() {
                self.samples_before_start += 1;
            }
            self.samples += 1;
        }
    }

    struct WouldBlock;

    impl Read for WouldBlock {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::WouldBlock, "no data"))
        }
    }

    impl Write for WouldBlock {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::WouldBlock, "send buffer full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn handshake_then_stream() {
        let script = format!(
            "{HANDSHAKE}E4_Acc 100.0 1 2 3\r\nE4_Gsr 1.0 abc\r\nE4_Bvp 100.5 0.25\r\nE4_Unknown 1.0 2.0\r\n"
        );
        let mut s = session(&script, &acc_bvp());
        let mut sink = VecSink::default();
        let stop = AtomicBool::new(false);

        let err = s.run(&mut sink, &mut NoSelector, &stop).unwrap_err();
        assert!(matches!(err, SessionError::Disconnected(_)));
        assert_eq!(s.state(), &HandshakeState::Streaming);

        assert_eq!(sink.samples.len(), 2);
        let (acc, ts) = &sink.samples[0];
        assert_eq!(*ts, 100.0);
        assert_eq!(&acc[..3], &[1.0, 2.0, 3.0]);
        assert!(acc[3..].iter().all(|v| v.is_nan()));
        assert_eq!(sink.samples[1].0[DataStream::Bvp.slot()], 0.25);

        let stats = s.stats();
        assert_eq!(stats.frames, 10);
        assert_eq!(stats.samples_published, 2);
        assert_eq!(stats.unrecognized, 1);
        assert_eq!(stats.decode_errors, 1);

        assert_eq!(
            sent(s),
            vec![
                "device_list",
                "device_connect 9ff167",
                "pause ON",
                "device_subscribe acc ON",
                "device_subscribe bvp ON",
                "pause OFF",
            ]
        );
    }

    #[test]
    fn no_devices_is_an_outcome() {
        let mut s = session("R device_list 0\r\n", &acc_bvp());
        let outcome = s
            .run(&mut VecSink::default(), &mut NoSelector, &AtomicBool::new(false))
            .unwrap();
        assert_eq!(outcome, SessionOutcome::NoDevicesFound);
        assert_eq!(sent(s), vec!["device_list"]);
    }

    #[test]
    fn rejection_stops_traffic() {
        let script = "R device_list 1 | 9ff167 Empatica_E4\r\n\
            R device_connect OK\r\n\
            R pause ON\r\n\
            R device_subscribe acc ERR You are not connected to any device\r\n\
            R device_subscribe bvp OK\r\n";
        let mut s = session(script, &acc_bvp());
        let err = s
            .run(&mut VecSink::default(), &mut NoSelector, &AtomicBool::new(false))
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Fatal(FatalReason::Rejected {
                command: Command::Subscribe,
                ..
            })
        ));
        assert_eq!(sent(s).last().map(String::as_str), Some("device_subscribe acc ON"));
    }

    #[test]
    fn count_mismatch_is_protocol_error() {
        let mut s = session("R device_list 2 | 9ff167 Empatica_E4\r\n", &acc_bvp());
        let err = s
            .run(&mut VecSink::default(), &mut NoSelector, &AtomicBool::new(false))
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Fatal(FatalReason::Protocol { .. })
        ));
    }

    #[test]
    fn ignored_responses_are_counted() {
        let script = format!("R device_disconnect OK\r\nR pause ON\r\n{HANDSHAKE}");
        let mut s = session(&script, &acc_bvp());
        let _ = s.run(&mut VecSink::default(), &mut NoSelector, &AtomicBool::new(false));
        assert_eq!(s.state(), &HandshakeState::Streaming);
        assert_eq!(s.stats().ignored_responses, 2);
    }

    #[test]
    fn preselected_device_is_connected() {
        let script = "R device_list 2 | 9ff167 Empatica_E4 | 7a3166 Empatica_E4\r\n";
        let config = SessionConfig {
            device_id: Some("7a3166".to_string()),
            ..acc_bvp()
        };
        let mut s = session(script, &config);
        let _ = s.run(&mut VecSink::default(), &mut NoSelector, &AtomicBool::new(false));
        assert_eq!(s.device().map(|d| d.id.as_str()), Some("7a3166"));
        assert_eq!(
            s.description().map(|d| d.serial),
            Some("7a3166".to_string())
        );
        assert_eq!(sent(s), vec!["device_list", "device_connect 7a3166"]);
    }

    #[test]
    fn selector_is_consulted_for_many_devices() {
        let script = "R device_list 2 | 9ff167 Empatica_E4 | 7a3166 Empatica_E4\r\n";
        let mut s = session(script, &acc_bvp());
        let mut selector = FixedSelector::new("9ff167");
        let _ = s.run(
            &mut VecSink::default(),
            &mut selector,
            &AtomicBool::new(false),
        );
        assert_eq!(s.device().map(|d| d.id.as_str()), Some("9ff167"));
    }

    #[test]
    fn stop_flag_ends_with_stopped() {
        let script = format!("{HANDSHAKE}E4_Bvp 1.0 0.1\r\nE4_Bvp 2.0 0.2\r\nE4_Bvp 3.0 0.3\r\n");
        let mut s = session(&script, &acc_bvp());
        let stop = AtomicBool::new(false);
        let mut sink = StopAfter {
            inner: VecSink::default(),
            limit: 2,
            stop: &stop,
        };
        let outcome = s.run(&mut sink, &mut NoSelector, &stop).unwrap();
        assert_eq!(outcome, SessionOutcome::Stopped);
        assert_eq!(sink.inner.samples.len(), 2);
    }

    #[test]
    fn inactive_sink_skips_samples() {
        let script = format!("{HANDSHAKE}E4_Bvp 1.0 0.1\r\n");
        let mut s = session(&script, &acc_bvp());
        let _ = s.run(&mut Idle, &mut NoSelector, &AtomicBool::new(false));
        assert_eq!(s.stats().samples_skipped, 1);
        assert_eq!(s.stats().samples_published, 0);
    }

    #[test]
    fn read_timeout_maps_to_timeout() {
        let config = SessionConfig {
            read_timeout: Some(Duration::from_millis(50)),
            ..acc_bvp()
        };
        let mut s = Session::new(
            FrameReader::new(WouldBlock),
            FrameWriter::new(Vec::new()),
            &config,
        );
        let err = s
            .run(&mut VecSink::default(), &mut NoSelector, &AtomicBool::new(false))
            .unwrap_err();
        assert!(matches!(err, SessionError::Timeout(d) if d == Duration::from_millis(50)));
    }

    #[test]
    fn write_timeout_maps_to_timeout() {
        let config = SessionConfig {
            read_timeout: Some(Duration::from_millis(50)),
            ..acc_bvp()
        };
        let mut s = Session::new(
            FrameReader::new(Cursor::new(Vec::new())),
            FrameWriter::with_config(WouldBlock, config.frame_config()),
            &config,
        );
        let err = s
            .run(&mut VecSink::default(), &mut NoSelector, &AtomicBool::new(false))
            .unwrap_err();
        assert!(matches!(err, SessionError::Timeout(d) if d == Duration::from_millis(50)));
    }

    #[test]
    fn list_devices_write_timeout_maps_to_timeout() {
        let config = FrameConfig {
            write_timeout: Some(Duration::from_millis(20)),
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::new(Cursor::new(Vec::new()));
        let mut writer = FrameWriter::with_config(WouldBlock, config);

        let err = list_devices(&mut reader, &mut writer).unwrap_err();
        assert!(matches!(err, SessionError::Timeout(d) if d == Duration::from_millis(20)));
    }

    #[test]
    fn stream_start_announces_device_once() {
        let script =
            format!("E4_Bvp 99.0 0.1\r\n{HANDSHAKE}E4_Bvp 100.0 0.25\r\nE4_Bvp 100.5 0.5\r\n");
        let mut s = session(&script, &acc_bvp());
        let mut sink = Announced::default();

        let _ = s.run(&mut sink, &mut NoSelector, &AtomicBool::new(false));
        assert_eq!(sink.serial.as_deref(), Some("9ff167"));
        assert_eq!(sink.samples_before_start, 1);
        assert_eq!(sink.samples, 3);
    }

    #[test]
    fn rejected_session_never_announces() {
        let script =
            "R device_list 1 | 9ff167 Empatica_E4\r\nR device_connect ERR no such device\r\n";
        let mut s = session(script, &acc_bvp());
        let mut sink = Announced::default();

        assert!(s.run(&mut sink, &mut NoSelector, &AtomicBool::new(false)).is_err());
        assert!(sink.serial.is_none());
    }

    #[test]
    fn list_devices_skips_noise() {
        let wire = "E4_Bvp 1.0 0.5\r\nR pause ON\r\nR device_list 1 | 9ff167 Empatica_E4\r\n";
        let mut reader = FrameReader::new(Cursor::new(wire.as_bytes().to_vec()));
        let mut writer = FrameWriter::new(Vec::new());

        let devices = list_devices(&mut reader, &mut writer).unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].id, "9ff167");
        assert_eq!(writer.into_inner(), b"device_list\r\n");
    }

    #[test]
    fn stats_serialize() {
        let json = serde_json::to_value(SessionStats {
            frames: 3,
            ..SessionStats::default()
        })
        .unwrap();
        assert_eq!(json["frames"], 3);
        assert_eq!(json["decode_errors"], 0);
    }
}
