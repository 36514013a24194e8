//! Handshake state machine.
//!
//! ```text
//! New ─list─▶ DevicesFound ─connect─▶ ConnectedToDevice ─pause ON─▶
//!     ReadyToSubscribe(0) ─subscribe─▶ … ReadyToSubscribe(n-1) ─subscribe─▶
//!     SubscriptionsComplete ─pause OFF─▶ Streaming
//! ```
//!
//! Each arrow is one request followed by its matching success response.
//! Between the two the machine sits in `AwaitingResponse(phase)` and only a
//! response for that phase moves it on. The machine never looks at a clock.

use std::fmt;

use crate::channel::{Channel, ChannelSpec};
use crate::error::FatalReason;
use crate::response::{Command, DeviceDescriptor, ParsedResponse, Status};
use crate::sink::DeviceSelector;

/// The exchange the machine is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    List,
    Connect,
    PauseOn,
    /// Subscription of the channel at this index.
    Subscribe(usize),
    PauseOff,
}

impl Phase {
    /// Command family a response to this phase must carry.
    pub fn command(self) -> Command {
        match self {
            Phase::List => Command::List,
            Phase::Connect => Command::Connect,
            Phase::PauseOn | Phase::PauseOff => Command::Pause,
            Phase::Subscribe(_) => Command::Subscribe,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    New,
    AwaitingResponse(Phase),
    NoDevicesFound,
    DevicesFound,
    ConnectedToDevice,
    ReadyToSubscribe(usize),
    SubscriptionsComplete,
    Streaming,
    Fatal(FatalReason),
}

impl HandshakeState {
    /// No further protocol traffic will be sent.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            HandshakeState::NoDevicesFound | HandshakeState::Fatal(_)
        )
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeState::New => f.write_str("new"),
            HandshakeState::AwaitingResponse(phase) => write!(f, "awaiting {phase:?}"),
            HandshakeState::NoDevicesFound => f.write_str("no devices found"),
            HandshakeState::DevicesFound => f.write_str("devices found"),
            HandshakeState::ConnectedToDevice => f.write_str("connected"),
            HandshakeState::ReadyToSubscribe(i) => write!(f, "ready to subscribe #{i}"),
            HandshakeState::SubscriptionsComplete => f.write_str("subscriptions complete"),
            HandshakeState::Streaming => f.write_str("streaming"),
            HandshakeState::Fatal(reason) => write!(f, "fatal: {reason}"),
        }
    }
}

/// Outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    DeviceList,
    DeviceConnect(String),
    DeviceSubscribe { channel: Channel, on: bool },
    Pause(bool),
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::DeviceList => f.write_str(Command::List.keyword()),
            Request::DeviceConnect(id) => write!(f, "{} {id}", Command::Connect),
            Request::DeviceSubscribe { channel, on } => {
                write!(f, "{} {channel} {}", Command::Subscribe, on_off(*on))
            }
            Request::Pause(on) => write!(f, "{} {}", Command::Pause, on_off(*on)),
        }
    }
}

fn on_off(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}

/// What a response did to the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// The state changed.
    Applied,
    /// The response did not match what the machine waits for.
    Ignored(String),
}

/// Protocol state plus what the handshake has learned so far.
///
/// The session owns the only instance; every transition goes through
/// [`Handshake::poll_request`], [`Handshake::on_response`] or
/// [`Handshake::fail`].
#[derive(Debug, Clone)]
pub struct Handshake {
    state: HandshakeState,
    channels: ChannelSpec,
    preselected: Option<String>,
    devices: Vec<DeviceDescriptor>,
    device: Option<DeviceDescriptor>,
}

impl Handshake {
    pub fn new(channels: ChannelSpec) -> Self {
        Self {
            state: HandshakeState::New,
            channels,
            preselected: None,
            devices: Vec::new(),
            device: None,
        }
    }

    /// Answer the multi-device question with `id` instead of asking the selector.
    pub fn with_preselected_device(mut self, id: Option<String>) -> Self {
        self.preselected = id;
        self
    }

    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    pub fn channels(&self) -> &ChannelSpec {
        &self.channels
    }

    /// Devices reported by the server.
    pub fn devices(&self) -> &[DeviceDescriptor] {
        &self.devices
    }

    /// Device the session connects to, once chosen.
    pub fn device(&self) -> Option<&DeviceDescriptor> {
        self.device.as_ref()
    }

    /// Request to send on entering the current state, if any.
    ///
    /// Returning a request moves the machine to `AwaitingResponse`, so each
    /// request is handed out exactly once.
    pub fn poll_request(&mut self) -> Option<Request> {
        let (request, phase) = match &self.state {
            HandshakeState::New => (Request::DeviceList, Phase::List),
            HandshakeState::DevicesFound => {
                let id = self.device.as_ref()?.id.clone();
                (Request::DeviceConnect(id), Phase::Connect)
            }
            HandshakeState::ConnectedToDevice => (Request::Pause(true), Phase::PauseOn),
            HandshakeState::ReadyToSubscribe(index) => {
                let channel = self.channels.get(*index)?;
                (
                    Request::DeviceSubscribe { channel, on: true },
                    Phase::Subscribe(*index),
                )
            }
            HandshakeState::SubscriptionsComplete => (Request::Pause(false), Phase::PauseOff),
            _ => return None,
        };
        self.state = HandshakeState::AwaitingResponse(phase);
        Some(request)
    }

    /// Feed a parsed response.
    pub fn on_response(
        &mut self,
        response: &ParsedResponse,
        selector: &mut dyn DeviceSelector,
    ) -> Disposition {
        let HandshakeState::AwaitingResponse(phase) = self.state else {
            return Disposition::Ignored(format!(
                "unsolicited {} response in state '{}'",
                response.command, self.state
            ));
        };
        if response.command != phase.command() {
            return Disposition::Ignored(format!(
                "{} response while awaiting {:?}",
                response.command, phase
            ));
        }

        if let Phase::Subscribe(index) = phase {
            if let (Some(named), Some(expected)) = (&response.channel, self.channels.get(index)) {
                if named != expected.name() {
                    let kind = match response.status {
                        Status::Ok => "acknowledgement",
                        Status::Err => "rejection",
                    };
                    return Disposition::Ignored(format!(
                        "subscribe {kind} for '{named}' while awaiting '{expected}'"
                    ));
                }
            }
        }

        if response.status == Status::Err {
            let reason = match &response.channel {
                Some(channel) => format!("{channel}: {}", response.payload),
                None => response.payload.clone(),
            };
            self.state = HandshakeState::Fatal(FatalReason::Rejected {
                command: response.command,
                reason,
            });
            return Disposition::Applied;
        }

        self.state = match phase {
            Phase::List => self.select_device(&response.devices, selector),
            Phase::Connect => {
                tracing::info!(device = ?self.device.as_ref().map(|d| &d.id), "connected to device");
                HandshakeState::ConnectedToDevice
            }
            Phase::PauseOn => {
                if response.payload == "OFF" {
                    return Disposition::Ignored("pause OFF acknowledged while pausing".into());
                }
                tracing::debug!("streaming paused");
                self.after_subscription(None)
            }
            Phase::Subscribe(index) => {
                let expected = self.channels.get(index);
                tracing::info!(channel = ?expected.map(Channel::name), "subscribed");
                self.after_subscription(Some(index))
            }
            Phase::PauseOff => {
                if response.payload == "ON" {
                    return Disposition::Ignored("pause ON acknowledged while resuming".into());
                }
                tracing::info!("streaming started");
                HandshakeState::Streaming
            }
        };
        Disposition::Applied
    }

    /// Enter the terminal failure state.
    pub fn fail(&mut self, reason: FatalReason) {
        self.state = HandshakeState::Fatal(reason);
    }

    fn after_subscription(&self, completed: Option<usize>) -> HandshakeState {
        let next = completed.map_or(0, |index| index + 1);
        if next >= self.channels.len() {
            HandshakeState::SubscriptionsComplete
        } else {
            HandshakeState::ReadyToSubscribe(next)
        }
    }

    fn select_device(
        &mut self,
        devices: &[DeviceDescriptor],
        selector: &mut dyn DeviceSelector,
    ) -> HandshakeState {
        self.devices = devices.to_vec();
        let ids: Vec<&str> = devices.iter().map(|d| d.id.as_str()).collect();
        tracing::info!(count = devices.len(), devices = ?ids, "device list received");

        let chosen = match devices {
            [] => return HandshakeState::NoDevicesFound,
            [only] => {
                tracing::info!(id = %only.id, "selecting the only device");
                Some(only.id.clone())
            }
            _ => match &self.preselected {
                Some(id) => Some(id.clone()),
                None => selector.choose(devices),
            },
        };

        let Some(id) = chosen else {
            return HandshakeState::Fatal(FatalReason::InvalidSelection(
                "no device selected".to_string(),
            ));
        };
        match devices.iter().find(|device| device.id == id) {
            Some(device) => {
                self.device = Some(device.clone());
                HandshakeState::DevicesFound
            }
            None => HandshakeState::Fatal(FatalReason::InvalidSelection(format!(
                "'{id}' is not among the reported devices"
            ))),
        }
    }
}
