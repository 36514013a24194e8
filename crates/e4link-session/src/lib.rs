//! Session layer for the Empatica E4 streaming server.
//!
//! Drives the device handshake (list, connect, pause, subscribe, resume)
//! strictly in response to server acknowledgements, then demultiplexes the
//! data stream into fixed-width samples for a [`SampleSink`].

pub mod channel;
pub mod connector;
pub mod data;
pub mod error;
pub mod handshake;
pub mod response;
pub mod session;
pub mod sink;

pub use channel::{
    slot_layout, Channel, ChannelSpec, DataStream, Sample, SlotInfo, StreamDescription,
    UnknownChannel, MISSING, SAMPLE_WIDTH,
};
pub use connector::{connect, connect_with_config, list_devices_at};
pub use data::{decode_data_frame, DecodeError, DecodeOutcome};
pub use error::{FatalReason, Result, SessionError};
pub use handshake::{Disposition, Handshake, HandshakeState, Phase, Request};
pub use response::{
    parse_response, Command, DeviceDescriptor, ParsedResponse, ResponseError, Status,
};
pub use session::{list_devices, Session, SessionConfig, SessionOutcome, SessionStats};
pub use sink::{DeviceSelector, FixedSelector, NoSelector, PromptSelector, SampleSink, VecSink};
