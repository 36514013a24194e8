//! Subscribable channels, data streams and the published sample layout.
//!
//! The server is subscribed per [`Channel`] (`acc`, `bvp`, ...) but emits
//! data lines per [`DataStream`] (`E4_Acc`, `E4_Hr`, ...). The `ibi`
//! subscription yields two streams: inter-beat intervals and heart rate.
//!
//! Every published sample is a fixed-width vector of [`SAMPLE_WIDTH`] slots;
//! each stream owns a fixed range of slots and everything else is
//! [`MISSING`].

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Value of a slot the current sample does not carry.
pub const MISSING: f64 = f64::NAN;

/// Width of the published sample vector.
pub const SAMPLE_WIDTH: usize = 10;

/// A subscribable server channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// 3-axis acceleration.
    Acc,
    /// Blood volume pulse.
    Bvp,
    /// Galvanic skin response.
    Gsr,
    /// Inter-beat interval and heart rate.
    Ibi,
    /// Skin temperature.
    Tmp,
    /// Device battery.
    Bat,
    /// Tag taken from the device button.
    Tag,
}

impl Channel {
    /// All channels in default subscription order.
    pub const ALL: [Channel; 7] = [
        Channel::Acc,
        Channel::Bvp,
        Channel::Gsr,
        Channel::Ibi,
        Channel::Tmp,
        Channel::Bat,
        Channel::Tag,
    ];

    /// Name used in `device_subscribe` requests and responses.
    pub fn name(self) -> &'static str {
        match self {
            Channel::Acc => "acc",
            Channel::Bvp => "bvp",
            Channel::Gsr => "gsr",
            Channel::Ibi => "ibi",
            Channel::Tmp => "tmp",
            Channel::Bat => "bat",
            Channel::Tag => "tag",
        }
    }

    /// Data streams this subscription produces.
    pub fn streams(self) -> &'static [DataStream] {
        match self {
            Channel::Acc => &[DataStream::Acc],
            Channel::Bvp => &[DataStream::Bvp],
            Channel::Gsr => &[DataStream::Gsr],
            Channel::Ibi => &[DataStream::Ibi, DataStream::Hr],
            Channel::Tmp => &[DataStream::Temperature],
            Channel::Bat => &[DataStream::Battery],
            Channel::Tag => &[DataStream::Tag],
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Channel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|channel| channel.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownChannel(s.to_string()))
    }
}

/// A channel name that is not one of [`Channel::ALL`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown channel '{0}' (expected one of acc, bvp, gsr, ibi, tmp, bat, tag)")]
pub struct UnknownChannel(pub String);

/// A data stream as identified by the leading token of a data line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataStream {
    Acc,
    Bvp,
    Gsr,
    Ibi,
    Hr,
    Temperature,
    Battery,
    Tag,
}

impl DataStream {
    /// All streams in slot order.
    pub const ALL: [DataStream; 8] = [
        DataStream::Acc,
        DataStream::Bvp,
        DataStream::Gsr,
        DataStream::Ibi,
        DataStream::Hr,
        DataStream::Temperature,
        DataStream::Battery,
        DataStream::Tag,
    ];

    /// Leading token of this stream's data lines.
    pub fn id(self) -> &'static str {
        match self {
            DataStream::Acc => "E4_Acc",
            DataStream::Bvp => "E4_Bvp",
            DataStream::Gsr => "E4_Gsr",
            DataStream::Ibi => "E4_Ibi",
            DataStream::Hr => "E4_Hr",
            DataStream::Temperature => "E4_Temperature",
            DataStream::Battery => "E4_Battery",
            DataStream::Tag => "E4_Tag",
        }
    }

    /// Number of values after the timestamp.
    ///
    /// The tag line carries only its timestamp, which doubles as the value.
    pub fn value_count(self) -> usize {
        match self {
            DataStream::Acc => 3,
            DataStream::Tag => 0,
            _ => 1,
        }
    }

    /// Number of slots this stream occupies in the sample vector.
    pub fn width(self) -> usize {
        match self {
            DataStream::Acc => 3,
            _ => 1,
        }
    }

    /// First slot of this stream in the sample vector.
    pub fn slot(self) -> usize {
        match self {
            DataStream::Acc => 0,
            DataStream::Bvp => 3,
            DataStream::Gsr => 4,
            DataStream::Ibi => 5,
            DataStream::Hr => 6,
            DataStream::Temperature => 7,
            DataStream::Battery => 8,
            DataStream::Tag => 9,
        }
    }

    /// Channel whose subscription produces this stream.
    pub fn channel(self) -> Channel {
        match self {
            DataStream::Acc => Channel::Acc,
            DataStream::Bvp => Channel::Bvp,
            DataStream::Gsr => Channel::Gsr,
            DataStream::Ibi | DataStream::Hr => Channel::Ibi,
            DataStream::Temperature => Channel::Tmp,
            DataStream::Battery => Channel::Bat,
            DataStream::Tag => Channel::Tag,
        }
    }

    /// Stream whose id is the longest prefix of `token`.
    pub fn match_token(token: &str) -> Option<DataStream> {
        DataStream::ALL
            .into_iter()
            .filter(|stream| token.starts_with(stream.id()))
            .max_by_key(|stream| stream.id().len())
    }
}

impl fmt::Display for DataStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// One decoded data line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub stream: DataStream,
    pub timestamp: f64,
    pub values: Vec<f64>,
}

impl Sample {
    /// Merge into a fresh sample vector, leaving foreign slots [`MISSING`].
    pub fn to_vector(&self) -> [f64; SAMPLE_WIDTH] {
        let mut out = [MISSING; SAMPLE_WIDTH];
        let start = self.stream.slot();
        for (slot, value) in out[start..start + self.stream.width()]
            .iter_mut()
            .zip(&self.values)
        {
            *slot = *value;
        }
        out
    }
}

/// Ordered, duplicate-free list of channels to subscribe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSpec {
    channels: Vec<Channel>,
}

impl ChannelSpec {
    /// Build from an explicit list. Duplicates are dropped; order is kept.
    ///
    /// Returns `None` for an empty list.
    pub fn new(channels: impl IntoIterator<Item = Channel>) -> Option<Self> {
        let mut out: Vec<Channel> = Vec::new();
        for channel in channels {
            if !out.contains(&channel) {
                out.push(channel);
            }
        }
        if out.is_empty() {
            return None;
        }
        Some(Self { channels: out })
    }

    /// Parse a comma-separated list such as `acc,bvp,tag`.
    pub fn parse_list(list: &str) -> Result<Self, UnknownChannel> {
        let channels = list
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<Channel>, _>>()?;
        Self::new(channels).ok_or_else(|| UnknownChannel(list.to_string()))
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Channel> {
        self.channels.get(index).copied()
    }
}

impl Default for ChannelSpec {
    fn default() -> Self {
        Self {
            channels: Channel::ALL.to_vec(),
        }
    }
}

/// Description of one slot of the sample vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotInfo {
    pub index: usize,
    pub label: &'static str,
    pub unit: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Nominal sampling rate in Hz; `0.0` for irregular streams.
    pub nominal_rate: f64,
    pub stream: DataStream,
}

/// Metadata describing the published stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamDescription {
    pub source_id: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub manufacturer: &'static str,
    pub device_name: String,
    pub serial: String,
    pub slots: Vec<SlotInfo>,
}

impl StreamDescription {
    /// Describe the stream published for a given device.
    pub fn for_device(device_name: &str, serial: &str) -> Self {
        Self {
            source_id: "Empatica_E4",
            kind: "wristband",
            manufacturer: "Empatica",
            device_name: device_name.to_string(),
            serial: serial.to_string(),
            slots: slot_layout(),
        }
    }
}

/// Per-slot layout of the sample vector.
pub fn slot_layout() -> Vec<SlotInfo> {
    let mut slots = Vec::with_capacity(SAMPLE_WIDTH);
    for stream in DataStream::ALL {
        let (labels, unit, kind, nominal_rate): (&[&'static str], _, _, _) = match stream {
            DataStream::Acc => (&["acc_x", "acc_y", "acc_z"][..], "1/64g", "accelerometer", 32.0),
            DataStream::Bvp => (&["bvp"][..], "nW", "ppg", 64.0),
            DataStream::Gsr => (&["gsr"][..], "uS", "eda", 4.0),
            DataStream::Ibi => (&["ibi"][..], "s", "ibi", 0.0),
            DataStream::Hr => (&["hr"][..], "bpm", "heart_rate", 0.0),
            DataStream::Temperature => (&["temperature"][..], "celsius", "temperature", 4.0),
            DataStream::Battery => (&["battery"][..], "fraction", "battery", 0.0),
            DataStream::Tag => (&["tag"][..], "s", "marker", 0.0),
        };
        for (offset, &label) in labels.iter().enumerate() {
            slots.push(SlotInfo {
                index: stream.slot() + offset,
                label,
                unit,
                kind,
                nominal_rate,
                stream,
            });
        }
    }
    slots
}
