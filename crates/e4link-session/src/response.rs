//! Grammar of `R <command> ...` response lines.
//!
//! ```text
//! R device_list <n> | <id> <name> | <id> <name> ...
//! R device_connect OK | ERR <reason>
//! R pause ON | OFF | OK | ERR <reason>
//! R device_subscribe <channel> OK | ERR <reason>
//! ```

use std::fmt;

use e4link_frame::RESPONSE_MARKER;
use serde::Serialize;

const DEVICE_SEPARATOR: &str = " | ";

/// Request/response command families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    List,
    Connect,
    Subscribe,
    Pause,
}

impl Command {
    /// Keyword on the wire.
    pub fn keyword(self) -> &'static str {
        match self {
            Command::List => "device_list",
            Command::Connect => "device_connect",
            Command::Subscribe => "device_subscribe",
            Command::Pause => "pause",
        }
    }

    fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "device_list" => Some(Command::List),
            "device_connect" => Some(Command::Connect),
            "device_subscribe" => Some(Command::Subscribe),
            "pause" => Some(Command::Pause),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Acknowledgement status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Status {
    Ok,
    Err,
}

/// A device reported by `device_list`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DeviceDescriptor {
    pub id: String,
    pub name: String,
}

/// A parsed response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    pub command: Command,
    pub status: Status,
    /// Text after the status: the `ERR` reason, the pause state token
    /// (`ON`/`OFF`), or the raw device list.
    pub payload: String,
    /// Channel named by a `device_subscribe` response.
    pub channel: Option<String>,
    /// Devices of a `device_list` response, deduplicated by id.
    pub devices: Vec<DeviceDescriptor>,
}

impl ParsedResponse {
    fn ack(command: Command, status: Status, payload: &str, channel: Option<&str>) -> Self {
        Self {
            command,
            status,
            payload: payload.to_string(),
            channel: channel.map(str::to_string),
            devices: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

/// Ways a response line can be malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResponseError {
    #[error("line does not start with the response marker")]
    MissingMarker,

    #[error("unknown response command '{0}'")]
    UnknownCommand(String),

    #[error("{command} response is missing its {field}")]
    MissingField {
        command: Command,
        field: &'static str,
    },

    #[error("invalid device count '{0}'")]
    InvalidCount(String),

    #[error("device count mismatch: header says {expected}, found {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("malformed device entry '{0}'")]
    MalformedDevice(String),

    #[error("unknown {command} status '{status}'")]
    UnknownStatus { command: Command, status: String },
}

/// Parse a response line.
pub fn parse_response(line: &str) -> Result<ParsedResponse, ResponseError> {
    let body = line
        .strip_prefix(RESPONSE_MARKER)
        .ok_or(ResponseError::MissingMarker)?
        .trim_start();
    let (keyword, rest) = split_token(body);

    let command = Command::from_keyword(keyword)
        .ok_or_else(|| ResponseError::UnknownCommand(keyword.to_string()))?;

    match command {
        Command::List => parse_device_list(rest),
        Command::Connect | Command::Pause => parse_status(command, rest, None),
        Command::Subscribe => parse_subscribe(rest),
    }
}

fn parse_device_list(rest: &str) -> Result<ParsedResponse, ResponseError> {
    let (count, entries) = split_token(rest);
    if count.is_empty() {
        return Err(ResponseError::MissingField {
            command: Command::List,
            field: "device count",
        });
    }
    let expected: usize = count
        .parse()
        .map_err(|_| ResponseError::InvalidCount(count.to_string()))?;

    let mut response = ParsedResponse::ack(Command::List, Status::Ok, entries, None);
    if expected == 0 {
        return Ok(response);
    }

    let entries = entries
        .strip_prefix('|')
        .map(str::trim_start)
        .ok_or(ResponseError::CountMismatch {
            expected,
            actual: 0,
        })?;
    let entries: Vec<&str> = entries.split(DEVICE_SEPARATOR).map(str::trim).collect();
    if entries.len() != expected {
        return Err(ResponseError::CountMismatch {
            expected,
            actual: entries.len(),
        });
    }

    for entry in entries {
        let (id, name) = entry
            .split_once(' ')
            .filter(|(id, _)| !id.is_empty())
            .ok_or_else(|| ResponseError::MalformedDevice(entry.to_string()))?;
        if response.devices.iter().any(|device| device.id == id) {
            tracing::warn!(id, "duplicate device id in device list");
            continue;
        }
        response.devices.push(DeviceDescriptor {
            id: id.to_string(),
            name: name.trim().to_string(),
        });
    }

    Ok(response)
}

fn parse_subscribe(rest: &str) -> Result<ParsedResponse, ResponseError> {
    let (first, after) = split_token(rest);
    if first.is_empty() {
        return Err(ResponseError::MissingField {
            command: Command::Subscribe,
            field: "channel",
        });
    }
    if is_status_token(first) {
        return parse_status(Command::Subscribe, rest, None);
    }
    parse_status(Command::Subscribe, after, Some(first))
}

fn parse_status(
    command: Command,
    rest: &str,
    channel: Option<&str>,
) -> Result<ParsedResponse, ResponseError> {
    let (status, remainder) = split_token(rest);
    match status {
        "" => Err(ResponseError::MissingField {
            command,
            field: "status",
        }),
        "OK" => Ok(ParsedResponse::ack(command, Status::Ok, remainder, channel)),
        "ERR" => Ok(ParsedResponse::ack(command, Status::Err, remainder, channel)),
        "ON" | "OFF" if command == Command::Pause => {
            Ok(ParsedResponse::ack(command, Status::Ok, status, channel))
        }
        other => Err(ResponseError::UnknownStatus {
            command,
            status: other.to_string(),
        }),
    }
}

fn is_status_token(token: &str) -> bool {
    matches!(token, "OK" | "ERR")
}

/// Split off the first space-separated token.
fn split_token(input: &str) -> (&str, &str) {
    let input = input.trim_start();
    match input.split_once(' ') {
        Some((head, tail)) => (head, tail.trim()),
        None => (input.trim_end(), ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str, name: &str) -> DeviceDescriptor {
        DeviceDescriptor {
            id: id.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn empty_device_list() {
        let resp = parse_response("R device_list 0").unwrap();
        assert_eq!(resp.command, Command::List);
        assert!(resp.devices.is_empty());

        let resp = parse_response("R device_list 0 |").unwrap();
        assert!(resp.devices.is_empty());
    }

    #[test]
    fn single_device_list() {
        let resp = parse_response("R device_list 1 | 9ff167 Empatica_E4").unwrap();
        assert_eq!(resp.devices, vec![device("9ff167", "Empatica_E4")]);
        assert!(resp.is_ok());
    }

    #[test]
    fn multi_device_list() {
        let resp =
            parse_response("R device_list 2 | 9ff167 Empatica_E4 | 7a3166 Empatica_E4 allowed")
                .unwrap();
        assert_eq!(
            resp.devices,
            vec![
                device("9ff167", "Empatica_E4"),
                device("7a3166", "Empatica_E4 allowed")
            ]
        );
    }

    #[test]
    fn device_count_mismatch() {
        let err = parse_response("R device_list 2 | 9ff167 Empatica_E4").unwrap_err();
        assert_eq!(
            err,
            ResponseError::CountMismatch {
                expected: 2,
                actual: 1
            }
        );

        let err = parse_response("R device_list 1").unwrap_err();
        assert_eq!(
            err,
            ResponseError::CountMismatch {
                expected: 1,
                actual: 0
            }
        );
    }

    #[test]
    fn duplicate_ids_collapse() {
        let resp = parse_response("R device_list 2 | 9ff167 Empatica_E4 | 9ff167 Empatica_E4")
            .unwrap();
        assert_eq!(resp.devices, vec![device("9ff167", "Empatica_E4")]);
    }

    #[test]
    fn malformed_device_list() {
        assert_eq!(
            parse_response("R device_list two | x y").unwrap_err(),
            ResponseError::InvalidCount("two".to_string())
        );
        assert_eq!(
            parse_response("R device_list 1 | 9ff167").unwrap_err(),
            ResponseError::MalformedDevice("9ff167".to_string())
        );
        assert!(matches!(
            parse_response("R device_list").unwrap_err(),
            ResponseError::MissingField { .. }
        ));
    }

    #[test]
    fn connect_ok_and_err() {
        let ok = parse_response("R device_connect OK").unwrap();
        assert_eq!(ok.command, Command::Connect);
        assert_eq!(ok.status, Status::Ok);

        let err = parse_response("R device_connect ERR The device requested is not available")
            .unwrap();
        assert_eq!(err.status, Status::Err);
        assert_eq!(err.payload, "The device requested is not available");
    }

    #[test]
    fn pause_states() {
        let on = parse_response("R pause ON").unwrap();
        assert_eq!((on.command, on.status), (Command::Pause, Status::Ok));
        assert_eq!(on.payload, "ON");

        let off = parse_response("R pause OFF").unwrap();
        assert_eq!(off.payload, "OFF");

        let ok = parse_response("R pause OK").unwrap();
        assert!(ok.is_ok());

        let err = parse_response("R pause ERR not connected").unwrap();
        assert_eq!(err.status, Status::Err);
    }

    #[test]
    fn subscribe_carries_channel() {
        let ok = parse_response("R device_subscribe acc OK").unwrap();
        assert_eq!(ok.command, Command::Subscribe);
        assert_eq!(ok.channel.as_deref(), Some("acc"));

        let err =
            parse_response("R device_subscribe gsr ERR You are not connected to any device")
                .unwrap();
        assert_eq!(err.status, Status::Err);
        assert_eq!(err.channel.as_deref(), Some("gsr"));
        assert_eq!(err.payload, "You are not connected to any device");

        let bare = parse_response("R device_subscribe OK").unwrap();
        assert_eq!(bare.channel, None);
    }

    #[test]
    fn malformed_acknowledgements() {
        assert!(matches!(
            parse_response("R device_connect").unwrap_err(),
            ResponseError::MissingField { .. }
        ));
        assert!(matches!(
            parse_response("R device_subscribe acc").unwrap_err(),
            ResponseError::MissingField { .. }
        ));
        assert!(matches!(
            parse_response("R device_connect ON").unwrap_err(),
            ResponseError::UnknownStatus { .. }
        ));
    }

    #[test]
    fn unknown_command_and_marker() {
        assert_eq!(
            parse_response("R device_disconnect OK").unwrap_err(),
            ResponseError::UnknownCommand("device_disconnect".to_string())
        );
        assert_eq!(
            parse_response("E4_Bvp 1.0 2.0").unwrap_err(),
            ResponseError::MissingMarker
        );
    }
}
