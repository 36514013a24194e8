//! Decoding of data lines: `<stream-id> <timestamp> <v1> [v2 v3]`.

use crate::channel::{DataStream, Sample};

/// Result of decoding a line that is not a handshake response.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeOutcome {
    Sample(Sample),
    /// The leading token matches no known stream.
    Unrecognized,
}

/// A data line for a known stream that could not be decoded.
///
/// Only the offending line is lost; the session continues.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("{stream} expects {expected} fields, got {actual}")]
    FieldCount {
        stream: DataStream,
        expected: usize,
        actual: usize,
    },

    #[error("{stream} field {index} is not a number: '{value}'")]
    InvalidNumber {
        stream: DataStream,
        index: usize,
        value: String,
    },
}

/// Decode one data line.
pub fn decode_data_frame(line: &str) -> Result<DecodeOutcome, DecodeError> {
    let mut tokens = line.split_whitespace();
    let Some(stream) = tokens.next().and_then(DataStream::match_token) else {
        return Ok(DecodeOutcome::Unrecognized);
    };

    let fields: Vec<&str> = tokens.collect();
    let expected = 1 + stream.value_count();
    if fields.len() != expected {
        return Err(DecodeError::FieldCount {
            stream,
            expected,
            actual: fields.len(),
        });
    }

    let mut numbers = Vec::with_capacity(expected);
    for (index, field) in fields.iter().enumerate() {
        let value = field
            .parse::<f64>()
            .map_err(|_| DecodeError::InvalidNumber {
                stream,
                index,
                value: field.to_string(),
            })?;
        numbers.push(value);
    }

    let timestamp = numbers[0];
    let values = match stream {
        DataStream::Tag => vec![timestamp],
        _ => numbers.split_off(1),
    };

    Ok(DecodeOutcome::Sample(Sample {
        stream,
        timestamp,
        values,
    }))
}
