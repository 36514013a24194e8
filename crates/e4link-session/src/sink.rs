//! Collaborators the session hands samples and device choices to.

use std::io::{BufRead, Write};

use crate::channel::StreamDescription;
use crate::response::DeviceDescriptor;

/// Downstream consumer of decoded samples.
pub trait SampleSink {
    /// Whether anyone is consuming right now.
    ///
    /// Checked before each publish so the vector is only built when needed.
    fn has_active_subscriber(&self) -> bool {
        true
    }

    /// Called once, when the handshake completes and before the first sample.
    fn stream_started(&mut self, _description: &StreamDescription) {}

    /// Hand over one fixed-width sample vector.
    fn publish(&mut self, values: &[f64], timestamp: f64);
}

/// Picks a device when the server reports more than one.
pub trait DeviceSelector {
    /// Return the id of one of `devices`, or `None` to give up.
    fn choose(&mut self, devices: &[DeviceDescriptor]) -> Option<String>;
}

/// Always answers with the same id.
#[derive(Debug, Clone)]
pub struct FixedSelector {
    id: String,
}

impl FixedSelector {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl DeviceSelector for FixedSelector {
    fn choose(&mut self, _devices: &[DeviceDescriptor]) -> Option<String> {
        Some(self.id.clone())
    }
}

/// Never selects; multi-device servers end the session.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSelector;

impl DeviceSelector for NoSelector {
    fn choose(&mut self, _devices: &[DeviceDescriptor]) -> Option<String> {
        None
    }
}

/// Asks a human: lists the devices on `output` and reads an id from `input`.
pub struct PromptSelector<I, O> {
    input: I,
    output: O,
}

impl<I: BufRead, O: Write> PromptSelector<I, O> {
    pub fn new(input: I, output: O) -> Self {
        Self { input, output }
    }
}

impl PromptSelector<std::io::StdinLock<'static>, std::io::Stderr> {
    /// Prompt on stderr, read from stdin.
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stderr())
    }
}

impl<I: BufRead, O: Write> DeviceSelector for PromptSelector<I, O> {
    fn choose(&mut self, devices: &[DeviceDescriptor]) -> Option<String> {
        let _ = writeln!(self.output, "{} devices found:", devices.len());
        for device in devices {
            let _ = writeln!(self.output, "  {}  {}", device.id, device.name);
        }
        let _ = write!(self.output, "Select device id: ");
        let _ = self.output.flush();

        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()).filter(|id| !id.is_empty()),
        }
    }
}

/// Collects everything published. Useful for tests and batch consumers.
#[derive(Debug, Default, Clone)]
pub struct VecSink {
    pub samples: Vec<(Vec<f64>, f64)>,
}

impl SampleSink for VecSink {
    fn publish(&mut self, values: &[f64], timestamp: f64) {
        self.samples.push((values.to_vec(), timestamp));
    }
}
