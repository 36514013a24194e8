use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use e4link_session::{DeviceDescriptor, SlotInfo, StreamDescription};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct SampleOutput<'a> {
    timestamp: f64,
    /// Missing slots serialize as `null`.
    values: Vec<Option<f64>>,
    device: Option<&'a str>,
}

const TIMESTAMP_WIDTH: usize = 14;
const MIN_COLUMN_WIDTH: usize = 8;

/// Prints samples, keeping the slot labels for the table header.
///
/// Table output is a stream of aligned rows under a single header line.
pub struct SamplePrinter {
    format: OutputFormat,
    labels: Vec<&'static str>,
    device: Option<String>,
    header_printed: bool,
}

impl SamplePrinter {
    pub fn new(format: OutputFormat, slots: &[SlotInfo]) -> Self {
        Self {
            format,
            labels: slots.iter().map(|slot| slot.label).collect(),
            device: None,
            header_printed: false,
        }
    }

    pub fn set_device(&mut self, device: Option<String>) {
        self.device = device;
    }

    pub fn print(&mut self, values: &[f64], timestamp: f64) {
        if let Some(header) = self.take_header() {
            println!("{header}");
        }
        println!("{}", self.render(values, timestamp));
    }

    /// The table header, the first time it is asked for.
    fn take_header(&mut self) -> Option<String> {
        if !matches!(self.format, OutputFormat::Table) || self.header_printed {
            return None;
        }
        self.header_printed = true;
        let mut line = format!("{:<TIMESTAMP_WIDTH$}", "TIMESTAMP");
        for label in &self.labels {
            let width = column_width(label);
            line.push_str(&format!("  {:>width$}", label.to_uppercase()));
        }
        Some(line.trim_end().to_string())
    }

    fn render(&self, values: &[f64], timestamp: f64) -> String {
        match self.format {
            OutputFormat::Json => {
                let out = SampleOutput {
                    timestamp,
                    values: values
                        .iter()
                        .map(|v| if v.is_nan() { None } else { Some(*v) })
                        .collect(),
                    device: self.device.as_deref(),
                };
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            }
            OutputFormat::Table => {
                let mut line = format!("{:<TIMESTAMP_WIDTH$}", format!("{timestamp:.3}"));
                for (label, v) in self.labels.iter().zip(values) {
                    let width = column_width(label);
                    let cell = if v.is_nan() {
                        "-".to_string()
                    } else {
                        v.to_string()
                    };
                    line.push_str(&format!("  {cell:>width$}"));
                }
                line
            }
            OutputFormat::Pretty => {
                let fields = self
                    .labels
                    .iter()
                    .zip(values)
                    .filter(|(_, v)| !v.is_nan())
                    .map(|(label, v)| format!("{label}={v}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                format!("ts={timestamp:.3} {fields}")
            }
            OutputFormat::Raw => {
                let mut line = timestamp.to_string();
                for v in values {
                    line.push('\t');
                    line.push_str(&v.to_string());
                }
                line
            }
        }
    }
}

pub fn print_devices(devices: &[DeviceDescriptor], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(&serde_json::json!({
                    "count": devices.len(),
                    "devices": devices,
                }))
                .unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ID", "NAME"]);
            for device in devices {
                table.add_row(vec![device.id.clone(), device.name.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("{} device(s) found", devices.len());
            for device in devices {
                println!("  {}  {}", device.id, device.name);
            }
        }
        OutputFormat::Raw => {
            for device in devices {
                println!("{}", device.id);
            }
        }
    }
}

pub fn print_description(description: &StreamDescription, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(description).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["SLOT", "LABEL", "STREAM", "CHANNEL", "UNIT", "TYPE", "RATE"]);
            for slot in &description.slots {
                table.add_row(vec![
                    slot.index.to_string(),
                    slot.label.to_string(),
                    slot.stream.to_string(),
                    slot.stream.channel().to_string(),
                    slot.unit.to_string(),
                    slot.kind.to_string(),
                    rate(slot.nominal_rate),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{} {} ({})",
                description.manufacturer, description.source_id, description.kind
            );
            for slot in &description.slots {
                println!(
                    "  [{}] {:<12} {:<15} {:<9} {}",
                    slot.index,
                    slot.label,
                    slot.stream,
                    slot.unit,
                    rate(slot.nominal_rate)
                );
            }
        }
        OutputFormat::Raw => {
            for slot in &description.slots {
                println!("{}", slot.label);
            }
        }
    }
}

fn column_width(label: &str) -> usize {
    label.len().max(MIN_COLUMN_WIDTH)
}

fn rate(hz: f64) -> String {
    if hz > 0.0 {
        format!("{hz} Hz")
    } else {
        "irregular".to_string()
    }
}
