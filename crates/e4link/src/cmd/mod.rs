use std::time::Duration;

use clap::{Args, Subcommand};
use e4link_session::{ChannelSpec, SessionConfig};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod channels;
pub mod devices;
pub mod stream;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the handshake and print samples as they arrive.
    Stream(StreamArgs),
    /// List the devices the server reports.
    Devices(DevicesArgs),
    /// Show the sample vector layout and channel metadata.
    Channels(ChannelsArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Stream(args) => stream::run(args, format),
        Command::Devices(args) => devices::run(args, format),
        Command::Channels(args) => channels::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServerArgs {
    /// Streaming server address (host:port).
    #[arg(long, env = "E4LINK_ADDR", default_value = "127.0.0.1:28000")]
    pub addr: String,
    /// Fail when the server is silent this long (e.g. 5s, 500ms). Default: wait forever.
    #[arg(long, value_name = "DURATION")]
    pub read_timeout: Option<String>,
}

impl ServerArgs {
    pub fn read_timeout(&self) -> CliResult<Option<Duration>> {
        self.read_timeout.as_deref().map(parse_duration).transpose()
    }
}

#[derive(Args, Debug)]
pub struct StreamArgs {
    #[command(flatten)]
    pub server: ServerArgs,
    /// Channels to subscribe (comma-separated). Default: all.
    #[arg(long, value_name = "LIST")]
    pub channels: Option<String>,
    /// Device id to connect to when several are available.
    #[arg(long, value_name = "ID")]
    pub device: Option<String>,
    /// Exit after printing N samples.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub count: Option<u64>,
}

impl StreamArgs {
    pub fn session_config(&self) -> CliResult<SessionConfig> {
        let channels = match &self.channels {
            Some(list) => ChannelSpec::parse_list(list)
                .map_err(|err| CliError::new(USAGE, format!("invalid --channels: {err}")))?,
            None => ChannelSpec::default(),
        };
        Ok(SessionConfig {
            channels,
            device_id: self.device.clone(),
            read_timeout: self.server.read_timeout()?,
            ..SessionConfig::default()
        })
    }
}

#[derive(Args, Debug)]
pub struct DevicesArgs {
    #[command(flatten)]
    pub server: ServerArgs,
}

#[derive(Args, Debug, Default)]
pub struct ChannelsArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
