use e4link_session::{list_devices_at, SessionConfig};

use crate::cmd::DevicesArgs;
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_devices, OutputFormat};

pub fn run(args: DevicesArgs, format: OutputFormat) -> CliResult<i32> {
    let config = SessionConfig {
        read_timeout: args.server.read_timeout()?,
        ..SessionConfig::default()
    };
    let devices = list_devices_at(&args.server.addr, &config)
        .map_err(|err| session_error("device listing failed", err))?;

    tracing::debug!(count = devices.len(), "devices listed");
    print_devices(&devices, format);
    Ok(SUCCESS)
}
