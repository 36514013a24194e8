use e4link_session::StreamDescription;

use crate::cmd::ChannelsArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_description, OutputFormat};

/// Prints the layout without contacting a server, so device fields are empty.
pub fn run(_args: ChannelsArgs, format: OutputFormat) -> CliResult<i32> {
    print_description(&StreamDescription::for_device("", ""), format);
    Ok(SUCCESS)
}
