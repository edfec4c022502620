use tickwire_channel::ChannelConfig;

use crate::cmd::{parse_duration, InfoArgs};
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_status, OutputFormat};
use crate::session::Session;

pub fn run(args: InfoArgs, config: ChannelConfig, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;

    let mut session = Session::new("info", config)?;
    session.connect(args.addr)?;
    session.run_until("connect failed", Some(timeout), |channel| {
        channel.is_connected()
    })?;

    print_status(&session.channel().status(), format);
    session.close();
    Ok(SUCCESS)
}
