use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use tickwire_channel::{ChannelConfig, ReceiveMode};
use tickwire_transport::{NetListener, NetSocket, TransportError};

use crate::exit::{transport_error, CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;
use crate::session::TICK;

pub mod echo;
pub mod info;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept connections and echo every packet back.
    Echo(EchoArgs),
    /// Send a single packet.
    Send(SendArgs),
    /// Accept connections and print received packets.
    Listen(ListenArgs),
    /// Show version information.
    Version(VersionArgs),
    /// Connect and print the channel status.
    Info(InfoArgs),
}

/// Channel settings shared by every networked command.
#[derive(Args, Debug, Default)]
pub struct ChannelArgs {
    /// Channel configuration file (JSON).
    #[arg(long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,
    /// Heartbeat interval in seconds (0 disables).
    #[arg(long, value_name = "SECONDS", global = true)]
    pub heartbeat: Option<f64>,
    /// Drain the socket on each tick instead of using a reader thread.
    #[arg(long, global = true)]
    pub polled: bool,
}

impl ChannelArgs {
    /// Load `--config` (if any) and apply flag overrides.
    pub fn channel_config(&self) -> CliResult<ChannelConfig> {
        let mut config = match &self.config {
            Some(path) => ChannelConfig::from_path(path).map_err(|err| {
                CliError::new(USAGE, format!("failed loading {}: {err}", path.display()))
            })?,
            None => ChannelConfig::default(),
        };
        if let Some(secs) = self.heartbeat {
            config.heartbeat_interval = secs;
        }
        if self.polled {
            config.receive_mode = ReceiveMode::Polled;
        }
        config
            .validate()
            .map_err(|reason| CliError::new(USAGE, format!("invalid channel config: {reason}")))?;
        Ok(config)
    }
}

pub fn run(command: Command, channel: &ChannelArgs, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args, channel.channel_config()?, format),
        Command::Send(args) => send::run(args, channel.channel_config()?, format),
        Command::Listen(args) => listen::run(args, channel.channel_config()?, format),
        Command::Version(args) => version::run(args),
        Command::Info(args) => info::run(args, channel.channel_config()?, format),
    }
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Address to listen on (e.g. 127.0.0.1:7000).
    pub addr: SocketAddr,
    /// Packet ids to echo (comma-separated). Default: every id.
    #[arg(long, value_delimiter = ',')]
    pub ids: Option<Vec<u32>>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Address to connect to.
    pub addr: SocketAddr,
    /// Packet id to send.
    #[arg(long, default_value = "256")]
    pub id: u32,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Wait for one response packet and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for a response when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
    /// Connection timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Address to listen on.
    pub addr: SocketAddr,
    /// Only print these packet ids (comma-separated).
    #[arg(long, value_delimiter = ',')]
    pub ids: Option<Vec<u32>>,
    /// Exit after receiving N packets.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Address to connect to.
    pub addr: SocketAddr,
    /// Connection timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

/// Parse `5s`, `500ms`, or a bare number of seconds.
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

pub fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

/// Wait for the next inbound connection. Returns `None` once `running`
/// is cleared.
pub fn accept_next(listener: &NetListener, running: &AtomicBool) -> CliResult<Option<NetSocket>> {
    while running.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok(socket) => {
                socket
                    .set_nonblocking(false)
                    .map_err(|err| transport_error("accept failed", err))?;
                return Ok(Some(socket));
            }
            Err(TransportError::Accept(err)) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(TICK);
            }
            Err(err) => return Err(transport_error("accept failed", err)),
        }
    }
    Ok(None)
}

/// True when `id` passes an optional allow-list.
pub fn id_selected(ids: Option<&[u32]>, id: u32) -> bool {
    ids.is_none_or(|ids| ids.contains(&id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }

    #[test]
    fn flags_override_config_defaults() {
        let args = ChannelArgs {
            config: None,
            heartbeat: Some(0.0),
            polled: true,
        };
        let config = args.channel_config().expect("config should build");
        assert_eq!(config.heartbeat_period(), None);
        assert_eq!(config.receive_mode, ReceiveMode::Polled);
    }

    #[test]
    fn negative_heartbeat_is_usage_error() {
        let args = ChannelArgs {
            heartbeat: Some(-1.0),
            ..ChannelArgs::default()
        };
        assert_eq!(args.channel_config().unwrap_err().code, USAGE);
    }

    #[test]
    fn id_filter() {
        assert!(id_selected(None, 7));
        assert!(id_selected(Some(&[7, 8]), 8));
        assert!(!id_selected(Some(&[7, 8]), 9));
    }
}
