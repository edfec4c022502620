use std::fs;
use std::sync::{Arc, Mutex, PoisonError};

use tickwire_channel::ChannelConfig;
use tickwire_frame::RawPacket;

use crate::cmd::{parse_duration, SendArgs};
use crate::exit::{channel_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_packet, OutputFormat};
use crate::session::Session;

pub fn run(args: SendArgs, config: ChannelConfig, format: OutputFormat) -> CliResult<i32> {
    let connect_timeout = parse_duration(&args.timeout)?;
    let wait_timeout = parse_duration(&args.wait_timeout)?;
    let payload = resolve_payload(&args)?;

    let mut session = Session::new("send", config)?;
    let response = Arc::new(Mutex::new(None));
    if args.wait {
        let slot = Arc::clone(&response);
        session
            .channel()
            .set_default_handler(move |_, packet: &RawPacket| {
                let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
                if slot.is_none() && !packet.is_heartbeat() {
                    *slot = Some(packet.clone());
                }
            });
    }

    session.connect(args.addr)?;
    session.run_until("connect failed", Some(connect_timeout), |channel| {
        channel.is_connected()
    })?;

    session
        .channel()
        .send(RawPacket::new(args.id, payload))
        .map_err(|err| channel_error("send failed", err))?;
    session.run_until("send failed", Some(connect_timeout), |channel| {
        channel.sent_packets() >= 1
    })?;
    tracing::debug!(id = args.id, "packet sent");

    if args.wait {
        session.run_until("receive failed", Some(wait_timeout), |_| {
            response
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_some()
        })?;
        let packet = response
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(packet) = packet {
            print_packet(&packet, session.channel().name(), format);
        }
    }

    session.close();
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use super::*;

    fn base_args() -> SendArgs {
        SendArgs {
            addr: SocketAddr::from(([127, 0, 0, 1], 9)),
            id: 300,
            json: None,
            data: None,
            file: None,
            wait: false,
            wait_timeout: "5s".into(),
            timeout: "5s".into(),
        }
    }

    #[test]
    fn invalid_json_is_usage_error() {
        let args = SendArgs {
            json: Some("{nope".into()),
            ..base_args()
        };
        assert_eq!(resolve_payload(&args).unwrap_err().code, USAGE);
    }

    #[test]
    fn data_payload_is_bytes() {
        let args = SendArgs {
            data: Some("hello".into()),
            ..base_args()
        };
        assert_eq!(resolve_payload(&args).unwrap(), b"hello");
        assert!(resolve_payload(&base_args()).unwrap().is_empty());
    }
}
