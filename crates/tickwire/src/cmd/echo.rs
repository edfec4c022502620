use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tickwire_channel::ChannelConfig;
use tickwire_frame::RawPacket;
use tickwire_transport::NetListener;

use crate::cmd::{accept_next, id_selected, install_ctrlc_handler, EchoArgs};
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::OutputFormat;
use crate::session::Session;

pub fn run(args: EchoArgs, config: ChannelConfig, _format: OutputFormat) -> CliResult<i32> {
    let listener = NetListener::bind(args.addr).map_err(|err| transport_error("bind failed", err))?;
    listener
        .set_nonblocking(true)
        .map_err(|err| transport_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut session = Session::new("echo", config)?;
    let ids = args.ids;
    session
        .channel()
        .set_default_handler(move |sender, packet: &RawPacket| {
            if !should_echo(ids.as_deref(), packet) {
                return;
            }
            tracing::info!(id = packet.id, size = packet.payload.len(), "echoing packet");
            sender.send(packet.clone());
        });

    while let Some(socket) = accept_next(&listener, &running)? {
        if let Err(err) = session.attach(socket) {
            tracing::warn!(error = %err, "dropping connection");
            session.close();
            continue;
        }

        let served = session.run_until("echo failed", None, |channel| {
            !channel.is_connected() || !running.load(Ordering::SeqCst)
        });
        if let Err(err) = served {
            tracing::warn!(error = %err, "connection ended with error");
        }
        session.close();
    }

    Ok(SUCCESS)
}

fn should_echo(ids: Option<&[u32]>, packet: &RawPacket) -> bool {
    !packet.is_heartbeat() && id_selected(ids, packet.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeats_are_never_echoed() {
        assert!(!should_echo(None, &RawPacket::heartbeat()));
        assert!(should_echo(None, &RawPacket::new(300, "x")));
        assert!(!should_echo(Some(&[301]), &RawPacket::new(300, "x")));
    }
}
