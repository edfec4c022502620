use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tickwire_channel::ChannelConfig;
use tickwire_frame::RawPacket;
use tickwire_transport::NetListener;

use crate::cmd::{accept_next, id_selected, install_ctrlc_handler, ListenArgs};
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::{print_packet, OutputFormat};
use crate::session::Session;

pub fn run(args: ListenArgs, config: ChannelConfig, format: OutputFormat) -> CliResult<i32> {
    let listener = NetListener::bind(args.addr).map_err(|err| transport_error("bind failed", err))?;
    listener
        .set_nonblocking(true)
        .map_err(|err| transport_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut session = Session::new("listen", config)?;
    let printed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&printed);
    let ids = args.ids;
    let count = args.count;
    session
        .channel()
        .set_default_handler(move |sender, packet: &RawPacket| {
            if packet.is_heartbeat() || !id_selected(ids.as_deref(), packet.id) {
                return;
            }
            if count.is_some_and(|count| counter.load(Ordering::SeqCst) >= count) {
                return;
            }
            print_packet(packet, sender.channel_name(), format);
            counter.fetch_add(1, Ordering::SeqCst);
        });
    let done = || count.is_some_and(|count| printed.load(Ordering::SeqCst) >= count);

    while let Some(socket) = accept_next(&listener, &running)? {
        if let Err(err) = session.attach(socket) {
            tracing::warn!(error = %err, "dropping connection");
            session.close();
            continue;
        }

        let served = session.run_until("listen failed", None, |channel| {
            done() || !channel.is_connected() || !running.load(Ordering::SeqCst)
        });
        if let Err(err) = served {
            tracing::warn!(error = %err, "connection ended with error");
        }
        session.close();
        if done() {
            break;
        }
    }

    Ok(SUCCESS)
}
