//! Heartbeat example: two channels in one manager, one of them silent.
//!
//! The client sends heartbeats every 200ms. The server never answers, so
//! the client reports missed heartbeats until the server starts replying.
//!
//! Run with:
//!   cargo run --example heartbeat

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tickwire::channel::{ChannelConfig, NetworkManager};
use tickwire::frame::{LengthPrefixedCodec, RawPacket};
use tickwire::transport::NetListener;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = NetListener::bind("127.0.0.1:0".parse()?)?;
    let addr = listener.local_addr();

    let mut manager = NetworkManager::new();
    let client = manager.create_channel_with_config(
        "client",
        LengthPrefixedCodec::new(),
        ChannelConfig::default().with_heartbeat_interval(Duration::from_millis(200)),
    )?;
    let server = manager.create_channel_with_config(
        "server",
        LengthPrefixedCodec::new(),
        ChannelConfig::default().with_heartbeat_interval(Duration::ZERO),
    )?;

    manager.on_connected(|name, _| eprintln!("[{name}] connected"));
    manager.on_missed_heartbeat(|name, count| eprintln!("[{name}] missed heartbeats: {count}"));
    manager.on_closed(|name| eprintln!("[{name}] closed"));

    // After a second the server starts acknowledging heartbeats.
    let replying = Arc::new(AtomicBool::new(false));
    let reply = Arc::clone(&replying);
    server.set_default_handler(move |sender, packet: &RawPacket| {
        if packet.is_heartbeat() && reply.load(Ordering::SeqCst) {
            sender.send(RawPacket::new(256, "ack"));
        }
    });

    client.connect(addr.ip(), addr.port(), None)?;
    server.attach(listener.accept()?, None)?;

    let start = Instant::now();
    let mut last = start;
    while start.elapsed() < Duration::from_secs(2) {
        if start.elapsed() >= Duration::from_secs(1) {
            replying.store(true, Ordering::SeqCst);
        }
        let now = Instant::now();
        manager.update(now - last)?;
        last = now;
        thread::sleep(Duration::from_millis(10));
    }

    for status in manager.status() {
        eprintln!(
            "{}: sent={} received={} missed={}",
            status.name, status.sent_packets, status.received_packets, status.missed_heartbeats
        );
    }
    Ok(())
}
