//! Minimal echo server: accepts one connection and echoes packets back.
//!
//! Run with:
//!   cargo run --example echo-server
//!
//! In another terminal, using the printed address:
//!   cargo run --features cli -- send 127.0.0.1:PORT --id 300 \
//!     --json '{"hello":"world"}' --wait

use std::thread;
use std::time::{Duration, Instant};

use tickwire::channel::NetworkManager;
use tickwire::frame::{LengthPrefixedCodec, RawPacket};
use tickwire::transport::NetListener;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = NetListener::bind("127.0.0.1:0".parse()?)?;
    eprintln!("Listening on {}", listener.local_addr());

    let mut manager = NetworkManager::new();
    let channel = manager.create_channel("echo", LengthPrefixedCodec::new())?;
    channel.set_default_handler(|sender, packet: &RawPacket| {
        if packet.is_heartbeat() {
            return;
        }
        eprintln!(
            "Received {} bytes with id {}",
            packet.payload.len(),
            packet.id
        );
        sender.send(packet.clone());
    });
    manager.on_closed(|name| eprintln!("Channel {name} closed"));

    // Accept one connection and echo until it closes.
    channel.attach(listener.accept()?, None)?;
    eprintln!("Peer connected: {}", channel.remote_addr()?);

    let mut last = Instant::now();
    while channel.is_connected() {
        let now = Instant::now();
        manager.update(now - last)?;
        last = now;
        thread::sleep(Duration::from_millis(10));
    }

    Ok(())
}
