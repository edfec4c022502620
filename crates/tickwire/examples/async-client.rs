//! Async client talking to a tick-driven echo channel.
//!
//! The server side is a regular `NetworkChannel` ticked on its own thread;
//! the client frames packets with `PacketFramer` on a tokio `TcpStream`.
//!
//! Run with:
//!   cargo run --example async-client --features async

use std::thread;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tickwire::channel::NetworkManager;
use tickwire::frame::{LengthPrefixedCodec, PacketFramer, RawPacket};
use tickwire::transport::NetListener;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

fn serve_once(listener: NetListener) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut manager = NetworkManager::new();
    let channel = manager.create_channel("echo", LengthPrefixedCodec::new())?;
    channel.set_default_handler(|sender, packet: &RawPacket| {
        if !packet.is_heartbeat() {
            sender.send(packet.clone());
        }
    });
    channel.attach(listener.accept()?, None)?;

    let mut last = Instant::now();
    while channel.is_connected() {
        let now = Instant::now();
        manager.update(now - last)?;
        last = now;
        thread::sleep(Duration::from_millis(5));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = NetListener::bind("127.0.0.1:0".parse()?)?;
    let addr = listener.local_addr();
    let server = thread::spawn(move || serve_once(listener));

    let stream = TcpStream::connect(addr).await?;
    let mut framed = Framed::new(stream, PacketFramer::new(LengthPrefixedCodec::new()));

    for (id, text) in [(300, "hello"), (301, "world")] {
        framed.send(RawPacket::new(id, text)).await?;
        let decoded = framed.next().await.ok_or("server closed early")??;
        if let Some(packet) = decoded.value {
            println!(
                "echo id={} payload={}",
                packet.id,
                String::from_utf8_lossy(&packet.payload)
            );
        }
    }

    drop(framed);
    server.join().map_err(|_| "server thread panicked")??;
    Ok(())
}
