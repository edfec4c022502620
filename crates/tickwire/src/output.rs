use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use tickwire_channel::ChannelStatus;
use tickwire_frame::ids::packet_name;
use tickwire_frame::RawPacket;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct PacketOutput<'a> {
    channel: &'a str,
    id: u32,
    id_name: &'static str,
    payload_size: usize,
    payload: String,
    timestamp: String,
}

pub fn print_packet(packet: &RawPacket, channel: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = PacketOutput {
                channel,
                id: packet.id,
                id_name: packet_name(packet.id),
                payload_size: packet.payload.len(),
                payload: payload_preview(packet.payload.as_ref()),
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ID", "KIND", "SIZE", "CHANNEL", "PAYLOAD"])
                .add_row(vec![
                    packet.id.to_string(),
                    packet_name(packet.id).to_string(),
                    packet.payload.len().to_string(),
                    channel.to_string(),
                    payload_preview(packet.payload.as_ref()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "id={} ({}) size={} channel={} payload={}",
                packet.id,
                packet_name(packet.id),
                packet.payload.len(),
                channel,
                payload_preview(packet.payload.as_ref())
            );
        }
        OutputFormat::Raw => {
            print_raw(packet.payload.as_ref());
        }
    }
}

pub fn print_status(status: &ChannelStatus, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(status).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FIELD", "VALUE"]);
            for (field, value) in status_rows(status) {
                table.add_row(vec![field.to_string(), value]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!("Channel Status:");
            for (field, value) in status_rows(status) {
                println!("  {:<18}{value}", format!("{field}:"));
            }
        }
        OutputFormat::Raw => match status.remote_address {
            Some(addr) => println!("{addr}"),
            None => println!("{}", status.state),
        },
    }
}

fn status_rows(status: &ChannelStatus) -> Vec<(&'static str, String)> {
    let address = |addr: Option<std::net::SocketAddr>| {
        addr.map(|a| a.to_string())
            .unwrap_or_else(|| "unavailable".to_string())
    };
    vec![
        ("Name", status.name.clone()),
        ("State", status.state.to_string()),
        ("Receive mode", status.receive_mode.as_str().to_string()),
        ("Local address", address(status.local_address)),
        ("Remote address", address(status.remote_address)),
        ("Pending send", status.pending_send.to_string()),
        ("Pending receive", status.pending_receive.to_string()),
        ("Sent", status.sent_packets.to_string()),
        ("Received", status.received_packets.to_string()),
        ("Missed heartbeats", status.missed_heartbeats.to_string()),
        (
            "Heartbeat",
            format!(
                "{:.1}s / {:.1}s",
                status.heartbeat_elapsed_secs, status.heartbeat_interval_secs
            ),
        ),
    ]
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
