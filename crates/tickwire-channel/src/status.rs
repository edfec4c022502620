use std::net::SocketAddr;

use serde::Serialize;

use crate::config::ReceiveMode;

/// Connection lifecycle of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
}

impl ChannelState {
    pub fn as_str(self) -> &'static str {
        match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Connected => "connected",
        }
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time snapshot of a channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelStatus {
    pub name: String,
    pub state: ChannelState,
    /// True while the connection is usable for sending and receiving.
    pub connected: bool,
    pub receive_mode: ReceiveMode,
    pub local_address: Option<SocketAddr>,
    pub remote_address: Option<SocketAddr>,
    /// Packets queued for the next send batch.
    pub pending_send: usize,
    /// Packets received but not yet handed to handlers.
    pub pending_receive: usize,
    pub sent_packets: u64,
    pub received_packets: u64,
    pub missed_heartbeats: u32,
    pub heartbeat_elapsed_secs: f64,
    pub heartbeat_interval_secs: f64,
}
