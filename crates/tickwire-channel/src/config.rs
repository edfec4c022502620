use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tickwire_frame::DEFAULT_MAX_PACKET_LENGTH;
use tickwire_transport::{AddressFamily, SocketOptions};

/// Default heartbeat interval in seconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: f64 = 30.0;

/// Default socket buffer size: 64 KiB.
pub const DEFAULT_SOCKET_BUFFER_SIZE: usize = 64 * 1024;

/// How a channel collects inbound bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiveMode {
    /// A dedicated reader thread keeps exactly one blocking read outstanding.
    #[default]
    Async,
    /// The socket is non-blocking and every tick drains whatever is
    /// currently available.
    Polled,
}

impl ReceiveMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ReceiveMode::Async => "async",
            ReceiveMode::Polled => "polled",
        }
    }
}

/// Per-channel behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChannelConfig {
    /// Seconds between heartbeats. `0` disables heartbeats.
    pub heartbeat_interval: f64,
    /// Whether inbound traffic also restarts the heartbeat timer, in
    /// addition to clearing the missed count.
    pub reset_heartbeat_on_receive: bool,
    /// `SO_RCVBUF` in bytes. `0` keeps the OS default.
    pub receive_buffer_size: usize,
    /// `SO_SNDBUF` in bytes. `0` keeps the OS default.
    pub send_buffer_size: usize,
    pub receive_mode: ReceiveMode,
    /// Reject connects to addresses outside this family.
    pub address_family: Option<AddressFamily>,
    /// Disable Nagle's algorithm.
    pub nodelay: bool,
    /// Largest body a header may declare.
    pub max_packet_length: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            reset_heartbeat_on_receive: true,
            receive_buffer_size: DEFAULT_SOCKET_BUFFER_SIZE,
            send_buffer_size: DEFAULT_SOCKET_BUFFER_SIZE,
            receive_mode: ReceiveMode::Async,
            address_family: None,
            nodelay: true,
            max_packet_length: DEFAULT_MAX_PACKET_LENGTH,
        }
    }
}

impl ChannelConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load a JSON config file.
    pub fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text).map_err(std::io::Error::other)
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval.as_secs_f64();
        self
    }

    pub fn with_reset_heartbeat_on_receive(mut self, reset: bool) -> Self {
        self.reset_heartbeat_on_receive = reset;
        self
    }

    pub fn with_receive_mode(mut self, mode: ReceiveMode) -> Self {
        self.receive_mode = mode;
        self
    }

    pub fn with_address_family(mut self, family: AddressFamily) -> Self {
        self.address_family = Some(family);
        self
    }

    pub fn with_max_packet_length(mut self, max: usize) -> Self {
        self.max_packet_length = max;
        self
    }

    /// Heartbeat period, or `None` when heartbeats are disabled.
    pub fn heartbeat_period(&self) -> Option<Duration> {
        if self.heartbeat_interval > 0.0 {
            Duration::try_from_secs_f64(self.heartbeat_interval).ok()
        } else {
            None
        }
    }

    /// Socket options derived from this config.
    pub fn socket_options(&self) -> SocketOptions {
        SocketOptions {
            nodelay: self.nodelay,
            receive_buffer_size: self.receive_buffer_size,
            send_buffer_size: self.send_buffer_size,
        }
    }

    /// Check for values no channel can run with.
    pub fn validate(&self) -> Result<(), String> {
        if !self.heartbeat_interval.is_finite() || self.heartbeat_interval < 0.0 {
            return Err(format!(
                "heartbeat_interval must be a non-negative number of seconds, got {}",
                self.heartbeat_interval
            ));
        }
        if self.max_packet_length == 0 {
            return Err("max_packet_length must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ChannelConfig::default();
        assert_eq!(cfg.heartbeat_period(), Some(Duration::from_secs(30)));
        assert!(cfg.reset_heartbeat_on_receive);
        assert_eq!(cfg.receive_buffer_size, 64 * 1024);
        assert_eq!(cfg.receive_mode, ReceiveMode::Async);
        assert!(cfg.address_family.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg = ChannelConfig::from_json(
            r#"{"heartbeat_interval": 0, "receive_mode": "polled", "address_family": "ipv6"}"#,
        )
        .unwrap();
        assert_eq!(cfg.heartbeat_period(), None);
        assert_eq!(cfg.receive_mode, ReceiveMode::Polled);
        assert_eq!(cfg.address_family, Some(AddressFamily::Ipv6));
        assert!(cfg.nodelay);
    }

    #[test]
    fn unknown_fields_rejected() {
        assert!(ChannelConfig::from_json(r#"{"heartbeat": 5}"#).is_err());
    }

    #[test]
    fn negative_interval_invalid() {
        let cfg = ChannelConfig {
            heartbeat_interval: -1.0,
            ..ChannelConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn socket_options_follow_config() {
        let cfg = ChannelConfig {
            receive_buffer_size: 0,
            nodelay: false,
            ..ChannelConfig::default()
        };
        let opts = cfg.socket_options();
        assert!(!opts.nodelay);
        assert_eq!(opts.receive_buffer_size, 0);
        assert_eq!(opts.send_buffer_size, DEFAULT_SOCKET_BUFFER_SIZE);
    }
}
