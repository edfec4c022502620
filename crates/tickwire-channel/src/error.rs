use std::io::ErrorKind;
use std::net::SocketAddr;

use serde::Serialize;
use tickwire_frame::FrameError;
use tickwire_transport::TransportError;

/// Category reported alongside every channel error notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum NetworkErrorCode {
    AddressFamilyError,
    SocketError,
    ConnectError,
    SendError,
    ReceiveError,
    SerializeError,
    DeserializePacketHeaderError,
    DeserializePacketError,
}

impl NetworkErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AddressFamilyError => "AddressFamilyError",
            Self::SocketError => "SocketError",
            Self::ConnectError => "ConnectError",
            Self::SendError => "SendError",
            Self::ReceiveError => "ReceiveError",
            Self::SerializeError => "SerializeError",
            Self::DeserializePacketHeaderError => "DeserializePacketHeaderError",
            Self::DeserializePacketError => "DeserializePacketError",
        }
    }
}

impl std::fmt::Display for NetworkErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur in channel operations.
///
/// Every variant maps onto exactly one [`NetworkErrorCode`].
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The asynchronous connect attempt failed.
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: TransportError,
    },

    /// Socket setup failed, or the address family was rejected.
    #[error("socket error: {0}")]
    Socket(#[from] TransportError),

    /// An endpoint was queried before a connect succeeded.
    #[error("channel '{0}' is not connected")]
    NotConnected(String),

    /// A packet was sent on a channel without an active connection.
    #[error("cannot send on channel '{0}': not connected")]
    SendOnInactive(String),

    /// The send pipeline failed.
    #[error("send failed: {0}")]
    Send(#[source] FrameError),

    /// The receive pipeline failed.
    #[error("receive failed: {0}")]
    Receive(#[source] FrameError),
}

impl ChannelError {
    /// Error category reported to observers.
    pub fn code(&self) -> NetworkErrorCode {
        match self {
            Self::Socket(TransportError::AddressFamily { .. }) => {
                NetworkErrorCode::AddressFamilyError
            }
            Self::Connect { .. } => NetworkErrorCode::ConnectError,
            Self::Socket(_) | Self::NotConnected(_) => NetworkErrorCode::SocketError,
            Self::SendOnInactive(_) => NetworkErrorCode::SendError,
            Self::Send(err) => match err {
                FrameError::Serialize(_) => NetworkErrorCode::SerializeError,
                FrameError::Io(_) => NetworkErrorCode::SocketError,
                _ => NetworkErrorCode::SendError,
            },
            Self::Receive(err) => match err {
                FrameError::DeserializeHeader(_)
                | FrameError::MissingHeader
                | FrameError::PacketTooLarge { .. } => {
                    NetworkErrorCode::DeserializePacketHeaderError
                }
                FrameError::DeserializePacket(_) => NetworkErrorCode::DeserializePacketError,
                FrameError::Io(_) => NetworkErrorCode::SocketError,
                _ => NetworkErrorCode::ReceiveError,
            },
        }
    }

    /// Underlying socket error kind, when the failure came from the OS.
    pub fn socket_error(&self) -> Option<ErrorKind> {
        match self {
            Self::Connect { source, .. } | Self::Socket(source) => source.io_kind(),
            Self::Send(FrameError::Io(err)) | Self::Receive(FrameError::Io(err)) => {
                Some(err.kind())
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;

/// Errors raised by [`NetworkManager`](crate::NetworkManager) registry
/// operations.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    /// A channel with this name is already registered.
    #[error("network channel '{0}' already exists")]
    DuplicateChannel(String),

    /// The codec declared a header length of zero.
    #[error("codec for channel '{name}' declares invalid header length {length}")]
    InvalidHeaderLength { name: String, length: usize },

    /// The channel configuration is unusable.
    #[error("invalid configuration for channel '{name}': {reason}")]
    InvalidConfig { name: String, reason: String },

    /// A channel tick surfaced an error with no observer registered.
    #[error("network channel '{name}': {source}")]
    Channel {
        name: String,
        #[source]
        source: ChannelError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickwire_frame::CodecError;

    #[test]
    fn frame_errors_map_to_codes_by_direction() {
        let serialize = ChannelError::Send(FrameError::Serialize(CodecError::InvalidMagic));
        assert_eq!(serialize.code(), NetworkErrorCode::SerializeError);

        let header = ChannelError::Receive(FrameError::MissingHeader);
        assert_eq!(header.code(), NetworkErrorCode::DeserializePacketHeaderError);

        let body = ChannelError::Receive(FrameError::DeserializePacket(CodecError::Malformed(
            "bad".into(),
        )));
        assert_eq!(body.code(), NetworkErrorCode::DeserializePacketError);

        let closed = ChannelError::Send(FrameError::ConnectionClosed);
        assert_eq!(closed.code(), NetworkErrorCode::SendError);
    }

    #[test]
    fn io_failures_are_socket_errors_with_kind() {
        let err = ChannelError::Receive(FrameError::Io(std::io::Error::from(
            ErrorKind::ConnectionReset,
        )));
        assert_eq!(err.code(), NetworkErrorCode::SocketError);
        assert_eq!(err.socket_error(), Some(ErrorKind::ConnectionReset));

        let inactive = ChannelError::SendOnInactive("x".into());
        assert_eq!(inactive.code(), NetworkErrorCode::SendError);
        assert_eq!(inactive.socket_error(), None);
    }

    #[test]
    fn family_mismatch_is_address_family_error() {
        let addr: SocketAddr = "[::1]:80".parse().unwrap();
        let err = ChannelError::from(
            tickwire_transport::AddressFamily::Ipv4
                .check(&addr)
                .unwrap_err(),
        );
        assert_eq!(err.code(), NetworkErrorCode::AddressFamilyError);
    }

    #[test]
    fn code_names_match_display() {
        assert_eq!(
            NetworkErrorCode::AddressFamilyError.to_string(),
            "AddressFamilyError"
        );
        assert_eq!(
            serde_json::to_string(&NetworkErrorCode::ConnectError).unwrap(),
            "\"ConnectError\""
        );
    }
}
