use std::net::SocketAddr;

use crate::family::AddressFamily;

/// Errors that can occur in socket transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The address belongs to a family the caller does not accept.
    #[error("address {addr} is {actual}, expected {expected}")]
    AddressFamily {
        addr: SocketAddr,
        actual: AddressFamily,
        expected: AddressFamily,
    },

    /// Setting or reading a socket option failed.
    #[error("socket option {option} failed: {source}")]
    SocketOption {
        option: &'static str,
        source: std::io::Error,
    },
}

impl TransportError {
    /// The underlying I/O error kind, when there is one.
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            TransportError::Bind { source, .. }
            | TransportError::Connect { source, .. }
            | TransportError::SocketOption { source, .. }
            | TransportError::Accept(source)
            | TransportError::Io(source) => Some(source.kind()),
            TransportError::AddressFamily { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
