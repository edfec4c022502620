use std::fmt;
use std::io;

use tickwire_channel::{ChannelError, ManagerError, NetworkError, NetworkErrorCode};
use tickwire_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused => FAILURE,
        io::ErrorKind::AddrInUse | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        io::ErrorKind::InvalidData => DATA_INVALID,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::AddressFamily { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

/// Exit code for an error notification.
pub fn code_for(err: &NetworkError) -> i32 {
    if matches!(
        err.socket_error,
        Some(io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
    ) {
        return TIMEOUT;
    }
    match err.code {
        NetworkErrorCode::AddressFamilyError => USAGE,
        NetworkErrorCode::ConnectError | NetworkErrorCode::SocketError => TRANSPORT_ERROR,
        NetworkErrorCode::SerializeError
        | NetworkErrorCode::DeserializePacketHeaderError
        | NetworkErrorCode::DeserializePacketError => DATA_INVALID,
        NetworkErrorCode::SendError | NetworkErrorCode::ReceiveError => FAILURE,
    }
}

pub fn network_error(context: &str, err: &NetworkError) -> CliError {
    CliError::new(
        code_for(err),
        format!("{context}: {} ({})", err.message, err.code),
    )
}

pub fn channel_error(context: &str, err: ChannelError) -> CliError {
    network_error(context, &NetworkError::from(&err))
}

pub fn manager_error(context: &str, err: ManagerError) -> CliError {
    match err {
        ManagerError::Channel { source, .. } => channel_error(context, source),
        ManagerError::InvalidConfig { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}
