//! TCP transport for tickwire channels.
//!
//! This is the lowest layer of tickwire. It owns the operating-system socket:
//! - outbound connect and inbound accept over IPv4/IPv6
//! - address-family classification
//! - graceful two-way shutdown
//! - socket buffer sizing and `TCP_NODELAY`
//!
//! Everything else builds on top of the [`NetSocket`] type provided here.

pub mod error;
pub mod family;
pub mod socket;
pub mod tcp;

pub use error::{Result, TransportError};
pub use family::AddressFamily;
pub use socket::{NetSocket, SocketOptions};
pub use tcp::NetListener;
