//! Named duplex network channels driven by a caller-owned tick.
//!
//! A [`NetworkManager`] owns named [`NetworkChannel`]s. Each channel binds
//! one TCP socket to a [`PacketCodec`](tickwire_frame::PacketCodec):
//! background threads connect, read, and write, while handlers and most
//! notifications run inside [`NetworkManager::update`] on the caller's
//! thread.
//!
//! Received packets are routed by id through an [`EventPool`]. Liveness is
//! tracked with a per-channel [`HeartbeatState`].

pub mod channel;
pub mod config;
pub mod error;
pub mod event_pool;
pub mod events;
pub mod heartbeat;
pub mod manager;
mod pipeline;
pub mod sender;
pub mod status;

pub use channel::NetworkChannel;
pub use config::{ChannelConfig, ReceiveMode};
pub use error::{ChannelError, ManagerError, NetworkErrorCode, Result};
pub use event_pool::{EventPool, PacketHandler};
pub use events::{ChannelEvent, EventKind, NetworkError, Notifier, ObserverId, UserData};
pub use heartbeat::HeartbeatState;
pub use manager::NetworkManager;
pub use sender::PacketSender;
pub use status::{ChannelState, ChannelStatus};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
