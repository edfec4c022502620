//! Tick-driven TCP channels with pluggable packet codecs.
//!
//! tickwire keeps long-lived named connections open, frames traffic as a
//! fixed-length header followed by a body, watches liveness with heartbeats,
//! and hands received packets to handlers on the caller's own tick.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP sockets, listeners, address families
//! - [`frame`]: header-then-body framing and the codec contract
//! - [`channel`]: named channels, dispatch pool, heartbeats, and the manager
//!   (behind the `channel` feature)

/// Re-export transport types.
pub mod transport {
    pub use tickwire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use tickwire_frame::*;
}

/// Re-export channel types (requires `channel` feature).
#[cfg(feature = "channel")]
pub mod channel {
    pub use tickwire_channel::*;
}
