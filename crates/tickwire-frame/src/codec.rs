use std::any::Any;
use std::sync::Arc;

use bytes::BytesMut;

use crate::error::CodecError;

/// Default maximum body length a header may declare: 16 MiB.
pub const DEFAULT_MAX_PACKET_LENGTH: usize = 16 * 1024 * 1024;

/// Numeric identifier used to route a packet to its handler.
pub type PacketId = u32;

/// Opaque out-of-band diagnostic attached to a decode by the codec.
pub type CustomErrorData = Arc<dyn Any + Send + Sync>;

/// A decoded application packet.
pub trait Packet: Send + 'static {
    /// Identifier the dispatch pool routes on.
    fn id(&self) -> PacketId;
}

/// A decoded fixed-length packet header.
pub trait PacketHeader: Send + 'static {
    /// Length in bytes of the body that follows. May be zero.
    fn packet_length(&self) -> usize;
}

/// Destination for packets a codec wants to send on its own, such as
/// heartbeats.
pub trait PacketSink<P> {
    /// Queue `packet` for the next send batch. Returns false when the
    /// channel refused it.
    fn enqueue(&self, packet: P) -> bool;
}

/// Result of a decode: the value, if any, plus optional diagnostic data.
///
/// `custom_error` is reported to observers even when `value` is present.
#[derive(Clone)]
pub struct Decoded<T> {
    pub value: Option<T>,
    pub custom_error: Option<CustomErrorData>,
}

impl<T> Decoded<T> {
    /// A successfully decoded value.
    pub fn ok(value: T) -> Self {
        Self {
            value: Some(value),
            custom_error: None,
        }
    }

    /// Nothing decoded, no diagnostic.
    pub fn none() -> Self {
        Self {
            value: None,
            custom_error: None,
        }
    }

    /// Attach a diagnostic.
    pub fn with_custom_error(mut self, data: impl Any + Send + Sync) -> Self {
        self.custom_error = Some(Arc::new(data));
        self
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Decoded<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoded")
            .field("value", &self.value)
            .field("custom_error", &self.custom_error.is_some())
            .finish()
    }
}

/// Pluggable strategy translating between typed packets and wire bytes.
///
/// A channel queries [`header_length`](Self::header_length) once when it is
/// created; every header on the wire must be exactly that long.
pub trait PacketCodec: Send + 'static {
    type Header: PacketHeader;
    type Packet: Packet;

    /// Fixed length of every packet header in bytes. Must be positive.
    fn header_length(&self) -> usize;

    /// Called before each connect attempt to clear per-connection state.
    fn prepare_for_connecting(&mut self) {}

    /// Queue a heartbeat through `sink`. Returns true if one was sent.
    fn send_heartbeat(&mut self, sink: &dyn PacketSink<Self::Packet>) -> bool;

    /// Append the wire form of `packet` (header and body) to `dst`.
    fn serialize(&mut self, packet: &Self::Packet, dst: &mut BytesMut) -> Result<(), CodecError>;

    /// Parse a header from exactly `header_length()` bytes.
    fn deserialize_header(&mut self, src: &[u8]) -> Result<Decoded<Self::Header>, CodecError>;

    /// Parse a packet from its header and exactly `packet_length()` body bytes.
    fn deserialize_packet(
        &mut self,
        header: &Self::Header,
        src: &[u8],
    ) -> Result<Decoded<Self::Packet>, CodecError>;
}

/// Configuration for the blocking packet reader and writer.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest body a header may declare. Default: 16 MiB.
    pub max_packet_length: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_packet_length: DEFAULT_MAX_PACKET_LENGTH,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoded_carries_custom_error() {
        let decoded = Decoded::ok(5u32).with_custom_error("checksum mismatch");
        assert_eq!(decoded.value, Some(5));
        let data = decoded.custom_error.expect("custom error should be set");
        assert_eq!(data.downcast_ref::<&str>(), Some(&"checksum mismatch"));
    }

    #[test]
    fn decoded_none_is_empty() {
        let decoded = Decoded::<u32>::none();
        assert!(decoded.value.is_none());
        assert!(decoded.custom_error.is_none());
    }
}
