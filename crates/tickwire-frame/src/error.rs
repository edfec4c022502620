/// Errors raised by a [`PacketCodec`](crate::PacketCodec) implementation.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The header does not start with the expected magic bytes.
    #[error("invalid packet magic")]
    InvalidMagic,

    /// The declared or supplied packet is larger than allowed.
    #[error("packet too large ({size} bytes, max {max})")]
    PacketTooLarge { size: usize, max: usize },

    /// Fewer bytes than the layout requires.
    #[error("truncated input ({actual} bytes, expected {expected})")]
    Truncated { expected: usize, actual: usize },

    /// The bytes do not form a valid value.
    #[error("malformed packet: {0}")]
    Malformed(String),

    /// Any other codec-specific failure.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors that can occur while framing packets.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The codec failed to serialize an outbound packet.
    #[error("serialize failed: {0}")]
    Serialize(#[source] CodecError),

    /// The codec failed to parse a packet header.
    #[error("deserialize packet header failed: {0}")]
    DeserializeHeader(#[source] CodecError),

    /// The codec accepted the header bytes but produced no header.
    #[error("deserialize packet header failed: codec returned no header")]
    MissingHeader,

    /// The codec failed to parse a packet body.
    #[error("deserialize packet failed: {0}")]
    DeserializePacket(#[source] CodecError),

    /// A header declared a body larger than the configured maximum.
    #[error("packet too large ({size} bytes, max {max})")]
    PacketTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing packets.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete packet was received.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
