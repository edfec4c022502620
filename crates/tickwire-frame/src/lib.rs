//! Header-then-body packet framing for tickwire channels.
//!
//! Every packet travels as a fixed-length header declaring the body length,
//! followed by exactly that many body bytes. The byte layout of both parts
//! belongs to a pluggable [`PacketCodec`]; this crate owns the state that
//! drives the two phases:
//! - [`ReceiveState`] alternates header → body → header, sized to the bytes
//!   still required for the current phase
//! - [`SendState`] batches serialized packets into one buffer and tracks the
//!   write cursor of the flush in flight
//!
//! [`LengthPrefixedCodec`] is a ready-made codec for raw payloads.

pub mod codec;
pub mod error;
pub mod ids;
pub mod length_prefixed;
pub mod reader;
pub mod receive_state;
pub mod send_state;
pub mod writer;

#[cfg(feature = "async")]
pub mod framed;

pub use codec::{
    CustomErrorData, Decoded, FrameConfig, Packet, PacketCodec, PacketHeader, PacketId, PacketSink,
    DEFAULT_MAX_PACKET_LENGTH,
};
pub use error::{CodecError, FrameError, Result};
pub use ids::{HEARTBEAT, USER_PACKET_START};
pub use length_prefixed::{
    decode_header, encode_packet, LengthPrefixedCodec, RawHeader, RawPacket, HEADER_SIZE, MAGIC,
};
pub use reader::{PacketReader, ReadPhase};
pub use receive_state::ReceiveState;
pub use send_state::{FlushProgress, SendState};
pub use writer::PacketWriter;

#[cfg(feature = "async")]
pub use framed::PacketFramer;
