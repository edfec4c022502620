use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{
    Decoded, Packet, PacketCodec, PacketHeader, PacketId, PacketSink, DEFAULT_MAX_PACKET_LENGTH,
};
use crate::error::CodecError;
use crate::ids::HEARTBEAT;

/// Header: magic (2) + length (4) + packet id (4) = 10 bytes.
pub const HEADER_SIZE: usize = 10;

/// Magic bytes: "TW" (0x54 0x57).
pub const MAGIC: [u8; 2] = [0x54, 0x57];

/// An opaque payload tagged with a packet id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    /// Identifier used for dispatch.
    pub id: PacketId,
    /// The packet body.
    pub payload: Bytes,
}

impl RawPacket {
    pub fn new(id: PacketId, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }

    /// An empty packet with the reserved heartbeat id.
    pub fn heartbeat() -> Self {
        Self::new(HEARTBEAT, Bytes::new())
    }

    pub fn is_heartbeat(&self) -> bool {
        self.id == HEARTBEAT
    }

    /// Total wire size (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

impl Packet for RawPacket {
    fn id(&self) -> PacketId {
        self.id
    }
}

/// Decoded [`LengthPrefixedCodec`] header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawHeader {
    pub id: PacketId,
    pub length: u32,
}

impl PacketHeader for RawHeader {
    fn packet_length(&self) -> usize {
        self.length as usize
    }
}

/// Encode one packet into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬───────────┬─────────────────┐
/// │ Magic (2B)   │ Length    │ Packet id │ Payload         │
/// │ 0x54 0x57    │ (4B LE)   │ (4B LE)   │ (Length bytes)  │
/// │ "TW"         │           │           │                 │
/// └──────────────┴───────────┴───────────┴─────────────────┘
/// ```
pub fn encode_packet(id: PacketId, payload: &[u8], dst: &mut BytesMut) -> Result<(), CodecError> {
    let length = u32::try_from(payload.len()).map_err(|_| CodecError::PacketTooLarge {
        size: payload.len(),
        max: u32::MAX as usize,
    })?;
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(length);
    dst.put_u32_le(id);
    dst.put_slice(payload);
    Ok(())
}

/// Parse a header from exactly [`HEADER_SIZE`] bytes.
pub fn decode_header(src: &[u8]) -> Result<RawHeader, CodecError> {
    if src.len() < HEADER_SIZE {
        return Err(CodecError::Truncated {
            expected: HEADER_SIZE,
            actual: src.len(),
        });
    }
    if src[0..2] != MAGIC {
        return Err(CodecError::InvalidMagic);
    }
    let length = u32::from_le_bytes([src[2], src[3], src[4], src[5]]);
    let id = u32::from_le_bytes([src[6], src[7], src[8], src[9]]);
    Ok(RawHeader { id, length })
}

/// Codec for [`RawPacket`]s using the "TW" length-prefixed layout.
#[derive(Debug, Clone)]
pub struct LengthPrefixedCodec {
    max_payload: usize,
    heartbeat: bool,
}

impl Default for LengthPrefixedCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl LengthPrefixedCodec {
    pub fn new() -> Self {
        Self {
            max_payload: DEFAULT_MAX_PACKET_LENGTH,
            heartbeat: true,
        }
    }

    /// Reject payloads above `max_payload` on both encode and decode.
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    /// Never emit heartbeat packets.
    pub fn without_heartbeat(mut self) -> Self {
        self.heartbeat = false;
        self
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }
}

impl PacketCodec for LengthPrefixedCodec {
    type Header = RawHeader;
    type Packet = RawPacket;

    fn header_length(&self) -> usize {
        HEADER_SIZE
    }

    fn send_heartbeat(&mut self, sink: &dyn PacketSink<RawPacket>) -> bool {
        self.heartbeat && sink.enqueue(RawPacket::heartbeat())
    }

    fn serialize(&mut self, packet: &RawPacket, dst: &mut BytesMut) -> Result<(), CodecError> {
        if packet.payload.len() > self.max_payload {
            return Err(CodecError::PacketTooLarge {
                size: packet.payload.len(),
                max: self.max_payload,
            });
        }
        encode_packet(packet.id, &packet.payload, dst)
    }

    fn deserialize_header(&mut self, src: &[u8]) -> Result<Decoded<RawHeader>, CodecError> {
        let header = decode_header(src)?;
        if header.packet_length() > self.max_payload {
            return Err(CodecError::PacketTooLarge {
                size: header.packet_length(),
                max: self.max_payload,
            });
        }
        Ok(Decoded::ok(header))
    }

    fn deserialize_packet(
        &mut self,
        header: &RawHeader,
        src: &[u8],
    ) -> Result<Decoded<RawPacket>, CodecError> {
        if src.len() != header.packet_length() {
            return Err(CodecError::Truncated {
                expected: header.packet_length(),
                actual: src.len(),
            });
        }
        Ok(Decoded::ok(RawPacket::new(
            header.id,
            Bytes::copy_from_slice(src),
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    struct VecSink(RefCell<Vec<RawPacket>>);

    impl PacketSink<RawPacket> for VecSink {
        fn enqueue(&self, packet: RawPacket) -> bool {
            self.0.borrow_mut().push(packet);
            true
        }
    }

    #[test]
    fn header_layout_is_magic_length_id() {
        let mut buf = BytesMut::new();
        encode_packet(0x0102_0304, b"abc", &mut buf).unwrap();

        assert_eq!(buf.len(), HEADER_SIZE + 3);
        assert_eq!(&buf[0..2], b"TW");
        assert_eq!(&buf[2..6], &3u32.to_le_bytes());
        assert_eq!(&buf[6..10], &0x0102_0304u32.to_le_bytes());
        assert_eq!(&buf[10..], b"abc");
    }

    #[test]
    fn codec_decodes_what_it_encodes() {
        let mut codec = LengthPrefixedCodec::new();
        let mut buf = BytesMut::new();
        codec
            .serialize(&RawPacket::new(7, &b"0123456789"[..]), &mut buf)
            .unwrap();

        let header = codec.deserialize_header(&buf[..HEADER_SIZE]).unwrap();
        let header = header.value.unwrap();
        assert_eq!(header, RawHeader { id: 7, length: 10 });

        let packet = codec
            .deserialize_packet(&header, &buf[HEADER_SIZE..])
            .unwrap()
            .value
            .unwrap();
        assert_eq!(packet.id(), 7);
        assert_eq!(packet.payload.as_ref(), b"0123456789");
    }

    #[test]
    fn invalid_magic_rejected() {
        let err = decode_header(&[0xFF, 0xFF, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, CodecError::InvalidMagic));
    }

    #[test]
    fn short_header_is_truncated() {
        let err = decode_header(b"TW\0").unwrap_err();
        assert!(matches!(
            err,
            CodecError::Truncated {
                expected: HEADER_SIZE,
                actual: 3
            }
        ));
    }

    #[test]
    fn serialize_enforces_max_payload() {
        let mut codec = LengthPrefixedCodec::new().with_max_payload(4);
        let mut buf = BytesMut::new();
        let err = codec
            .serialize(&RawPacket::new(300, &b"too long"[..]), &mut buf)
            .unwrap_err();
        assert!(matches!(err, CodecError::PacketTooLarge { size: 8, max: 4 }));
        assert!(buf.is_empty());
    }

    #[test]
    fn declared_length_over_max_rejected() {
        let mut codec = LengthPrefixedCodec::new().with_max_payload(4);
        let mut buf = BytesMut::new();
        encode_packet(1, b"12345", &mut buf).unwrap();
        let err = codec.deserialize_header(&buf[..HEADER_SIZE]).unwrap_err();
        assert!(matches!(err, CodecError::PacketTooLarge { size: 5, max: 4 }));
    }

    #[test]
    fn heartbeat_goes_through_sink() {
        let sink = VecSink(RefCell::new(Vec::new()));
        let mut codec = LengthPrefixedCodec::new();
        assert!(codec.send_heartbeat(&sink));

        let sent = sink.0.into_inner();
        assert_eq!(sent, vec![RawPacket::heartbeat()]);
        assert!(sent[0].is_heartbeat());
        assert_eq!(sent[0].wire_size(), HEADER_SIZE);
    }

    #[test]
    fn heartbeat_can_be_disabled() {
        let sink = VecSink(RefCell::new(Vec::new()));
        let mut codec = LengthPrefixedCodec::new().without_heartbeat();
        assert!(!codec.send_heartbeat(&sink));
        assert!(sink.0.into_inner().is_empty());
    }
}
