use std::io::{ErrorKind, Read};

use tracing::trace;

use crate::codec::{CustomErrorData, Decoded, FrameConfig, PacketCodec};
use crate::error::{FrameError, Result};
use crate::receive_state::ReceiveState;

/// Which phase of a packet just finished arriving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPhase {
    /// Header bytes are complete; call [`PacketReader::decode_header`].
    Header,
    /// Body bytes are complete; call [`PacketReader::decode_packet`].
    Body,
}

/// Reads header-then-body packets from any `Read` stream.
///
/// Byte collection and decoding are separate steps so the codec is only
/// borrowed while a completed phase is decoded, never across a blocking
/// read. [`read_packet`](Self::read_packet) combines both for callers that
/// own the codec outright.
pub struct PacketReader<R, C: PacketCodec> {
    inner: R,
    state: ReceiveState<C::Header>,
    config: FrameConfig,
}

impl<R: Read, C: PacketCodec> PacketReader<R, C> {
    /// Create a reader sized for `codec`'s headers with default configuration.
    pub fn new(inner: R, codec: &C) -> Self {
        Self::with_config(inner, codec, FrameConfig::default())
    }

    /// Create a reader with explicit configuration.
    pub fn with_config(inner: R, codec: &C, config: FrameConfig) -> Self {
        Self {
            inner,
            state: ReceiveState::new(codec.header_length(), config.max_packet_length),
            config,
        }
    }

    /// Block until the current phase is complete.
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached,
    /// including in the middle of a packet. A zero-length body is complete
    /// without reading.
    pub fn read_phase(&mut self) -> Result<ReadPhase> {
        while !self.state.is_complete() {
            let read = match self.inner.read(self.state.remaining_mut()) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };
            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }
            self.state.advance(read);
        }
        let phase = self.phase();
        trace!(?phase, bytes = self.state.expected_len(), "read phase complete");
        Ok(phase)
    }

    /// Like [`read_phase`](Self::read_phase) for non-blocking streams.
    ///
    /// Returns `Ok(None)` when the stream would block; partial progress is
    /// kept for the next call.
    pub fn try_read_phase(&mut self) -> Result<Option<ReadPhase>> {
        match self.read_phase() {
            Ok(phase) => Ok(Some(phase)),
            Err(FrameError::Io(err)) if err.kind() == ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Decode the completed header and arm the body phase.
    pub fn decode_header(&mut self, codec: &mut C) -> Result<Option<CustomErrorData>> {
        self.state.decode_header(codec)
    }

    /// Decode the completed body and arm the next header phase.
    pub fn decode_packet(&mut self, codec: &mut C) -> Result<Decoded<C::Packet>> {
        self.state.decode_packet(codec)
    }

    /// Read and decode the next complete packet (blocking).
    ///
    /// A diagnostic attached to the header is carried over to the result
    /// unless the body decode attached its own.
    pub fn read_packet(&mut self, codec: &mut C) -> Result<Decoded<C::Packet>> {
        let mut header_error = None;
        loop {
            match self.read_phase()? {
                ReadPhase::Header => header_error = self.decode_header(codec)?,
                ReadPhase::Body => {
                    let mut decoded = self.decode_packet(codec)?;
                    if decoded.custom_error.is_none() {
                        decoded.custom_error = header_error;
                    }
                    return Ok(decoded);
                }
            }
        }
    }

    /// Discard any partially received packet.
    pub fn reset(&mut self) {
        self.state.prepare_for_header();
    }

    fn phase(&self) -> ReadPhase {
        if self.state.expects_body() {
            ReadPhase::Body
        } else {
            ReadPhase::Header
        }
    }

    /// Inbound framing state.
    pub fn state(&self) -> &ReceiveState<C::Header> {
        &self.state
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Current reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl<C: PacketCodec> PacketReader<tickwire_transport::NetSocket, C> {
    /// Create a reader for a socket and apply the read timeout from config.
    pub fn with_config_socket(
        inner: tickwire_transport::NetSocket,
        codec: &C,
        config: FrameConfig,
    ) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, codec, config))
    }
}

pub(crate) fn transport_to_frame_error(err: tickwire_transport::TransportError) -> FrameError {
    match err {
        tickwire_transport::TransportError::Io(io)
        | tickwire_transport::TransportError::Accept(io) => FrameError::Io(io),
        tickwire_transport::TransportError::Bind { source, .. }
        | tickwire_transport::TransportError::Connect { source, .. }
        | tickwire_transport::TransportError::SocketOption { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::codec::Packet;
    use crate::length_prefixed::{encode_packet, LengthPrefixedCodec, MAGIC};

    fn reader_over(bytes: Vec<u8>) -> PacketReader<Cursor<Vec<u8>>, LengthPrefixedCodec> {
        PacketReader::new(Cursor::new(bytes), &LengthPrefixedCodec::new())
    }

    #[test]
    fn read_single_packet() {
        let mut wire = BytesMut::new();
        encode_packet(300, b"hello", &mut wire).unwrap();

        let mut codec = LengthPrefixedCodec::new();
        let mut reader = reader_over(wire.to_vec());
        let packet = reader.read_packet(&mut codec).unwrap().value.unwrap();

        assert_eq!(packet.id(), 300);
        assert_eq!(packet.payload.as_ref(), b"hello");
    }

    #[test]
    fn read_multiple_packets_in_order() {
        let mut wire = BytesMut::new();
        encode_packet(1, b"one", &mut wire).unwrap();
        encode_packet(2, b"", &mut wire).unwrap();
        encode_packet(3, b"three", &mut wire).unwrap();

        let mut codec = LengthPrefixedCodec::new();
        let mut reader = reader_over(wire.to_vec());
        let ids: Vec<_> = (0..3)
            .map(|_| reader.read_packet(&mut codec).unwrap().value.unwrap().id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn phases_are_reported_separately() {
        let mut wire = BytesMut::new();
        encode_packet(9, b"body", &mut wire).unwrap();

        let mut codec = LengthPrefixedCodec::new();
        let mut reader = reader_over(wire.to_vec());
        assert_eq!(reader.read_phase().unwrap(), ReadPhase::Header);
        reader.decode_header(&mut codec).unwrap();
        assert_eq!(reader.read_phase().unwrap(), ReadPhase::Body);
        let packet = reader.decode_packet(&mut codec).unwrap().value.unwrap();
        assert_eq!(packet.payload.as_ref(), b"body");
    }

    #[test]
    fn zero_length_body_needs_no_read() {
        let mut wire = BytesMut::new();
        encode_packet(0, b"", &mut wire).unwrap();

        let mut codec = LengthPrefixedCodec::new();
        let mut reader = reader_over(wire.to_vec());
        reader.read_phase().unwrap();
        reader.decode_header(&mut codec).unwrap();

        assert_eq!(reader.read_phase().unwrap(), ReadPhase::Body);
        let packet = reader.decode_packet(&mut codec).unwrap().value.unwrap();
        assert!(packet.is_heartbeat());
    }

    #[test]
    fn partial_read_handling() {
        let mut wire = BytesMut::new();
        encode_packet(4, b"slow", &mut wire).unwrap();

        let byte_reader = ByteByByteReader {
            bytes: wire.to_vec(),
            pos: 0,
        };
        let mut codec = LengthPrefixedCodec::new();
        let mut reader = PacketReader::new(byte_reader, &codec);

        let packet = reader.read_packet(&mut codec).unwrap().value.unwrap();
        assert_eq!(packet.id, 4);
        assert_eq!(packet.payload.as_ref(), b"slow");
    }

    #[test]
    fn connection_closed_cleanly() {
        let mut codec = LengthPrefixedCodec::new();
        let mut reader = reader_over(Vec::new());
        let err = reader.read_packet(&mut codec).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn connection_closed_mid_packet() {
        let mut partial = BytesMut::new();
        partial.put_slice(&MAGIC);
        partial.put_u32_le(16);
        partial.put_u32_le(2);
        partial.put_slice(b"only-part");

        let mut codec = LengthPrefixedCodec::new();
        let mut reader = reader_over(partial.to_vec());
        let err = reader.read_packet(&mut codec).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn oversized_packet_in_stream() {
        let mut wire = BytesMut::new();
        wire.put_slice(&MAGIC);
        wire.put_u32_le(1024);
        wire.put_u32_le(1);

        let cfg = FrameConfig {
            max_packet_length: 16,
            ..FrameConfig::default()
        };
        let mut codec = LengthPrefixedCodec::new();
        let mut reader = PacketReader::with_config(Cursor::new(wire.to_vec()), &codec, cfg);
        let err = reader.read_packet(&mut codec).unwrap_err();
        assert!(matches!(err, FrameError::PacketTooLarge { .. }));
    }

    #[test]
    fn invalid_magic_in_stream() {
        let mut codec = LengthPrefixedCodec::new();
        let mut reader = reader_over(vec![0u8; 10]);
        let err = reader.read_packet(&mut codec).unwrap_err();
        assert!(matches!(err, FrameError::DeserializeHeader(_)));
    }

    #[test]
    fn read_would_block_propagates_io_error() {
        let mut wire = BytesMut::new();
        encode_packet(7, b"ok", &mut wire).unwrap();

        let mut codec = LengthPrefixedCodec::new();
        let mut reader = PacketReader::new(ScriptedReader::new(ErrorKind::WouldBlock, wire.to_vec()), &codec);
        let err = reader.read_packet(&mut codec).unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WouldBlock));
    }

    #[test]
    fn try_read_phase_keeps_progress_across_would_block() {
        let mut wire = BytesMut::new();
        encode_packet(7, b"ok", &mut wire).unwrap();

        let mut codec = LengthPrefixedCodec::new();
        let mut reader = PacketReader::new(ScriptedReader::new(ErrorKind::WouldBlock, wire.to_vec()), &codec);
        assert_eq!(reader.try_read_phase().unwrap(), None);
        assert_eq!(reader.try_read_phase().unwrap(), Some(ReadPhase::Header));
        reader.decode_header(&mut codec).unwrap();
        assert_eq!(reader.try_read_phase().unwrap(), Some(ReadPhase::Body));
        let packet = reader.decode_packet(&mut codec).unwrap().value.unwrap();
        assert_eq!(packet.id, 7);
    }

    #[test]
    fn interrupted_read_retries() {
        let mut wire = BytesMut::new();
        encode_packet(8, b"ok", &mut wire).unwrap();

        let mut codec = LengthPrefixedCodec::new();
        let mut reader = PacketReader::new(ScriptedReader::new(ErrorKind::Interrupted, wire.to_vec()), &codec);
        let packet = reader.read_packet(&mut codec).unwrap().value.unwrap();

        assert_eq!(packet.id, 8);
        assert_eq!(packet.payload.as_ref(), b"ok");
    }

    #[test]
    fn reset_discards_partial_packet() {
        let mut wire = BytesMut::new();
        encode_packet(1, b"abc", &mut wire).unwrap();
        let mut codec = LengthPrefixedCodec::new();
        let mut reader = reader_over(wire.to_vec());
        reader.read_phase().unwrap();
        reader.decode_header(&mut codec).unwrap();
        assert!(reader.state().expects_body());

        reader.reset();
        assert!(!reader.state().expects_body());
    }

    #[test]
    fn roundtrip_over_socket_pair() {
        let listener = tickwire_transport::NetListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr();
        let connector = std::thread::spawn(move || tickwire_transport::NetSocket::connect(addr).unwrap());
        let server_side = listener.accept().unwrap();
        let client = connector.join().unwrap();

        let mut codec = LengthPrefixedCodec::new();
        let mut writer = crate::writer::PacketWriter::new(client);
        let cfg = FrameConfig {
            read_timeout: Some(std::time::Duration::from_secs(5)),
            ..FrameConfig::default()
        };
        let mut reader = PacketReader::with_config_socket(server_side, &codec, cfg).unwrap();

        writer
            .send(&mut codec, &crate::RawPacket::new(1, &b"ping"[..]))
            .unwrap();
        let packet = reader.read_packet(&mut codec).unwrap().value.unwrap();
        assert_eq!(packet.id, 1);
        assert_eq!(packet.payload.as_ref(), b"ping");
    }

    #[derive(Debug)]
    struct ByteByByteReader {
        bytes: Vec<u8>,
        pos: usize,
    }

    impl Read for ByteByByteReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    /// Fails once with `kind`, then serves `bytes`.
    struct ScriptedReader {
        first: Option<ErrorKind>,
        bytes: Vec<u8>,
        pos: usize,
    }

    impl ScriptedReader {
        fn new(kind: ErrorKind, bytes: Vec<u8>) -> Self {
            Self {
                first: Some(kind),
                bytes,
                pos: 0,
            }
        }
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if let Some(kind) = self.first.take() {
                return Err(std::io::Error::from(kind));
            }
            if self.pos >= self.bytes.len() {
                return Ok(0);
            }
            let n = (self.bytes.len() - self.pos).min(buf.len());
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }
}
