use crate::codec::{CustomErrorData, Decoded, PacketCodec, PacketHeader};
use crate::error::{FrameError, Result};

/// Inbound framing state for one connection.
///
/// The buffer is always exactly as long as the current phase requires: the
/// codec's header length while expecting a header, the declared body length
/// while expecting a body. Reads land in [`remaining_mut`](Self::remaining_mut)
/// and are committed with [`advance`](Self::advance); once
/// [`is_complete`](Self::is_complete) the phase is decoded.
pub struct ReceiveState<H> {
    buffer: Vec<u8>,
    cursor: usize,
    header: Option<H>,
    header_length: usize,
    max_packet_length: usize,
}

impl<H: PacketHeader> ReceiveState<H> {
    /// New state primed to expect a header.
    pub fn new(header_length: usize, max_packet_length: usize) -> Self {
        let mut state = Self {
            buffer: Vec::with_capacity(header_length),
            cursor: 0,
            header: None,
            header_length,
            max_packet_length,
        };
        state.prepare_for_header();
        state
    }

    /// Re-arm for the next header, reusing the allocation.
    pub fn prepare_for_header(&mut self) {
        self.buffer.clear();
        self.buffer.resize(self.header_length, 0);
        self.cursor = 0;
        self.header = None;
    }

    /// Switch to the body phase for `header`.
    pub fn prepare_for_packet(&mut self, header: H) -> Result<()> {
        let length = header.packet_length();
        if length > self.max_packet_length {
            return Err(FrameError::PacketTooLarge {
                size: length,
                max: self.max_packet_length,
            });
        }
        self.buffer.clear();
        self.buffer.resize(length, 0);
        self.cursor = 0;
        self.header = Some(header);
        Ok(())
    }

    /// True while a header has been decoded and its body is pending.
    pub fn expects_body(&self) -> bool {
        self.header.is_some()
    }

    /// True once every byte of the current phase has arrived.
    pub fn is_complete(&self) -> bool {
        self.cursor == self.buffer.len()
    }

    /// Unfilled tail of the buffer.
    pub fn remaining_mut(&mut self) -> &mut [u8] {
        &mut self.buffer[self.cursor..]
    }

    /// Commit `n` bytes read into [`remaining_mut`](Self::remaining_mut).
    pub fn advance(&mut self, n: usize) {
        debug_assert!(self.cursor + n <= self.buffer.len());
        self.cursor = (self.cursor + n).min(self.buffer.len());
    }

    /// Bytes still required to finish the current phase.
    pub fn remaining_len(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    /// Total bytes of the current phase.
    pub fn expected_len(&self) -> usize {
        self.buffer.len()
    }

    /// Header awaiting its body, if any.
    pub fn header(&self) -> Option<&H> {
        self.header.as_ref()
    }

    pub fn header_length(&self) -> usize {
        self.header_length
    }

    /// Decode a completed header and move to the body phase.
    ///
    /// Returns the codec's diagnostic, if it attached one.
    pub fn decode_header<C>(&mut self, codec: &mut C) -> Result<Option<CustomErrorData>>
    where
        C: PacketCodec<Header = H>,
    {
        debug_assert!(!self.expects_body() && self.is_complete());
        self.cursor = 0;
        let decoded = codec
            .deserialize_header(&self.buffer)
            .map_err(FrameError::DeserializeHeader)?;
        let header = decoded.value.ok_or(FrameError::MissingHeader)?;
        self.prepare_for_packet(header)?;
        Ok(decoded.custom_error)
    }

    /// Decode a completed body and re-arm for the next header.
    pub fn decode_packet<C>(&mut self, codec: &mut C) -> Result<Decoded<C::Packet>>
    where
        C: PacketCodec<Header = H>,
    {
        debug_assert!(self.expects_body() && self.is_complete());
        let header = self.header.take().ok_or(FrameError::MissingHeader)?;
        let decoded = codec
            .deserialize_packet(&header, &self.buffer)
            .map_err(FrameError::DeserializePacket)?;
        self.prepare_for_header();
        Ok(decoded)
    }
}

impl<H> std::fmt::Debug for ReceiveState<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiveState")
            .field("phase", &if self.header.is_some() { "body" } else { "header" })
            .field("cursor", &self.cursor)
            .field("expected", &self.buffer.len())
            .finish()
    }
}
