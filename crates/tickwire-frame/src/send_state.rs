use bytes::{Bytes, BytesMut};

use crate::codec::PacketCodec;
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Outcome of committing written bytes with [`SendState::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushProgress {
    /// Bytes of the in-flight batch still unwritten.
    Partial { remaining: usize },
    /// The whole batch has been written.
    Complete { packets: usize, bytes: usize },
}

/// Outbound batching state for one connection.
///
/// Packets are serialized into a staging buffer. A flush freezes the staged
/// bytes into one contiguous batch; writes then advance a cursor over that
/// batch until it is fully written. New packets may be staged while a batch
/// is in flight and go out with the next flush.
#[derive(Debug)]
pub struct SendState {
    staging: BytesMut,
    staged_packets: usize,
    in_flight: Option<Bytes>,
    in_flight_packets: usize,
    cursor: usize,
}

impl Default for SendState {
    fn default() -> Self {
        Self::new()
    }
}

impl SendState {
    pub fn new() -> Self {
        Self {
            staging: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            staged_packets: 0,
            in_flight: None,
            in_flight_packets: 0,
            cursor: 0,
        }
    }

    /// True when no batch is in flight.
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none()
    }

    /// True when packets are staged for the next flush.
    pub fn has_staged(&self) -> bool {
        !self.staging.is_empty()
    }

    pub fn staged_packets(&self) -> usize {
        self.staged_packets
    }

    /// Serialize `packet` onto the end of the staging buffer.
    ///
    /// On failure the staging buffer is left as it was before the call.
    pub fn stage<C: PacketCodec>(&mut self, codec: &mut C, packet: &C::Packet) -> Result<()> {
        let before = self.staging.len();
        if let Err(err) = codec.serialize(packet, &mut self.staging) {
            self.staging.truncate(before);
            return Err(FrameError::Serialize(err));
        }
        self.staged_packets += 1;
        Ok(())
    }

    /// Move staged bytes into flight.
    ///
    /// Returns `None` when a batch is already in flight or nothing is staged.
    pub fn begin_flush(&mut self) -> Option<Bytes> {
        if !self.is_idle() || self.staging.is_empty() {
            return None;
        }
        let batch = self.staging.split().freeze();
        self.in_flight = Some(batch.clone());
        self.in_flight_packets = std::mem::take(&mut self.staged_packets);
        self.cursor = 0;
        Some(batch)
    }

    /// Unwritten tail of the in-flight batch.
    pub fn pending(&self) -> Option<Bytes> {
        self.in_flight.as_ref().map(|batch| batch.slice(self.cursor..))
    }

    /// Commit `n` written bytes of the in-flight batch.
    pub fn advance(&mut self, n: usize) -> FlushProgress {
        let Some(batch) = self.in_flight.as_ref() else {
            return FlushProgress::Partial { remaining: 0 };
        };
        self.cursor = (self.cursor + n).min(batch.len());
        if self.cursor < batch.len() {
            return FlushProgress::Partial {
                remaining: batch.len() - self.cursor,
            };
        }

        let bytes = batch.len();
        let packets = std::mem::take(&mut self.in_flight_packets);
        self.in_flight = None;
        self.cursor = 0;
        FlushProgress::Complete { packets, bytes }
    }

    /// Drop staged and in-flight data.
    pub fn reset(&mut self) {
        self.staging.clear();
        self.staged_packets = 0;
        self.in_flight = None;
        self.in_flight_packets = 0;
        self.cursor = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;
    use crate::length_prefixed::{LengthPrefixedCodec, RawPacket, HEADER_SIZE};

    #[test]
    fn staged_packets_flush_as_one_batch_in_order() {
        let mut codec = LengthPrefixedCodec::new();
        let mut state = SendState::new();
        state.stage(&mut codec, &RawPacket::new(1, &b"a"[..])).unwrap();
        state.stage(&mut codec, &RawPacket::new(2, &b"bb"[..])).unwrap();
        assert_eq!(state.staged_packets(), 2);

        let batch = state.begin_flush().unwrap();
        assert_eq!(batch.len(), 2 * HEADER_SIZE + 3);
        assert_eq!(&batch[6..10], &1u32.to_le_bytes());
        assert_eq!(&batch[HEADER_SIZE + 1 + 6..HEADER_SIZE + 1 + 10], &2u32.to_le_bytes());
        assert!(!state.has_staged());
        assert!(!state.is_idle());
    }

    #[test]
    fn partial_writes_advance_cursor() {
        let mut codec = LengthPrefixedCodec::new();
        let mut state = SendState::new();
        state.stage(&mut codec, &RawPacket::new(5, &b"xyz"[..])).unwrap();
        let total = state.begin_flush().unwrap().len();

        assert_eq!(state.advance(4), FlushProgress::Partial { remaining: total - 4 });
        assert_eq!(state.pending().unwrap().len(), total - 4);
        assert_eq!(
            state.advance(total - 4),
            FlushProgress::Complete {
                packets: 1,
                bytes: total
            }
        );
        assert!(state.is_idle());
        assert!(state.pending().is_none());
    }

    #[test]
    fn no_second_flush_while_in_flight() {
        let mut codec = LengthPrefixedCodec::new();
        let mut state = SendState::new();
        state.stage(&mut codec, &RawPacket::new(1, &b"a"[..])).unwrap();
        let first = state.begin_flush().unwrap();

        state.stage(&mut codec, &RawPacket::new(2, &b"b"[..])).unwrap();
        assert!(state.begin_flush().is_none());

        state.advance(first.len());
        let second = state.begin_flush().unwrap();
        assert_eq!(&second[6..10], &2u32.to_le_bytes());
    }

    #[test]
    fn empty_staging_has_nothing_to_flush() {
        let mut state = SendState::new();
        assert!(state.begin_flush().is_none());
        assert!(state.is_idle());
    }

    #[test]
    fn failed_serialize_leaves_staging_untouched() {
        let mut codec = LengthPrefixedCodec::new().with_max_payload(2);
        let mut state = SendState::new();
        state.stage(&mut codec, &RawPacket::new(1, &b"ok"[..])).unwrap();
        let before = state.staged_packets();

        let err = state
            .stage(&mut codec, &RawPacket::new(2, &b"too big"[..]))
            .unwrap_err();
        assert!(matches!(
            err,
            FrameError::Serialize(CodecError::PacketTooLarge { .. })
        ));
        assert_eq!(state.staged_packets(), before);
        assert_eq!(state.begin_flush().unwrap().len(), HEADER_SIZE + 2);
    }

    #[test]
    fn reset_discards_everything() {
        let mut codec = LengthPrefixedCodec::new();
        let mut state = SendState::new();
        state.stage(&mut codec, &RawPacket::new(1, &b"a"[..])).unwrap();
        state.begin_flush().unwrap();
        state.stage(&mut codec, &RawPacket::new(2, &b"b"[..])).unwrap();

        state.reset();
        assert!(state.is_idle());
        assert!(!state.has_staged());
        assert_eq!(state.staged_packets(), 0);
    }
}
