//! `tokio_util::codec` adapter for async streams.
//!
//! Wrap any [`PacketCodec`] in a [`PacketFramer`] and hand it to
//! `tokio_util::codec::Framed` to get a `Stream` of decoded packets and a
//! `Sink` of outbound ones. The framing rules are the same as the blocking
//! reader: a fixed-length header, then exactly the declared body length.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{CustomErrorData, Decoded, PacketCodec, PacketHeader, DEFAULT_MAX_PACKET_LENGTH};
use crate::error::FrameError;

pub struct PacketFramer<C: PacketCodec> {
    codec: C,
    header: Option<C::Header>,
    header_error: Option<CustomErrorData>,
    max_packet_length: usize,
}

impl<C: PacketCodec> PacketFramer<C> {
    pub fn new(codec: C) -> Self {
        Self::with_max_packet_length(codec, DEFAULT_MAX_PACKET_LENGTH)
    }

    pub fn with_max_packet_length(codec: C, max_packet_length: usize) -> Self {
        Self {
            codec,
            header: None,
            header_error: None,
            max_packet_length,
        }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    pub fn codec_mut(&mut self) -> &mut C {
        &mut self.codec
    }

    pub fn into_codec(self) -> C {
        self.codec
    }
}

impl<C: PacketCodec> Decoder for PacketFramer<C> {
    type Item = Decoded<C::Packet>;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.header.is_none() {
            let header_length = self.codec.header_length();
            if src.len() < header_length {
                src.reserve(header_length - src.len());
                return Ok(None);
            }
            let raw = src.split_to(header_length);
            let decoded = self
                .codec
                .deserialize_header(&raw)
                .map_err(FrameError::DeserializeHeader)?;
            let header = decoded.value.ok_or(FrameError::MissingHeader)?;
            if header.packet_length() > self.max_packet_length {
                return Err(FrameError::PacketTooLarge {
                    size: header.packet_length(),
                    max: self.max_packet_length,
                });
            }
            self.header = Some(header);
            self.header_error = decoded.custom_error;
        }

        let length = match self.header.as_ref() {
            Some(header) => header.packet_length(),
            None => return Ok(None),
        };
        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        let body = src.split_to(length);
        let header = self.header.take().ok_or(FrameError::MissingHeader)?;
        let mut decoded = self
            .codec
            .deserialize_packet(&header, &body)
            .map_err(FrameError::DeserializePacket)?;
        let header_error = self.header_error.take();
        if decoded.custom_error.is_none() {
            decoded.custom_error = header_error;
        }
        Ok(Some(decoded))
    }
}

impl<C: PacketCodec> Encoder<C::Packet> for PacketFramer<C> {
    type Error = FrameError;

    fn encode(&mut self, item: C::Packet, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.codec
            .serialize(&item, dst)
            .map_err(FrameError::Serialize)
    }
}
