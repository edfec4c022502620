use std::io::{ErrorKind, Write};
use std::thread;
use std::time::Duration;

use tracing::{debug, trace};

use crate::codec::{FrameConfig, PacketCodec};
use crate::error::{FrameError, Result};
use crate::reader::transport_to_frame_error;
use crate::send_state::{FlushProgress, SendState};

const WOULD_BLOCK_PAUSE: Duration = Duration::from_millis(1);

/// Writes batches of serialized packets to any `Write` stream.
///
/// Packets are staged with [`stage`](Self::stage) and written out together by
/// [`flush`](Self::flush). [`write_chunk`](Self::write_chunk) exposes the
/// single-write step for callers that keep their own [`SendState`].
pub struct PacketWriter<W> {
    inner: W,
    state: SendState,
    config: FrameConfig,
}

impl<W: Write> PacketWriter<W> {
    /// Create a new packet writer with default configuration.
    pub fn new(inner: W) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new packet writer with explicit configuration.
    pub fn with_config(inner: W, config: FrameConfig) -> Self {
        Self {
            inner,
            state: SendState::new(),
            config,
        }
    }

    /// Serialize `packet` into the pending batch without writing.
    pub fn stage<C: PacketCodec>(&mut self, codec: &mut C, packet: &C::Packet) -> Result<()> {
        self.state.stage(codec, packet)
    }

    /// Serialize and write one packet (blocking).
    pub fn send<C: PacketCodec>(&mut self, codec: &mut C, packet: &C::Packet) -> Result<()> {
        self.stage(codec, packet)?;
        self.flush().map(|_| ())
    }

    /// Write every staged packet (blocking). Returns the number of packets
    /// written.
    pub fn flush(&mut self) -> Result<usize> {
        let mut written = 0usize;
        if self.state.is_idle() && self.state.begin_flush().is_none() {
            return Ok(written);
        }
        while let Some(pending) = self.state.pending() {
            let n = self.write_chunk(&pending)?;
            if let FlushProgress::Complete { packets, .. } = self.state.advance(n) {
                written += packets;
            }
        }
        self.flush_inner()?;
        trace!(packets = written, "staged packets flushed");
        Ok(written)
    }

    /// Perform one write of `buf`, retrying on interruption.
    ///
    /// Returns the number of bytes the stream accepted, which may be fewer
    /// than `buf.len()`. A stream that accepts zero bytes is closed. A
    /// non-blocking stream that is full is retried after a short pause.
    pub fn write_chunk(&mut self, buf: &[u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            match self.inner.write(buf) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    debug!(pending = buf.len(), "write would block, retrying");
                    thread::sleep(WOULD_BLOCK_PAUSE);
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Write all of `buf`, reporting each accepted chunk to `progress`.
    pub fn write_all_with(
        &mut self,
        buf: &[u8],
        mut progress: impl FnMut(usize),
    ) -> Result<()> {
        let mut offset = 0usize;
        while offset < buf.len() {
            let n = self.write_chunk(&buf[offset..])?;
            offset += n;
            progress(n);
        }
        self.flush_inner()
    }

    fn flush_inner(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Outbound batching state.
    pub fn state(&self) -> &SendState {
        &self.state
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> W {
        self.inner
    }

    /// Current writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl PacketWriter<tickwire_transport::NetSocket> {
    /// Create a writer for a socket and apply the write timeout from config.
    pub fn with_config_socket(
        inner: tickwire_transport::NetSocket,
        config: FrameConfig,
    ) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}
