//! Background I/O for a channel: the connect attempt, the blocking reader,
//! and the writer that flushes send batches.
//!
//! Every thread holds a weak reference to the channel and the connect
//! generation it was started for. Results for a generation that has since
//! been closed or replaced are dropped silently.

use std::net::{Shutdown, SocketAddr};
use std::sync::atomic::Ordering;
use std::sync::{mpsc, Arc, Weak};
use std::thread;

use bytes::Bytes;
use tickwire_frame::{
    FlushProgress, FrameConfig, FrameError, PacketCodec, PacketReader, PacketWriter, ReadPhase,
};
use tickwire_transport::{NetSocket, TransportError};
use tracing::{debug, info, trace, warn};

use crate::channel::{ChannelInner, Deferred};
use crate::config::ReceiveMode;
use crate::error::{ChannelError, Result};
use crate::events::{ChannelEvent, UserData};
use crate::lock;
use crate::status::ChannelState;

impl<C: PacketCodec> ChannelInner<C> {
    pub(crate) fn spawn_connect(
        self: &Arc<Self>,
        generation: u64,
        addr: SocketAddr,
        user_data: Option<UserData>,
    ) -> std::io::Result<()> {
        let weak = Arc::downgrade(self);
        thread::Builder::new()
            .name(format!("tickwire-connect-{}", self.name))
            .spawn(move || {
                let result = NetSocket::connect(addr);
                if let Some(inner) = weak.upgrade() {
                    inner.complete_connect(generation, addr, result, user_data);
                }
            })
            .map(|_| ())
    }

    fn complete_connect(
        self: &Arc<Self>,
        generation: u64,
        addr: SocketAddr,
        result: tickwire_transport::Result<NetSocket>,
        user_data: Option<UserData>,
    ) {
        let socket = match result {
            Ok(socket) => socket,
            Err(source) => {
                {
                    let mut conn = lock(&self.conn);
                    if conn.generation != generation {
                        return;
                    }
                    conn.state = ChannelState::Disconnected;
                    conn.remote = None;
                }
                warn!(channel = %self.name, %addr, error = %source, "connect failed");
                self.defer(Deferred::Error(ChannelError::Connect { addr, source }));
                return;
            }
        };

        if let Err(err) = self.establish(generation, socket, user_data) {
            self.abort_connect(generation);
            if self.is_current(generation) {
                warn!(channel = %self.name, error = %err, "connection setup failed");
                self.defer(Deferred::Error(err));
            }
        }
    }

    /// Install a connected socket as the current connection and start its
    /// I/O. Fires Connected.
    pub(crate) fn establish(
        self: &Arc<Self>,
        generation: u64,
        socket: NetSocket,
        user_data: Option<UserData>,
    ) -> Result<()> {
        self.config.socket_options().apply(&socket)?;
        let local = socket.local_addr()?;
        let remote = socket.peer_addr()?;
        let writer_socket = socket.try_clone()?;
        let reader_socket = socket.try_clone()?;
        if self.config.receive_mode == ReceiveMode::Polled {
            reader_socket.set_nonblocking(true)?;
        }

        let frame_config = FrameConfig {
            max_packet_length: self.config.max_packet_length,
            ..FrameConfig::default()
        };
        let reader = {
            let codec = lock(&self.codec);
            PacketReader::with_config(reader_socket, &*codec, frame_config.clone())
        };
        let writer = PacketWriter::with_config(writer_socket, frame_config);
        let (tx, rx) = mpsc::channel();

        {
            let mut conn = lock(&self.conn);
            if conn.generation != generation {
                drop(conn);
                debug!(channel = %self.name, "connect superseded, dropping socket");
                if let Err(err) = socket.shutdown(Shutdown::Both) {
                    debug!(channel = %self.name, error = %err, "socket shutdown failed, ignored");
                }
                return Ok(());
            }
            conn.socket = Some(socket);
            conn.state = ChannelState::Connected;
            conn.local = Some(local);
            conn.remote = Some(remote);
            conn.writer = Some(tx);

            // A close can only observe the connection fully reset and active.
            self.sent.store(0, Ordering::Relaxed);
            self.received.store(0, Ordering::Relaxed);
            self.queue.clear();
            lock(&self.heartbeat).reset(true);
            self.queue.set_active(true);
        }

        self.spawn_io("write", generation, move |weak| run_writer(weak, generation, writer, rx));
        if !self.is_current(generation) {
            debug!(channel = %self.name, "closed while connecting");
            return Ok(());
        }

        info!(channel = %self.name, %local, %remote, mode = self.config.receive_mode.as_str(), "channel connected");
        self.events
            .emit(&self.name, ChannelEvent::Connected { user_data });

        match self.config.receive_mode {
            ReceiveMode::Async => {
                self.spawn_io("read", generation, move |weak| {
                    run_reader(weak, generation, reader)
                });
            }
            ReceiveMode::Polled => {
                let mut slot = lock(&self.polled_reader);
                if self.is_current(generation) {
                    *slot = Some(reader);
                }
            }
        }
        Ok(())
    }

    fn spawn_io(
        self: &Arc<Self>,
        role: &str,
        generation: u64,
        body: impl FnOnce(Weak<Self>) + Send + 'static,
    ) {
        let weak = Arc::downgrade(self);
        let spawned = thread::Builder::new()
            .name(format!("tickwire-{role}-{}", self.name))
            .spawn(move || body(weak));
        if let Err(err) = spawned {
            self.fail(
                generation,
                ChannelError::Socket(TransportError::Io(err)),
            );
        }
    }

    /// Mark the channel inactive and queue `err` for the next tick, unless
    /// `generation` is stale.
    pub(crate) fn fail(&self, generation: u64, err: ChannelError) {
        {
            let conn = lock(&self.conn);
            if conn.generation != generation || conn.socket.is_none() {
                debug!(channel = %self.name, error = %err, "stale I/O failure ignored");
                return;
            }
            self.queue.set_active(false);
        }
        warn!(channel = %self.name, code = %err.code(), error = %err, "channel fault");
        self.defer(Deferred::Error(err));
    }

    /// Decode a completed phase. Returns false when the pipeline must stop.
    pub(crate) fn handle_phase(
        &self,
        generation: u64,
        reader: &mut PacketReader<NetSocket, C>,
        phase: ReadPhase,
    ) -> bool {
        if !self.is_current(generation) {
            return false;
        }
        match phase {
            ReadPhase::Header => {
                let decoded = reader.decode_header(&mut *lock(&self.codec));
                match decoded {
                    Ok(custom_error) => {
                        if let Some(data) = custom_error {
                            self.defer(Deferred::Custom(data));
                        }
                        trace!(
                            channel = %self.name,
                            body = reader.state().expected_len(),
                            "header received"
                        );
                        true
                    }
                    Err(err) => {
                        self.fail(generation, ChannelError::Receive(err));
                        false
                    }
                }
            }
            ReadPhase::Body => {
                lock(&self.heartbeat).reset(self.config.reset_heartbeat_on_receive);
                let decoded = reader.decode_packet(&mut *lock(&self.codec));
                match decoded {
                    Ok(decoded) => {
                        if let Some(data) = decoded.custom_error {
                            self.defer(Deferred::Custom(data));
                        }
                        if let Some(packet) = decoded.value {
                            self.pool.fire(self.sender(), packet);
                        }
                        self.received.fetch_add(1, Ordering::Relaxed);
                        true
                    }
                    Err(err) => {
                        self.fail(generation, ChannelError::Receive(err));
                        false
                    }
                }
            }
        }
    }

    fn on_bytes_written(&self, generation: u64, n: usize) {
        if !self.is_current(generation) {
            return;
        }
        if let FlushProgress::Complete { packets, bytes } = lock(&self.send_state).advance(n) {
            self.sent.fetch_add(packets as u64, Ordering::Relaxed);
            debug!(channel = %self.name, packets, bytes, "send batch flushed");
        }
    }
}

/// Keep one blocking read outstanding until the connection ends.
fn run_reader<C: PacketCodec>(
    weak: Weak<ChannelInner<C>>,
    generation: u64,
    mut reader: PacketReader<NetSocket, C>,
) {
    loop {
        let phase = reader.read_phase();
        let Some(inner) = weak.upgrade() else {
            return;
        };
        match phase {
            Ok(phase) => {
                if !inner.handle_phase(generation, &mut reader, phase) {
                    return;
                }
            }
            Err(FrameError::ConnectionClosed) => {
                if inner.close_generation(Some(generation)) {
                    debug!(channel = %inner.name, "remote closed the connection");
                }
                return;
            }
            Err(err) => {
                inner.fail(generation, ChannelError::Receive(err));
                return;
            }
        }
    }
}

/// Write each batch handed over by the tick, reporting progress as it goes.
fn run_writer<C: PacketCodec>(
    weak: Weak<ChannelInner<C>>,
    generation: u64,
    mut writer: PacketWriter<NetSocket>,
    batches: mpsc::Receiver<Bytes>,
) {
    while let Ok(batch) = batches.recv() {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let result = writer.write_all_with(&batch, |n| inner.on_bytes_written(generation, n));
        if let Err(err) = result {
            inner.fail(generation, ChannelError::Send(err));
            return;
        }
    }
}
