use std::collections::VecDeque;
use std::net::{IpAddr, Shutdown, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tickwire_frame::{
    CustomErrorData, FrameError, PacketCodec, PacketId, PacketReader, SendState,
};
use tickwire_transport::{NetSocket, TransportError};
use tracing::{debug, info, trace, warn};

use crate::config::{ChannelConfig, ReceiveMode};
use crate::error::{ChannelError, Result};
use crate::event_pool::EventPool;
use crate::events::{ChannelEvent, ChannelEvents, EventKind, NetworkError, ObserverId, UserData};
use crate::heartbeat::HeartbeatState;
use crate::lock;
use crate::sender::{PacketSender, SendQueue};
use crate::status::{ChannelState, ChannelStatus};

/// Failure or diagnostic raised off the tick thread, surfaced on the next tick.
pub(crate) enum Deferred {
    Error(ChannelError),
    Custom(CustomErrorData),
}

/// Socket ownership for the current connect attempt.
///
/// `generation` changes on every connect and close; I/O threads carry the
/// generation they were started for and drop their results once it moves on.
pub(crate) struct Connection {
    pub(crate) generation: u64,
    pub(crate) state: ChannelState,
    pub(crate) socket: Option<NetSocket>,
    pub(crate) writer: Option<mpsc::Sender<Bytes>>,
    pub(crate) local: Option<SocketAddr>,
    pub(crate) remote: Option<SocketAddr>,
}

pub(crate) struct ChannelInner<C: PacketCodec> {
    pub(crate) name: Arc<str>,
    pub(crate) config: ChannelConfig,
    pub(crate) header_length: usize,
    pub(crate) codec: Mutex<C>,
    pub(crate) queue: Arc<SendQueue<C::Packet>>,
    pub(crate) conn: Mutex<Connection>,
    pub(crate) send_state: Mutex<SendState>,
    pub(crate) polled_reader: Mutex<Option<PacketReader<NetSocket, C>>>,
    pub(crate) heartbeat: Mutex<HeartbeatState>,
    pub(crate) pool: EventPool<PacketSender<C::Packet>, C::Packet>,
    pub(crate) events: ChannelEvents,
    pub(crate) deferred: Mutex<VecDeque<Deferred>>,
    pub(crate) sent: AtomicU64,
    pub(crate) received: AtomicU64,
}

/// One named, long-lived duplex connection.
///
/// Handles are cheap to clone and share one underlying channel. Socket I/O
/// runs on background threads; everything observable by handlers happens in
/// [`update`](Self::update), which the owner calls once per tick.
///
/// Fallible operations follow one rule: when an Error observer is registered
/// (on this channel or on its manager) the error is delivered as a
/// notification and the call returns `Ok(())`; otherwise it is returned.
pub struct NetworkChannel<C: PacketCodec> {
    pub(crate) inner: Arc<ChannelInner<C>>,
}

impl<C: PacketCodec> Clone for NetworkChannel<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: PacketCodec> NetworkChannel<C> {
    pub(crate) fn new(name: &str, codec: C, config: ChannelConfig) -> Self {
        let name: Arc<str> = Arc::from(name);
        let header_length = codec.header_length();
        Self {
            inner: Arc::new(ChannelInner {
                queue: Arc::new(SendQueue::new(Arc::clone(&name))),
                name,
                config,
                header_length,
                codec: Mutex::new(codec),
                conn: Mutex::new(Connection {
                    generation: 0,
                    state: ChannelState::Disconnected,
                    socket: None,
                    writer: None,
                    local: None,
                    remote: None,
                }),
                send_state: Mutex::new(SendState::new()),
                polled_reader: Mutex::new(None),
                heartbeat: Mutex::new(HeartbeatState::new()),
                pool: EventPool::new(),
                events: ChannelEvents::default(),
                deferred: Mutex::new(VecDeque::new()),
                sent: AtomicU64::new(0),
                received: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    /// Header length the codec declared when the channel was created.
    pub fn header_length(&self) -> usize {
        self.inner.header_length
    }

    /// True from connect completion until close or a fault.
    pub fn is_connected(&self) -> bool {
        self.inner.queue.is_active()
    }

    pub fn state(&self) -> ChannelState {
        lock(&self.inner.conn).state
    }

    /// Start connecting to `ip:port`.
    ///
    /// Returns once the attempt is issued; completion is reported through
    /// the Connected notification, and failure on a later
    /// [`update`](Self::update). An existing connection is closed first.
    pub fn connect(&self, ip: IpAddr, port: u16, user_data: Option<UserData>) -> Result<()> {
        self.connect_addr(SocketAddr::new(ip, port), user_data)
    }

    /// [`connect`](Self::connect) taking a socket address.
    pub fn connect_addr(&self, addr: SocketAddr, user_data: Option<UserData>) -> Result<()> {
        if let Some(expected) = self.inner.config.address_family {
            if let Err(err) = expected.check(&addr) {
                return self.inner.report(ChannelError::Socket(err));
            }
        }

        self.close();
        let generation = self.inner.begin_connect(Some(addr));
        info!(channel = %self.inner.name, %addr, "connecting");

        if let Err(err) = self.inner.spawn_connect(generation, addr, user_data) {
            self.inner.abort_connect(generation);
            return self
                .inner
                .report(ChannelError::Socket(TransportError::Io(err)));
        }
        Ok(())
    }

    /// Adopt an already connected socket, such as one returned by
    /// [`NetListener::accept`](tickwire_transport::NetListener::accept).
    ///
    /// Runs the connect-completion path synchronously: the Connected
    /// notification fires before this returns.
    pub fn attach(&self, socket: NetSocket, user_data: Option<UserData>) -> Result<()> {
        if let Some(expected) = self.inner.config.address_family {
            let checked = socket
                .peer_addr()
                .and_then(|addr| expected.check(&addr));
            if let Err(err) = checked {
                return self.inner.report(ChannelError::Socket(err));
            }
        }

        self.close();
        let generation = self.inner.begin_connect(None);
        match self.inner.establish(generation, socket, user_data) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.inner.abort_connect(generation);
                self.inner.report(err)
            }
        }
    }

    /// Queue `packet` for the next send batch. No I/O happens here.
    pub fn send(&self, packet: C::Packet) -> Result<()> {
        if self.inner.queue.push(packet) {
            return Ok(());
        }
        self.inner
            .report(ChannelError::SendOnInactive(self.inner.name.to_string()))
    }

    /// A cloneable handle that queues packets on this channel.
    pub fn sender(&self) -> PacketSender<C::Packet> {
        self.inner.sender()
    }

    /// Tear down the connection.
    ///
    /// No-op without a socket. Otherwise shuts the socket down (errors are
    /// ignored), drops queued sends and undelivered packets, resets the
    /// heartbeat, and fires Closed once. Handlers stay registered. Also
    /// cancels a connect attempt still in progress.
    pub fn close(&self) {
        self.inner.close_generation(None);
    }

    /// [`close`](Self::close), then drop every handler and local observer.
    pub fn shutdown(&self) {
        self.close();
        self.inner.pool.clear_handlers();
        self.inner.events.local().clear();
    }

    /// Run one tick: surface deferred faults, flush queued sends, drain
    /// available bytes in polled mode, evaluate the heartbeat, and hand
    /// received packets to their handlers.
    ///
    /// `elapsed` is the real time since the previous tick.
    pub fn update(&self, elapsed: Duration) -> Result<()> {
        let inner = &self.inner;
        inner.drain_deferred()?;

        if inner.queue.is_active() {
            inner.process_send()?;
            if inner.config.receive_mode == ReceiveMode::Polled {
                inner.process_receive_polled();
            }
            inner.tick_heartbeat(elapsed);
        }

        inner.pool.update();
        inner.drain_deferred()
    }

    /// Register the handler for packets with `id`, replacing any earlier one.
    /// Returns true if a handler was replaced.
    pub fn register_handler(
        &self,
        id: PacketId,
        handler: impl Fn(&PacketSender<C::Packet>, &C::Packet) + Send + Sync + 'static,
    ) -> bool {
        self.inner.pool.subscribe(id, handler)
    }

    pub fn unregister_handler(&self, id: PacketId) -> bool {
        self.inner.pool.unsubscribe(id)
    }

    /// Handler for packets whose id has no specific handler.
    pub fn set_default_handler(
        &self,
        handler: impl Fn(&PacketSender<C::Packet>, &C::Packet) + Send + Sync + 'static,
    ) {
        self.inner.pool.set_default_handler(handler);
    }

    pub fn on_connected(
        &self,
        f: impl Fn(&str, Option<&UserData>) + Send + Sync + 'static,
    ) -> ObserverId {
        self.inner.events.local().on_connected(f)
    }

    pub fn on_closed(&self, f: impl Fn(&str) + Send + Sync + 'static) -> ObserverId {
        self.inner.events.local().on_closed(f)
    }

    pub fn on_missed_heartbeat(&self, f: impl Fn(&str, u32) + Send + Sync + 'static) -> ObserverId {
        self.inner.events.local().on_missed_heartbeat(f)
    }

    pub fn on_error(&self, f: impl Fn(&str, &NetworkError) + Send + Sync + 'static) -> ObserverId {
        self.inner.events.local().on_error(f)
    }

    pub fn on_custom_error(
        &self,
        f: impl Fn(&str, &CustomErrorData) + Send + Sync + 'static,
    ) -> ObserverId {
        self.inner.events.local().on_custom_error(f)
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.inner.events.local().unsubscribe(id)
    }

    /// Local endpoint of the current connection.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        lock(&self.inner.conn)
            .local
            .ok_or_else(|| ChannelError::NotConnected(self.inner.name.to_string()))
    }

    /// Remote endpoint of the current connection.
    pub fn remote_addr(&self) -> Result<SocketAddr> {
        let conn = lock(&self.inner.conn);
        match (conn.state, conn.remote) {
            (ChannelState::Connected, Some(addr)) => Ok(addr),
            _ => Err(ChannelError::NotConnected(self.inner.name.to_string())),
        }
    }

    /// Packets written to the socket since the last connect.
    pub fn sent_packets(&self) -> u64 {
        self.inner.sent.load(Ordering::Relaxed)
    }

    /// Packet bodies received since the last connect.
    pub fn received_packets(&self) -> u64 {
        self.inner.received.load(Ordering::Relaxed)
    }

    pub fn pending_send(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn pending_receive(&self) -> usize {
        self.inner.pool.len()
    }

    pub fn missed_heartbeats(&self) -> u32 {
        lock(&self.inner.heartbeat).missed()
    }

    pub fn status(&self) -> ChannelStatus {
        let inner = &self.inner;
        let (state, local_address, remote_address) = {
            let conn = lock(&inner.conn);
            (conn.state, conn.local, conn.remote)
        };
        let heartbeat = *lock(&inner.heartbeat);
        ChannelStatus {
            name: inner.name.to_string(),
            state,
            connected: inner.queue.is_active(),
            receive_mode: inner.config.receive_mode,
            local_address,
            remote_address: remote_address.filter(|_| state == ChannelState::Connected),
            pending_send: inner.queue.len(),
            pending_receive: inner.pool.len(),
            sent_packets: inner.sent.load(Ordering::Relaxed),
            received_packets: inner.received.load(Ordering::Relaxed),
            missed_heartbeats: heartbeat.missed(),
            heartbeat_elapsed_secs: heartbeat.elapsed().as_secs_f64(),
            heartbeat_interval_secs: inner.config.heartbeat_interval,
        }
    }

    pub(crate) fn events(&self) -> &ChannelEvents {
        &self.inner.events
    }
}

impl<C: PacketCodec> std::fmt::Debug for NetworkChannel<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkChannel")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl<C: PacketCodec> ChannelInner<C> {
    pub(crate) fn sender(&self) -> PacketSender<C::Packet> {
        PacketSender::new(Arc::clone(&self.queue))
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        lock(&self.conn).generation == generation
    }

    /// Deliver `err` to Error observers, or hand it back when there are none.
    pub(crate) fn report(&self, err: ChannelError) -> Result<()> {
        if !self.events.has(EventKind::Error) {
            return Err(err);
        }
        warn!(channel = %self.name, code = %err.code(), error = %err, "channel error");
        self.events
            .emit(&self.name, ChannelEvent::Error(NetworkError::from(&err)));
        Ok(())
    }

    pub(crate) fn defer(&self, item: Deferred) {
        lock(&self.deferred).push_back(item);
    }

    fn drain_deferred(&self) -> Result<()> {
        loop {
            let next = lock(&self.deferred).pop_front();
            match next {
                None => return Ok(()),
                Some(Deferred::Custom(data)) => self
                    .events
                    .emit(&self.name, ChannelEvent::CustomError { data }),
                Some(Deferred::Error(err)) => self.report(err)?,
            }
        }
    }

    /// Serialize every queued packet into one batch and hand it to the
    /// writer thread. Skipped while the previous batch is still in flight.
    fn process_send(&self) -> Result<()> {
        let staged = {
            let mut state = lock(&self.send_state);
            if !state.is_idle() {
                return Ok(());
            }
            let packets = self.queue.drain();
            if packets.is_empty() {
                return Ok(());
            }
            let mut codec = lock(&self.codec);
            let staged = packets
                .iter()
                .try_for_each(|packet| state.stage(&mut *codec, packet))
                .map(|()| (packets.len(), state.begin_flush()));
            if staged.is_err() {
                state.reset();
            }
            staged
        };

        let (packets, batch) = match staged {
            Ok((packets, Some(batch))) => (packets, batch),
            Ok((_, None)) => return Ok(()),
            Err(err) => {
                self.queue.set_active(false);
                return self.report(ChannelError::Send(err));
            }
        };

        trace!(channel = %self.name, packets, bytes = batch.len(), "send batch staged");
        let writer = lock(&self.conn).writer.clone();
        let Some(writer) = writer else {
            lock(&self.send_state).reset();
            if !self.queue.is_active() {
                debug!(channel = %self.name, "closed during send, batch dropped");
                return Ok(());
            }
            self.queue.set_active(false);
            return self.report(ChannelError::NotConnected(self.name.to_string()));
        };
        if writer.send(batch).is_err() {
            // the writer has already queued its own failure
            lock(&self.send_state).reset();
            debug!(channel = %self.name, "writer thread gone, batch dropped");
        }
        Ok(())
    }

    /// Drain every byte currently readable on a non-blocking socket.
    fn process_receive_polled(&self) {
        let mut guard = lock(&self.polled_reader);
        let generation = lock(&self.conn).generation;
        loop {
            let Some(reader) = guard.as_mut() else {
                return;
            };
            match reader.try_read_phase() {
                Ok(None) => return,
                Ok(Some(phase)) => {
                    if !self.handle_phase(generation, reader, phase) {
                        *guard = None;
                        return;
                    }
                }
                Err(FrameError::ConnectionClosed) => {
                    drop(guard);
                    self.close_generation(Some(generation));
                    return;
                }
                Err(err) => {
                    *guard = None;
                    drop(guard);
                    self.fail(generation, ChannelError::Receive(err));
                    return;
                }
            }
        }
    }

    fn tick_heartbeat(&self, elapsed: Duration) {
        let Some(interval) = self.config.heartbeat_period() else {
            return;
        };
        let due = lock(&self.heartbeat).tick(elapsed, interval);
        let Some(previous) = due else {
            return;
        };

        let sent = lock(&self.codec).send_heartbeat(&self.sender());
        trace!(channel = %self.name, missed = previous, sent, "heartbeat due");
        if sent && previous > 0 {
            debug!(channel = %self.name, count = previous, "missed heartbeat");
            self.events
                .emit(&self.name, ChannelEvent::MissedHeartbeat { count: previous });
        }
    }

    /// Start a new connect generation with fresh framing state.
    pub(crate) fn begin_connect(&self, remote: Option<SocketAddr>) -> u64 {
        let generation = {
            let mut conn = lock(&self.conn);
            conn.generation += 1;
            conn.state = ChannelState::Connecting;
            conn.local = None;
            conn.remote = remote;
            conn.generation
        };
        lock(&self.send_state).reset();
        *lock(&self.polled_reader) = None;
        lock(&self.codec).prepare_for_connecting();
        generation
    }

    pub(crate) fn abort_connect(&self, generation: u64) {
        let mut conn = lock(&self.conn);
        if conn.generation == generation && conn.state == ChannelState::Connecting {
            conn.state = ChannelState::Disconnected;
            conn.remote = None;
        }
    }

    /// Close the connection, but only if it still belongs to `expected`
    /// when one is given. Returns true if a socket was torn down.
    pub(crate) fn close_generation(&self, expected: Option<u64>) -> bool {
        let socket = {
            let mut conn = lock(&self.conn);
            if expected.is_some_and(|generation| generation != conn.generation) {
                return false;
            }
            conn.generation += 1;
            conn.state = ChannelState::Disconnected;
            conn.writer = None;
            conn.local = None;
            conn.remote = None;
            self.queue.set_active(false);
            conn.socket.take()
        };
        *lock(&self.polled_reader) = None;

        let Some(socket) = socket else {
            return false;
        };
        if let Err(err) = socket.shutdown(Shutdown::Both) {
            debug!(channel = %self.name, error = %err, "socket shutdown failed, ignored");
        }
        drop(socket);

        self.queue.clear();
        self.pool.clear();
        lock(&self.heartbeat).reset(true);
        lock(&self.send_state).reset();

        info!(channel = %self.name, "channel closed");
        self.events.emit(&self.name, ChannelEvent::Closed);
        true
    }
}

impl<C: PacketCodec> Drop for ChannelInner<C> {
    fn drop(&mut self) {
        let conn = self.conn.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(socket) = conn.socket.take() {
            if let Err(err) = socket.shutdown(Shutdown::Both) {
                debug!(channel = %self.name, error = %err, "socket shutdown on drop failed, ignored");
            }
        }
    }
}
