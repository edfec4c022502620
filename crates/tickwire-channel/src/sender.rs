use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tickwire_frame::PacketSink;

use crate::lock;

/// Outbound packet queue shared by every producer of one channel.
pub(crate) struct SendQueue<P> {
    name: Arc<str>,
    active: AtomicBool,
    queue: Mutex<VecDeque<P>>,
}

impl<P> SendQueue<P> {
    pub(crate) fn new(name: Arc<str>) -> Self {
        Self {
            name,
            active: AtomicBool::new(false),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    /// Queue `packet` if the channel is active.
    pub(crate) fn push(&self, packet: P) -> bool {
        if !self.is_active() {
            return false;
        }
        lock(&self.queue).push_back(packet);
        true
    }

    /// Take every queued packet, oldest first.
    pub(crate) fn drain(&self) -> Vec<P> {
        lock(&self.queue).drain(..).collect()
    }

    pub(crate) fn clear(&self) {
        lock(&self.queue).clear();
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.queue).len()
    }
}

/// Cloneable, thread-safe handle that queues packets on a channel.
///
/// Packet handlers receive one of these so they can reply; the codec gets
/// one for heartbeats. Queued packets go out on the channel's next tick.
pub struct PacketSender<P> {
    queue: Arc<SendQueue<P>>,
}

impl<P> Clone for PacketSender<P> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
        }
    }
}

impl<P> PacketSender<P> {
    pub(crate) fn new(queue: Arc<SendQueue<P>>) -> Self {
        Self { queue }
    }

    /// Queue `packet`. Returns false if the channel is not connected.
    pub fn send(&self, packet: P) -> bool {
        self.queue.push(packet)
    }

    /// Name of the channel this sender feeds.
    pub fn channel_name(&self) -> &str {
        self.queue.name()
    }

    pub fn is_connected(&self) -> bool {
        self.queue.is_active()
    }

    /// Packets waiting for the next tick.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl<P> PacketSink<P> for PacketSender<P> {
    fn enqueue(&self, packet: P) -> bool {
        self.send(packet)
    }
}

impl<P> std::fmt::Debug for PacketSender<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketSender")
            .field("channel", &self.queue.name())
            .field("connected", &self.queue.is_active())
            .finish()
    }
}
