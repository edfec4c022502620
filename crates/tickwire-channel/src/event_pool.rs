use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tickwire_frame::{Packet, PacketId};
use tracing::trace;

use crate::lock;

/// Handler invoked with the sender and the packet.
pub type PacketHandler<S, T> = Arc<dyn Fn(&S, &T) + Send + Sync>;

/// Deferred packet dispatcher.
///
/// [`fire`](Self::fire) only queues, so it is safe to call from an I/O
/// thread. Handlers run inside [`update`](Self::update), on whichever thread
/// drives the tick, in arrival order. At most one handler is registered per
/// packet id; registering again replaces it.
pub struct EventPool<S, T> {
    handlers: Mutex<HashMap<PacketId, PacketHandler<S, T>>>,
    default_handler: Mutex<Option<PacketHandler<S, T>>>,
    queue: Mutex<VecDeque<(S, T)>>,
}

impl<S, T: Packet> Default for EventPool<S, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, T: Packet> EventPool<S, T> {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
            default_handler: Mutex::new(None),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Register `handler` for `id`. Returns true if it replaced an earlier
    /// registration.
    pub fn subscribe(&self, id: PacketId, handler: impl Fn(&S, &T) + Send + Sync + 'static) -> bool {
        lock(&self.handlers)
            .insert(id, Arc::new(handler))
            .is_some()
    }

    /// Remove the handler for `id`.
    pub fn unsubscribe(&self, id: PacketId) -> bool {
        lock(&self.handlers).remove(&id).is_some()
    }

    pub fn has_handler(&self, id: PacketId) -> bool {
        lock(&self.handlers).contains_key(&id)
    }

    /// Install the fallback for ids without a specific handler.
    pub fn set_default_handler(&self, handler: impl Fn(&S, &T) + Send + Sync + 'static) {
        *lock(&self.default_handler) = Some(Arc::new(handler));
    }

    pub fn clear_default_handler(&self) {
        *lock(&self.default_handler) = None;
    }

    /// Queue a packet for the next [`update`](Self::update).
    pub fn fire(&self, sender: S, packet: T) {
        lock(&self.queue).push_back((sender, packet));
    }

    /// Deliver every packet queued before this call. Packets fired by the
    /// handlers themselves wait for the next drain, and a [`clear`](Self::clear)
    /// from inside a handler stops delivery of the rest.
    ///
    /// Returns the number of packets taken off the queue.
    pub fn update(&self) -> usize {
        let pending = lock(&self.queue).len();
        let mut taken = 0;
        while taken < pending {
            let Some((sender, packet)) = lock(&self.queue).pop_front() else {
                break;
            };
            taken += 1;
            let id = packet.id();
            let handler = lock(&self.handlers)
                .get(&id)
                .cloned()
                .or_else(|| lock(&self.default_handler).clone());
            match handler {
                Some(handler) => handler(&sender, &packet),
                None => trace!(packet_id = id, "no handler for packet, dropped"),
            }
        }
        taken
    }

    /// Drop every queued packet without delivering it. Handlers stay
    /// registered.
    pub fn clear(&self) -> usize {
        let mut queue = lock(&self.queue);
        let dropped = queue.len();
        queue.clear();
        dropped
    }

    /// Drop every handler registration, including the default.
    pub fn clear_handlers(&self) {
        lock(&self.handlers).clear();
        *lock(&self.default_handler) = None;
    }

    /// Packets waiting for the next drain.
    pub fn len(&self) -> usize {
        lock(&self.queue).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
