use std::any::Any;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tickwire_frame::CustomErrorData;

use crate::error::{ChannelError, NetworkErrorCode};
use crate::lock;

/// Opaque value handed to `connect` and returned in the Connected event.
pub type UserData = Arc<dyn Any + Send + Sync>;

/// Error notification payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkError {
    pub code: NetworkErrorCode,
    pub message: String,
    /// OS-level error kind for socket faults.
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "serialize_kind")]
    pub socket_error: Option<ErrorKind>,
}

fn serialize_kind<S: serde::Serializer>(
    kind: &Option<ErrorKind>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match kind {
        Some(kind) => serializer.serialize_str(&format!("{kind:?}")),
        None => serializer.serialize_none(),
    }
}

impl From<&ChannelError> for NetworkError {
    fn from(err: &ChannelError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            socket_error: err.socket_error(),
        }
    }
}

/// Lifecycle notification raised by a channel.
#[derive(Clone)]
pub enum ChannelEvent {
    Connected { user_data: Option<UserData> },
    Closed,
    MissedHeartbeat { count: u32 },
    Error(NetworkError),
    CustomError { data: CustomErrorData },
}

impl ChannelEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ChannelEvent::Connected { .. } => EventKind::Connected,
            ChannelEvent::Closed => EventKind::Closed,
            ChannelEvent::MissedHeartbeat { .. } => EventKind::MissedHeartbeat,
            ChannelEvent::Error(_) => EventKind::Error,
            ChannelEvent::CustomError { .. } => EventKind::CustomError,
        }
    }
}

impl std::fmt::Debug for ChannelEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelEvent::Connected { user_data } => f
                .debug_struct("Connected")
                .field("user_data", &user_data.is_some())
                .finish(),
            ChannelEvent::Closed => f.write_str("Closed"),
            ChannelEvent::MissedHeartbeat { count } => f
                .debug_struct("MissedHeartbeat")
                .field("count", count)
                .finish(),
            ChannelEvent::Error(err) => f.debug_tuple("Error").field(err).finish(),
            ChannelEvent::CustomError { .. } => f.write_str("CustomError"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Connected,
    Closed,
    MissedHeartbeat,
    Error,
    CustomError,
}

/// Handle returned by every observer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

type Observer = Arc<dyn Fn(&str, &ChannelEvent) + Send + Sync>;

/// Observer list for channel notifications.
///
/// Observers are called with the channel name. The list lock is released
/// before any observer runs, so observers may register, unregister, or
/// close the channel.
#[derive(Default)]
pub struct Notifier {
    observers: Mutex<Vec<(ObserverId, EventKind, Observer)>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a raw observer for one kind of event.
    pub fn subscribe(
        &self,
        kind: EventKind,
        observer: impl Fn(&str, &ChannelEvent) + Send + Sync + 'static,
    ) -> ObserverId {
        let id = ObserverId(NEXT_OBSERVER_ID.fetch_add(1, Ordering::Relaxed));
        lock(&self.observers).push((id, kind, Arc::new(observer)));
        id
    }

    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = lock(&self.observers);
        let before = observers.len();
        observers.retain(|(existing, _, _)| *existing != id);
        observers.len() != before
    }

    pub fn has(&self, kind: EventKind) -> bool {
        lock(&self.observers).iter().any(|(_, k, _)| *k == kind)
    }

    pub fn clear(&self) {
        lock(&self.observers).clear();
    }

    /// Deliver `event` to every observer of its kind, in registration order.
    pub fn notify(&self, channel: &str, event: &ChannelEvent) {
        let kind = event.kind();
        let targets: Vec<Observer> = lock(&self.observers)
            .iter()
            .filter(|(_, k, _)| *k == kind)
            .map(|(_, _, observer)| Arc::clone(observer))
            .collect();
        for observer in targets {
            observer(channel, event);
        }
    }

    pub fn on_connected(
        &self,
        f: impl Fn(&str, Option<&UserData>) + Send + Sync + 'static,
    ) -> ObserverId {
        self.subscribe(EventKind::Connected, move |name, event| {
            if let ChannelEvent::Connected { user_data } = event {
                f(name, user_data.as_ref());
            }
        })
    }

    pub fn on_closed(&self, f: impl Fn(&str) + Send + Sync + 'static) -> ObserverId {
        self.subscribe(EventKind::Closed, move |name, _| f(name))
    }

    pub fn on_missed_heartbeat(&self, f: impl Fn(&str, u32) + Send + Sync + 'static) -> ObserverId {
        self.subscribe(EventKind::MissedHeartbeat, move |name, event| {
            if let ChannelEvent::MissedHeartbeat { count } = event {
                f(name, *count);
            }
        })
    }

    pub fn on_error(&self, f: impl Fn(&str, &NetworkError) + Send + Sync + 'static) -> ObserverId {
        self.subscribe(EventKind::Error, move |name, event| {
            if let ChannelEvent::Error(err) = event {
                f(name, err);
            }
        })
    }

    pub fn on_custom_error(
        &self,
        f: impl Fn(&str, &CustomErrorData) + Send + Sync + 'static,
    ) -> ObserverId {
        self.subscribe(EventKind::CustomError, move |name, event| {
            if let ChannelEvent::CustomError { data } = event {
                f(name, data);
            }
        })
    }
}

/// A channel's own observers plus the manager-wide list it is wired into.
#[derive(Default)]
pub(crate) struct ChannelEvents {
    local: Notifier,
    upstream: Mutex<Option<Arc<Notifier>>>,
}

impl ChannelEvents {
    pub(crate) fn local(&self) -> &Notifier {
        &self.local
    }

    pub(crate) fn attach(&self, upstream: Arc<Notifier>) {
        *lock(&self.upstream) = Some(upstream);
    }

    pub(crate) fn detach(&self) {
        *lock(&self.upstream) = None;
    }

    pub(crate) fn has(&self, kind: EventKind) -> bool {
        self.local.has(kind)
            || lock(&self.upstream)
                .as_ref()
                .is_some_and(|upstream| upstream.has(kind))
    }

    pub(crate) fn emit(&self, channel: &str, event: ChannelEvent) {
        self.local.notify(channel, &event);
        let upstream = lock(&self.upstream).clone();
        if let Some(upstream) = upstream {
            upstream.notify(channel, &event);
        }
    }
}
