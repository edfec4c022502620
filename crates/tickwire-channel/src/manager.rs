use std::sync::Arc;
use std::time::Duration;

use tickwire_frame::{CustomErrorData, PacketCodec};
use tracing::{debug, info};

use crate::channel::NetworkChannel;
use crate::config::ChannelConfig;
use crate::error::ManagerError;
use crate::events::{NetworkError, Notifier, ObserverId, UserData};
use crate::status::ChannelStatus;

/// Registry of named channels.
///
/// Every channel's notifications are forwarded to the manager's observers,
/// tagged with the channel name. [`update`](Self::update) ticks every
/// channel in creation order.
pub struct NetworkManager<C: PacketCodec> {
    channels: Vec<NetworkChannel<C>>,
    events: Arc<Notifier>,
}

impl<C: PacketCodec> Default for NetworkManager<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: PacketCodec> NetworkManager<C> {
    pub fn new() -> Self {
        Self {
            channels: Vec::new(),
            events: Arc::new(Notifier::new()),
        }
    }

    /// Create a channel with the default configuration.
    pub fn create_channel(
        &mut self,
        name: &str,
        codec: C,
    ) -> Result<NetworkChannel<C>, ManagerError> {
        self.create_channel_with_config(name, codec, ChannelConfig::default())
    }

    /// Create and register a channel.
    ///
    /// Fails without touching the registry if `name` is taken, the codec's
    /// header length is zero, or `config` is invalid.
    pub fn create_channel_with_config(
        &mut self,
        name: &str,
        codec: C,
        config: ChannelConfig,
    ) -> Result<NetworkChannel<C>, ManagerError> {
        if self.has_channel(name) {
            return Err(ManagerError::DuplicateChannel(name.to_string()));
        }
        let length = codec.header_length();
        if length == 0 {
            return Err(ManagerError::InvalidHeaderLength {
                name: name.to_string(),
                length,
            });
        }
        config
            .validate()
            .map_err(|reason| ManagerError::InvalidConfig {
                name: name.to_string(),
                reason,
            })?;

        let channel = NetworkChannel::new(name, codec, config);
        channel.events().attach(Arc::clone(&self.events));
        self.channels.push(channel.clone());
        info!(channel = %name, header_length = length, "network channel created");
        Ok(channel)
    }

    /// Unwire, shut down, and remove the channel called `name`. Returns
    /// whether it existed.
    pub fn destroy_channel(&mut self, name: &str) -> bool {
        let Some(index) = self.channels.iter().position(|c| c.name() == name) else {
            return false;
        };
        let channel = self.channels.remove(index);
        channel.events().detach();
        channel.shutdown();
        info!(channel = %name, "network channel destroyed");
        true
    }

    /// Tick every channel once, in creation order.
    ///
    /// Every channel is ticked even when an earlier one fails; the first
    /// failure is returned.
    pub fn update(&self, elapsed: Duration) -> Result<(), ManagerError> {
        let mut first_error = None;
        for channel in &self.channels {
            if let Err(source) = channel.update(elapsed) {
                debug!(channel = %channel.name(), error = %source, "tick failed");
                if first_error.is_none() {
                    first_error = Some(ManagerError::Channel {
                        name: channel.name().to_string(),
                        source,
                    });
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Shut down and remove every channel.
    pub fn shutdown(&mut self) {
        for channel in self.channels.drain(..) {
            channel.events().detach();
            channel.shutdown();
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn has_channel(&self, name: &str) -> bool {
        self.channels.iter().any(|c| c.name() == name)
    }

    pub fn channel(&self, name: &str) -> Option<&NetworkChannel<C>> {
        self.channels.iter().find(|c| c.name() == name)
    }

    /// Every channel, in creation order.
    pub fn channels(&self) -> &[NetworkChannel<C>] {
        &self.channels
    }

    /// Status snapshot of every channel, in creation order.
    pub fn status(&self) -> Vec<ChannelStatus> {
        self.channels.iter().map(NetworkChannel::status).collect()
    }

    pub fn on_connected(
        &self,
        f: impl Fn(&str, Option<&UserData>) + Send + Sync + 'static,
    ) -> ObserverId {
        self.events.on_connected(f)
    }

    pub fn on_closed(&self, f: impl Fn(&str) + Send + Sync + 'static) -> ObserverId {
        self.events.on_closed(f)
    }

    pub fn on_missed_heartbeat(&self, f: impl Fn(&str, u32) + Send + Sync + 'static) -> ObserverId {
        self.events.on_missed_heartbeat(f)
    }

    pub fn on_error(&self, f: impl Fn(&str, &NetworkError) + Send + Sync + 'static) -> ObserverId {
        self.events.on_error(f)
    }

    pub fn on_custom_error(
        &self,
        f: impl Fn(&str, &CustomErrorData) + Send + Sync + 'static,
    ) -> ObserverId {
        self.events.on_custom_error(f)
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.events.unsubscribe(id)
    }
}

impl<C: PacketCodec> Drop for NetworkManager<C> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
