use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tickwire_channel::{ChannelConfig, NetworkChannel, NetworkError, NetworkManager};
use tickwire_frame::LengthPrefixedCodec;
use tickwire_transport::NetSocket;

use crate::exit::{channel_error, manager_error, network_error, CliError, CliResult, TIMEOUT};

/// Pause between ticks while a command waits on the channel.
pub const TICK: Duration = Duration::from_millis(10);

pub type Channel = NetworkChannel<LengthPrefixedCodec>;

/// One managed channel plus the clock that feeds its ticks.
///
/// Errors are observed rather than returned by the channel, so a fault ends
/// the current wait with the first error seen.
pub struct Session {
    manager: NetworkManager<LengthPrefixedCodec>,
    channel: Channel,
    fault: Arc<Mutex<Option<NetworkError>>>,
    last_tick: Instant,
}

impl Session {
    pub fn new(name: &str, config: ChannelConfig) -> CliResult<Self> {
        let mut manager = NetworkManager::new();
        let codec = LengthPrefixedCodec::new().with_max_payload(config.max_packet_length);
        let channel = manager
            .create_channel_with_config(name, codec, config)
            .map_err(|err| manager_error("channel setup failed", err))?;

        let fault = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&fault);
        manager.on_error(move |channel, err| {
            tracing::warn!(channel, code = %err.code, error = %err.message, "channel error");
            let mut first = slot.lock().unwrap_or_else(PoisonError::into_inner);
            if first.is_none() {
                *first = Some(err.clone());
            }
        });
        manager.on_missed_heartbeat(|channel, count| {
            tracing::warn!(channel, count, "missed heartbeat");
        });

        Ok(Self {
            manager,
            channel,
            fault,
            last_tick: Instant::now(),
        })
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    pub fn connect(&mut self, addr: SocketAddr) -> CliResult<()> {
        self.channel
            .connect_addr(addr, None)
            .map_err(|err| channel_error("connect failed", err))?;
        self.take_fault("connect failed")
    }

    pub fn attach(&mut self, socket: NetSocket) -> CliResult<()> {
        self.channel
            .attach(socket, None)
            .map_err(|err| channel_error("attach failed", err))?;
        self.take_fault("attach failed")
    }

    /// Run one tick with the real time elapsed since the previous one.
    pub fn tick(&mut self, context: &str) -> CliResult<()> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_tick);
        self.last_tick = now;
        self.manager
            .update(elapsed)
            .map_err(|err| manager_error(context, err))?;
        self.take_fault(context)
    }

    /// Tick until `done` holds. With a timeout, gives up with exit code 124.
    pub fn run_until(
        &mut self,
        context: &str,
        timeout: Option<Duration>,
        mut done: impl FnMut(&Channel) -> bool,
    ) -> CliResult<()> {
        let start = Instant::now();
        loop {
            self.tick(context)?;
            if done(&self.channel) {
                return Ok(());
            }
            if let Some(timeout) = timeout {
                if start.elapsed() >= timeout {
                    return Err(CliError::new(
                        TIMEOUT,
                        format!("{context}: timed out after {timeout:?}"),
                    ));
                }
            }
            thread::sleep(TICK);
        }
    }

    pub fn close(&mut self) {
        self.channel.close();
        self.fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn take_fault(&self, context: &str) -> CliResult<()> {
        let fault = self
            .fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match fault {
            Some(err) => Err(network_error(context, &err)),
            None => Ok(()),
        }
    }
}
