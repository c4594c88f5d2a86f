//! Device session management.
//!
//! [`DeviceSession`] owns the single link to the rescue device. It resolves
//! the device among the bonded ones, opens the transport, runs the telemetry
//! [`Poller`] while connected and tears everything down on disconnect.
//!
//! ```text
//! Disconnected --connect()--> Connecting --ok--> Connected
//!       ^                         |                  |
//!       +--------failure----------+                  |
//!       +----------------disconnect()----------------+
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{ConnectError, SendError};
use crate::event::{Event, EventDispatcher, Subscription};
use crate::poller::Poller;
use crate::protocol::{EMERGENCY_COMMAND, FrameDecoder, JsonDecoder, SPP_UUID};
use crate::transport::{Platform, SerialConfig, SerialPlatform, Transport};
use crate::types::PairedDevice;
use crate::types::device::find_device;

/// Default delay between telemetry reads.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default maximum number of bytes taken per read.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 1024;

/// Default event channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

impl SessionState {
    /// Returns a display label for the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for a device session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Delay between telemetry reads.
    pub poll_interval: Duration,
    /// Maximum number of bytes taken per read.
    pub read_buffer_size: usize,
    /// Service to open on the remote device.
    pub service_uuid: Uuid,
    /// Capacity of the event channel.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            service_uuid: SPP_UUID,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl SessionConfig {
    /// Creates a new session configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the poll interval.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the read buffer size.
    #[must_use]
    pub const fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Sets the service UUID.
    #[must_use]
    pub const fn service_uuid(mut self, uuid: Uuid) -> Self {
        self.service_uuid = uuid;
        self
    }

    /// Sets the event channel capacity.
    #[must_use]
    pub const fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }
}

/// Describes an established session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    /// The device the session is connected to.
    pub device: PairedDevice,
    /// The service opened on the device.
    pub service: Uuid,
}

/// Everything owned while connected.
struct Link<T> {
    transport: Arc<T>,
    device: PairedDevice,
    poller: JoinHandle<()>,
}

/// Session with a single rescue device.
///
/// All operations take `&self`; share the session behind an `Arc` to call
/// them from several tasks.
pub struct DeviceSession<P: Platform> {
    platform: P,
    config: SessionConfig,
    decoder: Arc<dyn FrameDecoder>,
    dispatcher: EventDispatcher,
    state: watch::Sender<SessionState>,
    // Bumped on every connect attempt and disconnect, under the state lock.
    epoch: AtomicU64,
    // Held from the claim until the attempt has released its transport.
    attempt_in_flight: AtomicBool,
    link: Mutex<Option<Link<P::Transport>>>,
}

impl DeviceSession<SerialPlatform> {
    /// Creates a session over RFCOMM-bound serial ports.
    #[must_use]
    pub fn serial(config: SerialConfig) -> Self {
        Self::new(SerialPlatform::new(config))
    }
}

impl<P: Platform> DeviceSession<P> {
    /// Creates a session with default configuration and the JSON decoder.
    #[must_use]
    pub fn new(platform: P) -> Self {
        Self::with_config(platform, SessionConfig::default())
    }

    /// Creates a session with custom configuration.
    #[must_use]
    pub fn with_config(platform: P, config: SessionConfig) -> Self {
        let dispatcher = EventDispatcher::new(config.event_capacity.max(1));
        let (state, _) = watch::channel(SessionState::Disconnected);

        Self {
            platform,
            config,
            decoder: Arc::new(JsonDecoder::new()),
            dispatcher,
            state,
            epoch: AtomicU64::new(0),
            attempt_in_flight: AtomicBool::new(false),
            link: Mutex::new(None),
        }
    }

    /// Replaces the frame decoder used by subsequent connections.
    #[must_use]
    pub fn with_decoder(mut self, decoder: impl FrameDecoder + 'static) -> Self {
        self.decoder = Arc::new(decoder);
        self
    }

    /// Returns the platform.
    #[must_use]
    pub const fn platform(&self) -> &P {
        &self.platform
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Returns true if connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Returns a receiver that tracks the current state.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Subscribes to state changes and readings.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        self.dispatcher.subscribe()
    }

    /// Returns the connected device, if any.
    pub async fn device(&self) -> Option<PairedDevice> {
        self.link.lock().await.as_ref().map(|link| link.device.clone())
    }

    /// Connects to the first bonded device whose name contains `matcher`.
    ///
    /// This will:
    /// 1. Claim the session (moving to `Connecting`)
    /// 2. Check radio authorization
    /// 3. Resolve the device among bonded devices
    /// 4. Cancel discovery and open the transport
    /// 5. Move to `Connected` and start polling
    ///
    /// On failure the session returns to `Disconnected`. An attempt cancelled
    /// by [`disconnect`](Self::disconnect) keeps further connects refused with
    /// `AlreadyActive` until it has closed the transport it opened.
    pub async fn connect(&self, matcher: &str) -> Result<SessionHandle, ConnectError> {
        let mut attempt = None;
        self.state.send_if_modified(|state| {
            if *state != SessionState::Disconnected
                || self.attempt_in_flight.swap(true, Ordering::SeqCst)
            {
                return false;
            }
            attempt = Some(self.epoch.fetch_add(1, Ordering::SeqCst) + 1);
            self.publish(state, SessionState::Connecting);
            true
        });
        let Some(attempt) = attempt else {
            return Err(ConnectError::AlreadyActive);
        };
        let _in_flight = InFlight(&self.attempt_in_flight);

        match self.establish(matcher, attempt).await {
            Ok(handle) => Ok(handle),
            Err(e) => {
                tracing::warn!("connect failed: {}", e);
                self.transition(attempt, SessionState::Connecting, SessionState::Disconnected);
                Err(e)
            }
        }
    }

    async fn establish(&self, matcher: &str, attempt: u64) -> Result<SessionHandle, ConnectError> {
        if !self.platform.is_authorized() {
            return Err(ConnectError::PermissionDenied);
        }

        let devices = self
            .platform
            .bonded_devices()
            .map_err(ConnectError::TransportFailure)?;
        let device = find_device(&devices, matcher)
            .cloned()
            .ok_or_else(|| ConnectError::DeviceNotFound {
                matcher: matcher.to_string(),
            })?;

        tracing::info!("connecting to {}", device);

        // Discovery and an open connection must not overlap
        self.platform.cancel_discovery();

        let service = self.config.service_uuid;
        let transport = self
            .platform
            .open(&device, service)
            .await
            .map_err(ConnectError::TransportFailure)?;
        let transport = Arc::new(transport);

        let mut link = self.link.lock().await;
        if !self.transition(attempt, SessionState::Connecting, SessionState::Connected) {
            drop(link);
            tracing::info!("connect to {} aborted, closing transport", device);
            close_transport(transport.as_ref()).await;
            return Err(ConnectError::Aborted);
        }

        let poller = Poller::new(
            Arc::clone(&transport),
            Arc::clone(&self.decoder),
            self.state.subscribe(),
            self.dispatcher.clone(),
        )
        .interval(self.config.poll_interval)
        .buffer_size(self.config.read_buffer_size)
        .spawn();

        *link = Some(Link {
            transport,
            device: device.clone(),
            poller,
        });

        tracing::info!("connected to {}", device);
        Ok(SessionHandle { device, service })
    }

    /// Writes `command` to the device.
    ///
    /// Fails fast with `NotConnected` unless the session is connected. A write
    /// failure leaves the session connected.
    pub async fn send(&self, command: &[u8]) -> Result<(), SendError> {
        if !self.is_connected() {
            return Err(SendError::NotConnected);
        }

        let transport = self
            .link
            .lock()
            .await
            .as_ref()
            .map(|link| Arc::clone(&link.transport))
            .ok_or(SendError::NotConnected)?;

        tracing::debug!("sending {} byte command", command.len());
        transport
            .write(command)
            .await
            .map_err(SendError::TransportFailure)
    }

    /// Asks the device to push its emergency data.
    pub async fn send_emergency_signal(&self) -> Result<(), SendError> {
        self.send(EMERGENCY_COMMAND).await
    }

    /// Disconnects from the device.
    ///
    /// Closes the input stream, the output stream and the socket in that
    /// order; close failures are logged and do not stop the remaining steps.
    /// Calling this while already disconnected does nothing.
    pub async fn disconnect(&self) {
        let mut slot = self.link.lock().await;

        let was_active = self.state.send_if_modified(|state| {
            if *state == SessionState::Disconnected {
                return false;
            }
            self.epoch.fetch_add(1, Ordering::SeqCst);
            self.publish(state, SessionState::Disconnected);
            true
        });

        let Some(link) = slot.take() else {
            if was_active {
                tracing::info!("connect attempt cancelled");
            }
            return;
        };

        tracing::info!("disconnecting from {}", link.device);
        self.stop_poller(link.poller).await;
        close_transport(link.transport.as_ref()).await;
        tracing::info!("disconnected from {}", link.device);
    }

    /// Waits up to one poll interval for the poller to notice the state change.
    async fn stop_poller(&self, mut poller: JoinHandle<()>) {
        match tokio::time::timeout(self.config.poll_interval, &mut poller).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("poller task failed: {}", e),
            Err(_) => {
                tracing::warn!("poller did not stop in time, aborting");
                poller.abort();
            }
        }
    }

    /// Moves `from` to `to` if the state and attempt are still current.
    fn transition(&self, attempt: u64, from: SessionState, to: SessionState) -> bool {
        self.state.send_if_modified(|state| {
            if *state != from || self.epoch.load(Ordering::SeqCst) != attempt {
                return false;
            }
            self.publish(state, to);
            true
        })
    }

    /// Sets the state and notifies subscribers. Runs under the state lock.
    fn publish(&self, state: &mut SessionState, to: SessionState) {
        tracing::debug!("session state {} -> {}", *state, to);
        *state = to;
        self.dispatcher.dispatch(Event::StateChanged(to));
    }
}

/// Clears the in-flight flag when a connect attempt ends, even if it is dropped.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Closes every part of the transport, logging failures.
async fn close_transport<T: Transport>(transport: &T) {
    if let Err(e) = transport.close_input().await {
        tracing::debug!("closing input stream failed: {}", e);
    }
    if let Err(e) = transport.close_output().await {
        tracing::debug!("closing output stream failed: {}", e);
    }
    if let Err(e) = transport.close().await {
        tracing::debug!("closing transport failed: {}", e);
    }
}

impl<P: Platform> Drop for DeviceSession<P> {
    fn drop(&mut self) {
        // Abort background tasks
        if let Some(link) = self.link.get_mut().take() {
            link.poller.abort();
        }
    }
}
