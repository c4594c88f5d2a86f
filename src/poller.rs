//! Telemetry polling loop.
//!
//! While the session is connected the poller reads one frame per interval,
//! decodes it and publishes the reading. Empty reads, I/O errors and decode
//! failures only cost one cycle; they never stop the loop or touch the
//! session state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::DecodeError;
use crate::event::{Event, EventDispatcher};
use crate::protocol::FrameDecoder;
use crate::session::SessionState;
use crate::transport::Transport;
use crate::types::Reading;

/// Periodic reader for a connected transport.
pub struct Poller<T> {
    transport: Arc<T>,
    decoder: Arc<dyn FrameDecoder>,
    state: watch::Receiver<SessionState>,
    dispatcher: EventDispatcher,
    interval: Duration,
    buffer_size: usize,
}

impl<T: Transport> Poller<T> {
    /// Creates a poller over `transport`.
    ///
    /// The poller runs for as long as `state` reads [`SessionState::Connected`].
    #[must_use]
    pub fn new(
        transport: Arc<T>,
        decoder: Arc<dyn FrameDecoder>,
        state: watch::Receiver<SessionState>,
        dispatcher: EventDispatcher,
    ) -> Self {
        Self {
            transport,
            decoder,
            state,
            dispatcher,
            interval: crate::session::DEFAULT_POLL_INTERVAL,
            buffer_size: crate::session::DEFAULT_READ_BUFFER_SIZE,
        }
    }

    /// Sets the delay between reads.
    #[must_use]
    pub const fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Sets the maximum number of bytes taken per read.
    #[must_use]
    pub const fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// Spawns the loop on the current runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs the loop until the session leaves the connected state.
    pub async fn run(mut self) {
        let mut buf = vec![0u8; self.buffer_size.max(1)];
        tracing::debug!("poller started ({:?} interval)", self.interval);

        while self.is_connected() {
            // A state change abandons the in-flight read.
            let read = tokio::select! {
                biased;
                changed = self.state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                read = self.transport.read(&mut buf) => read,
            };

            match read {
                Ok(n) => self.handle_frame(&buf[..n]),
                Err(e) => tracing::debug!("transient read failure: {}", e),
            }

            tokio::select! {
                biased;
                changed = self.state.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                () = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::debug!("poller stopped");
    }

    fn is_connected(&mut self) -> bool {
        *self.state.borrow_and_update() == SessionState::Connected
    }

    fn handle_frame(&self, frame: &[u8]) {
        match self.decoder.decode(frame) {
            Ok(reading) => {
                self.deliver(reading);
            }
            Err(DecodeError::Empty) => tracing::trace!("empty read"),
            Err(e) => tracing::warn!("dropping frame: {}", e),
        }
    }

    /// Publishes `reading` unless the session has already left the connected state.
    ///
    /// The state is held while dispatching, so a reading can never be published
    /// after the disconnected transition.
    fn deliver(&self, reading: Reading) -> bool {
        let state = self.state.borrow();
        if *state != SessionState::Connected {
            tracing::debug!("discarding reading received after {}", *state);
            return false;
        }

        tracing::trace!("delivering reading from {}", reading.device_id);
        self.dispatcher.dispatch(Event::Reading(Box::new(reading)));
        true
    }
}
