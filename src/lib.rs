//! # rescuelink
//!
//! A Rust client library for rescue telemetry devices.
//!
//! This library connects to a paired sensor board (typically an ESP32) over a
//! Bluetooth serial link, polls it for telemetry frames and publishes decoded
//! readings to observers.
//!
//! ## Features
//!
//! - Async/await based API using Tokio
//! - Single-device session with an explicit state machine
//! - Periodic polling that tolerates a noisy link
//! - Pluggable frame decoding (JSON by default)
//! - Event stream and callback observers for UI layers
//!
//! ## Quick Start
//!
//! ```no_run
//! use rescuelink::{DeviceSession, Event, SerialConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), rescuelink::Error> {
//!     // `rfcomm bind 0 <address> 1` exposes the device as /dev/rfcomm0
//!     let config = SerialConfig::new().bind("ESP32-Sensor-7", "/dev/rfcomm0");
//!     let session = DeviceSession::serial(config);
//!     let mut events = session.subscribe();
//!
//!     let handle = session.connect("esp32").await?;
//!     println!("Connected to: {}", handle.device);
//!
//!     session.send_emergency_signal().await?;
//!
//!     while let Some(event) = events.recv().await {
//!         if let Event::Reading(reading) = event {
//!             println!("Heart rate: {} bpm", reading.heart_rate);
//!             break;
//!         }
//!     }
//!
//!     session.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`protocol`] - Service constants and frame decoders
//! - [`types`] - Data structures (paired devices, readings)
//! - [`transport`] - Platform and transport traits, serial implementation
//! - [`event`] - Event stream and observer callbacks
//! - [`poller`] - Telemetry polling loop
//! - [`session`] - High-level [`DeviceSession`]
//! - [`mock`] - Scripted platform for tests

pub mod error;
pub mod event;
pub mod mock;
pub mod poller;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use error::{ConnectError, DecodeError, Error, Result, SendError};
pub use event::{Event, EventDispatcher, SessionObserver, Subscription, spawn_observer};
pub use poller::Poller;
pub use protocol::{
    DEFAULT_DEVICE_MATCHER, EMERGENCY_COMMAND, FrameDecoder, JsonDecoder, SPP_UUID,
};
#[cfg(feature = "simulate")]
pub use protocol::SimulatedDecoder;
pub use session::{DeviceSession, SessionConfig, SessionHandle, SessionState};
pub use transport::{Platform, SerialConfig, SerialPlatform, SerialTransport, Transport};
pub use types::{Acceleration, GpsLocation, PairedDevice, Reading};
