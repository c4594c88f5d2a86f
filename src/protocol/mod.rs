//! Protocol definitions for rescue device communication.
//!
//! This module contains:
//! - Service and command constants
//! - Frame decoding into readings

pub mod decoder;
#[cfg(feature = "simulate")]
pub mod simulated;

use uuid::Uuid;

pub use decoder::{FrameDecoder, JsonDecoder};
#[cfg(feature = "simulate")]
pub use simulated::SimulatedDecoder;

/// Well-known Serial Port Profile service UUID.
pub const SPP_UUID: Uuid = Uuid::from_u128(0x0000_1101_0000_1000_8000_0080_5f9b_34fb);

/// Command asking the device to push its emergency data.
pub const EMERGENCY_COMMAND: &[u8] = b"SEND_EMERGENCY_DATA";

/// Default substring used to find the rescue device among paired devices.
pub const DEFAULT_DEVICE_MATCHER: &str = "ESP32";
