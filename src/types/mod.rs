//! Data types for rescue telemetry.
//!
//! This module contains the core data structures used throughout the library:
//! - Paired devices
//! - Decoded readings

pub mod device;
pub mod reading;

pub use device::PairedDevice;
pub use reading::{Acceleration, GpsLocation, Reading};
