//! Decoded telemetry readings.

use serde::{Deserialize, Serialize};

/// GPS position of the device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsLocation {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Altitude in meters, if the fix has one.
    #[serde(default)]
    pub altitude: Option<f64>,
}

/// Accelerometer vector in G.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Acceleration {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// A telemetry sample from the rescue device.
///
/// Readings are immutable once decoded. The heart rate range is advisory;
/// values are passed through as reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Identifier reported by the device.
    #[serde(alias = "deviceId")]
    pub device_id: String,
    /// Heart rate in beats per minute.
    #[serde(alias = "heartRate")]
    pub heart_rate: i32,
    /// Body temperature in degrees Celsius.
    pub temperature: f32,
    /// GPS location.
    pub location: GpsLocation,
    /// Accelerometer vector.
    pub acceleration: Acceleration,
    /// Device timestamp in milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: Option<u64>,
}
