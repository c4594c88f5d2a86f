//! Simulated decoder for dashboard demos.
//!
//! Ignores the content of each frame and fabricates a plausible reading.
//! Useful for driving a UI against firmware that only sends heartbeats.
//! Never use it where readings matter.

use rand::Rng;

use crate::error::DecodeError;
use crate::protocol::FrameDecoder;
use crate::types::{Acceleration, GpsLocation, Reading};

/// Latitude the simulated location drifts around.
const BASE_LATITUDE: f64 = 37.7749;

/// Longitude the simulated location drifts around.
const BASE_LONGITUDE: f64 = -122.4194;

/// Decoder that fabricates readings for any non-empty frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedDecoder;

impl SimulatedDecoder {
    /// Creates a new simulated decoder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl FrameDecoder for SimulatedDecoder {
    fn decode_frame(&self, _frame: &[u8]) -> Result<Reading, DecodeError> {
        let mut rng = rand::rng();

        Ok(Reading {
            device_id: format!("ESP32-{}", rng.random_range(1000..10_000)),
            heart_rate: rng.random_range(60..100),
            temperature: rng.random_range(36.5..38.5),
            location: GpsLocation {
                latitude: BASE_LATITUDE + rng.random_range(-0.01..0.01),
                longitude: BASE_LONGITUDE + rng.random_range(-0.01..0.01),
                altitude: None,
            },
            acceleration: Acceleration {
                x: rng.random_range(-1.0..1.0),
                y: rng.random_range(-1.0..1.0),
                z: rng.random_range(-1.0..1.0),
            },
            timestamp: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_ranges() {
        let decoder = SimulatedDecoder::new();

        for _ in 0..100 {
            let reading = decoder.decode(b"ping").unwrap();
            assert!(reading.device_id.starts_with("ESP32-"));
            assert!((60..100).contains(&reading.heart_rate));
            assert!((36.5..38.5).contains(&reading.temperature));
            assert!((reading.location.latitude - BASE_LATITUDE).abs() <= 0.01);
            assert!(reading.acceleration.x.abs() <= 1.0);
        }
    }

    #[test]
    fn test_simulated_empty_frame() {
        assert!(matches!(
            SimulatedDecoder::new().decode(&[]),
            Err(DecodeError::Empty)
        ));
    }
}
