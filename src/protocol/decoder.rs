//! Frame decoding for rescue telemetry.
//!
//! Each transport read yields one frame. The default wire format is a single
//! JSON object per frame:
//! ```text
//! {"device_id":"ESP32-1234","heart_rate":72,"temperature":36.9,
//!  "location":{"latitude":37.77,"longitude":-122.41,"altitude":null},
//!  "acceleration":{"x":0.01,"y":-0.02,"z":0.98}}
//! ```
//! Other formats plug in through [`FrameDecoder`].

use crate::error::DecodeError;
use crate::types::Reading;

/// Turns a raw frame into a [`Reading`].
///
/// Implementations must be pure: the same bytes always decode to the same
/// result and decoding has no side effects.
pub trait FrameDecoder: Send + Sync {
    /// Decodes a non-empty frame.
    fn decode_frame(&self, frame: &[u8]) -> Result<Reading, DecodeError>;

    /// Decodes a raw chunk from a single transport read.
    ///
    /// Empty chunks yield [`DecodeError::Empty`] without reaching
    /// [`decode_frame`](Self::decode_frame).
    fn decode(&self, raw: &[u8]) -> Result<Reading, DecodeError> {
        if raw.is_empty() {
            return Err(DecodeError::Empty);
        }
        self.decode_frame(raw)
    }
}

impl<F> FrameDecoder for F
where
    F: Fn(&[u8]) -> Result<Reading, DecodeError> + Send + Sync,
{
    fn decode_frame(&self, frame: &[u8]) -> Result<Reading, DecodeError> {
        self(frame)
    }
}

/// Decoder for JSON frames.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl JsonDecoder {
    /// Creates a new JSON decoder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl FrameDecoder for JsonDecoder {
    fn decode_frame(&self, frame: &[u8]) -> Result<Reading, DecodeError> {
        let payload = trim_padding(frame);
        if payload.is_empty() {
            return Err(DecodeError::malformed(frame, "frame contains only padding"));
        }

        serde_json::from_slice(payload).map_err(|e| DecodeError::malformed(frame, e.to_string()))
    }
}

/// Strips line terminators, whitespace and NUL padding around a frame.
fn trim_padding(frame: &[u8]) -> &[u8] {
    let is_padding = |b: &u8| b.is_ascii_whitespace() || *b == 0;
    let start = frame
        .iter()
        .position(|b| !is_padding(b))
        .unwrap_or(frame.len());
    let end = frame
        .iter()
        .rposition(|b| !is_padding(b))
        .map_or(start, |i| i + 1);
    &frame[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Acceleration, GpsLocation};

    const FRAME: &[u8] = br#"{"device_id":"ESP32-4821","heart_rate":72,"temperature":36.9,"location":{"latitude":37.7749,"longitude":-122.4194},"acceleration":{"x":0.5,"y":-0.25,"z":1.0}}"#;

    #[test]
    fn test_decode_empty() {
        let result = JsonDecoder::new().decode(&[]);
        assert!(matches!(result, Err(DecodeError::Empty)));
    }

    #[test]
    fn test_decode_json_frame() {
        let reading = JsonDecoder::new().decode(FRAME).unwrap();

        assert_eq!(reading.device_id, "ESP32-4821");
        assert_eq!(reading.heart_rate, 72);
        assert!((reading.temperature - 36.9).abs() < f32::EPSILON);
        assert_eq!(
            reading.location,
            GpsLocation {
                latitude: 37.7749,
                longitude: -122.4194,
                altitude: None,
            }
        );
        assert_eq!(
            reading.acceleration,
            Acceleration {
                x: 0.5,
                y: -0.25,
                z: 1.0
            }
        );
        assert_eq!(reading.timestamp, None);
    }

    #[test]
    fn test_decode_camel_case_with_padding() {
        let mut frame = br#"{"deviceId":"ESP32-1","heartRate":88,"temperature":37.5,"location":{"latitude":1.0,"longitude":2.0,"altitude":15.5},"acceleration":{"x":0,"y":0,"z":0},"timestamp":1700000000000}"#.to_vec();
        frame.extend_from_slice(b"\r\n\0\0");

        let reading = JsonDecoder::new().decode(&frame).unwrap();
        assert_eq!(reading.device_id, "ESP32-1");
        assert_eq!(reading.heart_rate, 88);
        assert_eq!(reading.location.altitude, Some(15.5));
        assert_eq!(reading.timestamp, Some(1_700_000_000_000));
    }

    #[test]
    fn test_decode_malformed_keeps_raw() {
        let raw = b"HR:72;T:36.9";
        let err = JsonDecoder::new().decode(raw).unwrap_err();

        assert!(matches!(err, DecodeError::Malformed { .. }));
        assert_eq!(err.raw(), Some(&raw[..]));
    }

    #[test]
    fn test_decode_padding_only_is_malformed() {
        let err = JsonDecoder::new().decode(b"\n\0").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { .. }));
    }

    #[test]
    fn test_decode_invalid_utf8_is_malformed() {
        let err = JsonDecoder::new().decode(&[0xff, 0xfe, 0x7b]).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed { .. }));
    }

    #[test]
    fn test_closure_decoder_gets_empty_check() {
        let decoder = |_: &[u8]| -> Result<Reading, DecodeError> {
            Err(DecodeError::malformed(b"x", "never called for empty input"))
        };
        assert!(matches!(decoder.decode(&[]), Err(DecodeError::Empty)));
        assert!(matches!(
            decoder.decode(b"x"),
            Err(DecodeError::Malformed { .. })
        ));
    }
}
