//! Error types for the rescuelink library.

use bytes::Bytes;
use thiserror::Error;

/// The main error type for rescuelink operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Serial port error.
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connecting to the device failed.
    #[error("connect error: {0}")]
    Connect(#[from] ConnectError),

    /// Sending a command failed.
    #[error("send error: {0}")]
    Send(#[from] SendError),

    /// A frame could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

/// Errors returned by [`DeviceSession::connect`](crate::DeviceSession::connect).
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The caller is not authorized to use the radio transport.
    #[error("permission denied for bluetooth transport")]
    PermissionDenied,

    /// No bonded device matched.
    #[error("no paired device matching {matcher:?}")]
    DeviceNotFound { matcher: String },

    /// A session is already connecting or connected.
    #[error("a session is already active")]
    AlreadyActive,

    /// Opening the transport failed.
    #[error("transport failure: {0}")]
    TransportFailure(#[source] std::io::Error),

    /// The attempt was cancelled by a concurrent disconnect.
    #[error("connect aborted by disconnect")]
    Aborted,
}

/// Errors returned by [`DeviceSession::send`](crate::DeviceSession::send).
#[derive(Debug, Error)]
pub enum SendError {
    /// The session is not connected.
    #[error("not connected")]
    NotConnected,

    /// Writing to the transport failed.
    #[error("transport failure: {0}")]
    TransportFailure(#[source] std::io::Error),
}

/// Frame decoding errors.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The read produced no bytes.
    #[error("empty frame")]
    Empty,

    /// The bytes do not form a valid frame.
    #[error("malformed frame ({reason}): {}", hex::encode(.raw))]
    Malformed { raw: Bytes, reason: String },
}

impl DecodeError {
    /// Creates a `Malformed` error carrying a copy of the raw bytes.
    pub fn malformed(raw: &[u8], reason: impl Into<String>) -> Self {
        Self::Malformed {
            raw: Bytes::copy_from_slice(raw),
            reason: reason.into(),
        }
    }

    /// Returns the raw bytes of a malformed frame.
    #[must_use]
    pub fn raw(&self) -> Option<&[u8]> {
        match self {
            Self::Empty => None,
            Self::Malformed { raw, .. } => Some(raw.as_ref()),
        }
    }
}

/// Result type alias for rescuelink operations.
pub type Result<T> = std::result::Result<T, Error>;
