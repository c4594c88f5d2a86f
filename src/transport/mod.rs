//! Transport layer for rescue device communication.
//!
//! A [`Platform`] knows which devices are bonded, whether the caller may use
//! the radio, and how to open a [`Transport`] to a device. The transport is
//! the byte stream itself.
//!
//! Implementations:
//! - [`serial`]: RFCOMM links bound to serial ports (e.g. `/dev/rfcomm0`)
//! - [`crate::mock`]: scripted links for tests

pub mod serial;

use std::io;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::types::PairedDevice;

/// Bidirectional byte stream to a remote device.
///
/// Reads and writes may run concurrently. Every close operation must be safe
/// to call more than once; repeated calls may return an error, which callers
/// log and ignore.
pub trait Transport: Send + Sync + 'static {
    /// Reads up to `buf.len()` bytes, returning the number read.
    fn read<'a>(&'a self, buf: &'a mut [u8]) -> BoxFuture<'a, io::Result<usize>>;

    /// Writes all of `data`.
    fn write<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, io::Result<()>>;

    /// Closes the input stream.
    fn close_input(&self) -> BoxFuture<'_, io::Result<()>>;

    /// Closes the output stream.
    fn close_output(&self) -> BoxFuture<'_, io::Result<()>>;

    /// Closes the underlying socket.
    fn close(&self) -> BoxFuture<'_, io::Result<()>>;
}

/// Access to the local radio stack.
pub trait Platform: Send + Sync + 'static {
    /// Transport produced by [`open`](Self::open).
    type Transport: Transport;

    /// Returns true if the caller may query and open the radio transport.
    fn is_authorized(&self) -> bool;

    /// Lists devices already bonded with the local adapter.
    fn bonded_devices(&self) -> io::Result<Vec<PairedDevice>>;

    /// Stops any device discovery in progress.
    fn cancel_discovery(&self);

    /// Opens a transport to `device` on the given service.
    fn open<'a>(
        &'a self,
        device: &'a PairedDevice,
        service: Uuid,
    ) -> BoxFuture<'a, io::Result<Self::Transport>>;
}

pub use serial::{SerialConfig, SerialPlatform, SerialTransport};
