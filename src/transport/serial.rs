//! Serial transport implementation.
//!
//! On Linux an RFCOMM channel is exposed as a TTY once bound
//! (`rfcomm bind 0 <address> 1` creates `/dev/rfcomm0`). This module treats
//! those bindings as the bonded device list and talks to them through
//! `tokio-serial`.

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tokio_serial::{SerialPortBuilderExt, SerialPortType, SerialStream};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::transport::{Platform, Transport};
use crate::types::PairedDevice;

/// Default baud rate for RFCOMM TTYs.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default connection delay.
pub const DEFAULT_CONNECTION_DELAY: Duration = Duration::from_millis(300);

/// Default window for draining stale bytes after opening.
pub const DEFAULT_DRAIN_WINDOW: Duration = Duration::from_millis(500);

/// Configuration for the serial platform.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Named port bindings forming the bonded device list.
    pub bindings: Vec<PairedDevice>,
    /// Whether to also list USB and Bluetooth serial ports found on the system.
    pub discover_ports: bool,
    /// Baud rate.
    pub baud_rate: u32,
    /// Delay after opening before the port is used.
    pub connection_delay: Duration,
    /// How long to drain stale bytes after opening.
    pub drain_window: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            bindings: Vec::new(),
            discover_ports: false,
            baud_rate: DEFAULT_BAUD_RATE,
            connection_delay: DEFAULT_CONNECTION_DELAY,
            drain_window: DEFAULT_DRAIN_WINDOW,
        }
    }
}

impl SerialConfig {
    /// Creates a new serial configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a named port binding, e.g. `bind("ESP32-Sensor-7", "/dev/rfcomm0")`.
    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, port: impl Into<String>) -> Self {
        self.bindings.push(PairedDevice::new(name, port));
        self
    }

    /// Enables listing of system serial ports next to the bindings.
    #[must_use]
    pub const fn discover_ports(mut self, enabled: bool) -> Self {
        self.discover_ports = enabled;
        self
    }

    /// Sets the baud rate.
    #[must_use]
    pub const fn baud_rate(mut self, rate: u32) -> Self {
        self.baud_rate = rate;
        self
    }

    /// Sets the connection delay.
    #[must_use]
    pub const fn connection_delay(mut self, delay: Duration) -> Self {
        self.connection_delay = delay;
        self
    }

    /// Sets the stale byte drain window.
    #[must_use]
    pub const fn drain_window(mut self, window: Duration) -> Self {
        self.drain_window = window;
        self
    }
}

/// Platform backed by serial ports.
#[derive(Debug, Clone, Default)]
pub struct SerialPlatform {
    config: SerialConfig,
}

impl SerialPlatform {
    /// Creates a new serial platform.
    #[must_use]
    pub const fn new(config: SerialConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &SerialConfig {
        &self.config
    }
}

impl Platform for SerialPlatform {
    type Transport = SerialTransport;

    fn is_authorized(&self) -> bool {
        self.config
            .bindings
            .iter()
            .all(|binding| can_open(Path::new(&binding.address)))
    }

    fn bonded_devices(&self) -> io::Result<Vec<PairedDevice>> {
        let mut devices = self.config.bindings.clone();

        if self.config.discover_ports {
            for device in list_devices().map_err(io::Error::other)? {
                if !devices.iter().any(|d| d.address == device.address) {
                    devices.push(device);
                }
            }
        }

        Ok(devices)
    }

    fn cancel_discovery(&self) {
        tracing::trace!("serial platform has no discovery to cancel");
    }

    fn open<'a>(
        &'a self,
        device: &'a PairedDevice,
        service: Uuid,
    ) -> BoxFuture<'a, io::Result<SerialTransport>> {
        Box::pin(async move {
            tracing::info!("opening {} for service {}", device, service);

            let mut stream = tokio_serial::new(&device.address, self.config.baud_rate)
                .open_native_async()
                .map_err(serial_to_io)?;

            // Wait for device to be ready
            tokio::time::sleep(self.config.connection_delay).await;

            // Drain bytes the device queued before we connected
            let mut buf = [0u8; 1024];
            let mut total_drained = 0usize;
            let drain_deadline = tokio::time::Instant::now() + self.config.drain_window;
            while tokio::time::Instant::now() < drain_deadline {
                match tokio::time::timeout(Duration::from_millis(20), stream.read(&mut buf)).await {
                    Ok(Ok(n)) if n > 0 => total_drained += n,
                    _ => tokio::time::sleep(Duration::from_millis(10)).await,
                }
            }

            if total_drained > 0 {
                tracing::debug!("drained {} stale bytes from {}", total_drained, device.address);
            }

            Ok(SerialTransport::from_stream(stream, device.address.clone()))
        })
    }
}

/// Returns true unless the caller is refused read/write access to `path`.
///
/// Missing nodes count as accessible; they surface later as open failures.
#[cfg(unix)]
fn can_open(path: &Path) -> bool {
    use rustix::fs::{Access, access};

    match access(path, Access::READ_OK | Access::WRITE_OK) {
        Ok(()) => true,
        Err(e) => {
            let denied = io::Error::from(e).kind() == io::ErrorKind::PermissionDenied;
            if denied {
                tracing::debug!("no read/write access to {}", path.display());
            }
            !denied
        }
    }
}

#[cfg(not(unix))]
fn can_open(_path: &Path) -> bool {
    true
}

/// Converts a serial error, keeping the I/O kind when there is one.
fn serial_to_io(e: tokio_serial::Error) -> io::Error {
    match e.kind {
        tokio_serial::ErrorKind::Io(kind) => io::Error::new(kind, e.description),
        tokio_serial::ErrorKind::NoDevice => {
            io::Error::new(io::ErrorKind::NotFound, e.description)
        }
        _ => io::Error::other(e),
    }
}

/// Serial transport for an open RFCOMM port.
///
/// Uses split read/write halves so polling and sending do not block each other.
pub struct SerialTransport {
    port: String,
    reader: Mutex<Option<ReadHalf<SerialStream>>>,
    writer: Mutex<Option<WriteHalf<SerialStream>>>,
    open: AtomicBool,
}

impl SerialTransport {
    fn from_stream(stream: SerialStream, port: String) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            port,
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
            open: AtomicBool::new(true),
        }
    }

    /// Returns the port path.
    #[must_use]
    pub fn port(&self) -> &str {
        &self.port
    }
}

fn closed(what: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, format!("{what} already closed"))
}

impl Transport for SerialTransport {
    fn read<'a>(&'a self, buf: &'a mut [u8]) -> BoxFuture<'a, io::Result<usize>> {
        Box::pin(async move {
            let mut reader = self.reader.lock().await;
            let reader = reader.as_mut().ok_or_else(|| closed("input stream"))?;
            let n = reader.read(buf).await?;
            tracing::trace!("received {} bytes from {}", n, self.port);
            Ok(n)
        })
    }

    fn write<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            let mut writer = self.writer.lock().await;
            let writer = writer.as_mut().ok_or_else(|| closed("output stream"))?;
            tracing::trace!("sending {} bytes to {}", data.len(), self.port);
            writer.write_all(data).await?;
            writer.flush().await
        })
    }

    fn close_input(&self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(async move {
            self.reader
                .lock()
                .await
                .take()
                .map(drop)
                .ok_or_else(|| closed("input stream"))
        })
    }

    fn close_output(&self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(async move {
            let writer = self.writer.lock().await.take();
            match writer {
                Some(mut writer) => writer.shutdown().await,
                None => Err(closed("output stream")),
            }
        })
    }

    fn close(&self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(async move {
            if !self.open.swap(false, Ordering::SeqCst) {
                return Err(closed("port"));
            }

            // The port is released once both halves are gone.
            drop(self.reader.lock().await.take());
            drop(self.writer.lock().await.take());
            tracing::debug!("closed {}", self.port);
            Ok(())
        })
    }
}

/// Lists USB and Bluetooth serial ports as paired devices.
///
/// USB ports are named after their product string when available.
fn list_devices() -> Result<Vec<PairedDevice>> {
    let ports = tokio_serial::available_ports().map_err(Error::Serial)?;
    Ok(ports
        .into_iter()
        .filter_map(|port| match port.port_type {
            SerialPortType::UsbPort(info) => {
                let name = info.product.unwrap_or_else(|| port.port_name.clone());
                Some(PairedDevice::new(name, port.port_name))
            }
            SerialPortType::BluetoothPort => {
                Some(PairedDevice::new(port.port_name.clone(), port.port_name))
            }
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_config_defaults() {
        let config = SerialConfig::new();
        assert!(config.bindings.is_empty());
        assert!(!config.discover_ports);
        assert_eq!(config.baud_rate, DEFAULT_BAUD_RATE);
        assert_eq!(config.connection_delay, DEFAULT_CONNECTION_DELAY);
    }

    #[test]
    fn test_serial_config_builder() {
        let config = SerialConfig::new()
            .bind("ESP32-Sensor-7", "/dev/rfcomm0")
            .baud_rate(9600)
            .connection_delay(Duration::from_secs(1))
            .drain_window(Duration::ZERO);
        assert_eq!(
            config.bindings,
            vec![PairedDevice::new("ESP32-Sensor-7", "/dev/rfcomm0")]
        );
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.connection_delay, Duration::from_secs(1));
        assert_eq!(config.drain_window, Duration::ZERO);
    }

    #[test]
    fn test_bindings_are_bonded_devices() {
        let platform = SerialPlatform::new(
            SerialConfig::new()
                .bind("Pixel Buds", "/dev/rfcomm1")
                .bind("ESP32-Sensor-7", "/dev/rfcomm0"),
        );

        let devices = platform.bonded_devices().unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[1].address, "/dev/rfcomm0");
    }

    #[test]
    fn test_missing_binding_is_not_a_permission_problem() {
        let platform = SerialPlatform::new(
            SerialConfig::new().bind("ESP32", "/nonexistent/rfcomm-test-port"),
        );
        assert!(platform.is_authorized());
    }

    #[cfg(unix)]
    fn node(mode: u32) -> tempfile::NamedTempFile {
        use std::os::unix::fs::PermissionsExt;

        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::set_permissions(file.path(), std::fs::Permissions::from_mode(mode)).unwrap();
        file
    }

    #[cfg(unix)]
    fn opens_read_write(path: &Path) -> bool {
        std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .is_ok()
    }

    #[cfg(unix)]
    #[test]
    fn test_authorization_follows_caller_access() {
        // Root may open nodes whatever their mode, so compare with a real open.
        for mode in [0o600, 0o444, 0o000] {
            let file = node(mode);
            let platform = SerialPlatform::new(
                SerialConfig::new().bind("ESP32", file.path().to_string_lossy()),
            );
            assert_eq!(
                platform.is_authorized(),
                opens_read_write(file.path()),
                "mode {mode:o}"
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_writable_node_is_authorized() {
        let file = node(0o600);
        let platform = SerialPlatform::new(
            SerialConfig::new()
                .bind("Pixel Buds", "/nonexistent/rfcomm-test-port")
                .bind("ESP32", file.path().to_string_lossy()),
        );
        assert!(platform.is_authorized());
    }

    #[test]
    fn test_open_errors_keep_io_kind() {
        let denied = tokio_serial::Error::new(
            tokio_serial::ErrorKind::Io(io::ErrorKind::PermissionDenied),
            "Permission denied",
        );
        assert_eq!(serial_to_io(denied).kind(), io::ErrorKind::PermissionDenied);

        let missing = tokio_serial::Error::new(tokio_serial::ErrorKind::NoDevice, "no device");
        assert_eq!(serial_to_io(missing).kind(), io::ErrorKind::NotFound);

        let invalid =
            tokio_serial::Error::new(tokio_serial::ErrorKind::InvalidInput, "bad baud rate");
        assert_eq!(serial_to_io(invalid).kind(), io::ErrorKind::Other);
    }
}
