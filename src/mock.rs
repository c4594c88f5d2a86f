//! Mock platform and transport for testing.
//!
//! [`MockPlatform`] hands out a scripted [`MockTransport`]. Reads return
//! queued chunks in order and block while the queue is empty, which mimics a
//! quiet serial link. Every close and write is recorded so tests can check
//! session teardown.
//!
//! ```
//! use rescuelink::mock::MockPlatform;
//! use rescuelink::{DeviceSession, SessionState};
//!
//! #[tokio::main]
//! async fn main() {
//!     let platform = MockPlatform::with_devices(&["Pixel Buds", "ESP32-Sensor-7"]);
//!     let session = DeviceSession::new(platform);
//!
//!     let handle = session.connect("esp32").await.unwrap();
//!     assert_eq!(handle.device.name, "ESP32-Sensor-7");
//!     assert_eq!(session.state(), SessionState::Connected);
//!
//!     session.disconnect().await;
//! }
//! ```

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::sync::{Mutex, mpsc};
use uuid::Uuid;

use crate::transport::{Platform, Transport};
use crate::types::PairedDevice;

struct MockTransportInner {
    reads_tx: mpsc::UnboundedSender<io::Result<Bytes>>,
    reads_rx: Mutex<mpsc::UnboundedReceiver<io::Result<Bytes>>>,
    written: Mutex<Vec<Bytes>>,
    input_open: AtomicBool,
    output_open: AtomicBool,
    open: AtomicBool,
    fail_writes: AtomicBool,
    read_count: AtomicU32,
    reads_in_flight: AtomicU32,
    max_reads_in_flight: AtomicU32,
    input_closes: AtomicU32,
    output_closes: AtomicU32,
    closes: AtomicU32,
}

/// A scripted transport.
///
/// Clones share the same link, so a test can keep a handle while the session
/// owns another.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<MockTransportInner>,
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("open", &self.inner.open.load(Ordering::Relaxed))
            .field("read_count", &self.inner.read_count.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MockTransport {
    /// Creates an open transport with an empty read queue.
    #[must_use]
    pub fn new() -> Self {
        let (reads_tx, reads_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(MockTransportInner {
                reads_tx,
                reads_rx: Mutex::new(reads_rx),
                written: Mutex::new(Vec::new()),
                input_open: AtomicBool::new(true),
                output_open: AtomicBool::new(true),
                open: AtomicBool::new(true),
                fail_writes: AtomicBool::new(false),
                read_count: AtomicU32::new(0),
                reads_in_flight: AtomicU32::new(0),
                max_reads_in_flight: AtomicU32::new(0),
                input_closes: AtomicU32::new(0),
                output_closes: AtomicU32::new(0),
                closes: AtomicU32::new(0),
            }),
        }
    }

    /// Queues a chunk for a future read. An empty chunk reads as zero bytes.
    pub fn push_read(&self, chunk: &[u8]) {
        let _ = self.inner.reads_tx.send(Ok(Bytes::copy_from_slice(chunk)));
    }

    /// Queues a read failure.
    pub fn push_error(&self, kind: io::ErrorKind) {
        let _ = self
            .inner
            .reads_tx
            .send(Err(io::Error::new(kind, "mock read failure")));
    }

    /// Makes subsequent writes fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Returns everything written so far.
    pub async fn written(&self) -> Vec<Bytes> {
        self.inner.written.lock().await.clone()
    }

    /// Number of reads started.
    #[must_use]
    pub fn read_count(&self) -> u32 {
        self.inner.read_count.load(Ordering::SeqCst)
    }

    /// Highest number of reads that were in flight at the same time.
    #[must_use]
    pub fn max_concurrent_reads(&self) -> u32 {
        self.inner.max_reads_in_flight.load(Ordering::SeqCst)
    }

    /// Calls to `close_input`, `close_output` and `close`, in that order.
    #[must_use]
    pub fn close_calls(&self) -> (u32, u32, u32) {
        (
            self.inner.input_closes.load(Ordering::SeqCst),
            self.inner.output_closes.load(Ordering::SeqCst),
            self.inner.closes.load(Ordering::SeqCst),
        )
    }

    /// Returns true until `close` has been called.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::SeqCst)
    }

    /// Reopens all streams, as a fresh socket would be.
    fn reopen(&self) {
        self.inner.input_open.store(true, Ordering::SeqCst);
        self.inner.output_open.store(true, Ordering::SeqCst);
        self.inner.open.store(true, Ordering::SeqCst);
    }
}

/// Decrements the in-flight counter when a read finishes or is cancelled.
struct InFlight<'a>(&'a AtomicU32);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn close_flag(flag: &AtomicBool, counter: &AtomicU32, what: &str) -> io::Result<()> {
    counter.fetch_add(1, Ordering::SeqCst);
    if flag.swap(false, Ordering::SeqCst) {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::NotConnected,
            format!("{what} already closed"),
        ))
    }
}

impl Transport for MockTransport {
    fn read<'a>(&'a self, buf: &'a mut [u8]) -> BoxFuture<'a, io::Result<usize>> {
        Box::pin(async move {
            let inner = &self.inner;
            inner.read_count.fetch_add(1, Ordering::SeqCst);
            let in_flight = inner.reads_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            inner
                .max_reads_in_flight
                .fetch_max(in_flight, Ordering::SeqCst);
            let _guard = InFlight(&inner.reads_in_flight);

            if !inner.input_open.load(Ordering::SeqCst) {
                return Err(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "input stream closed",
                ));
            }

            let mut reads = inner.reads_rx.lock().await;
            match reads.recv().await {
                Some(Ok(chunk)) => {
                    let n = chunk.len().min(buf.len());
                    buf[..n].copy_from_slice(&chunk[..n]);
                    Ok(n)
                }
                Some(Err(e)) => Err(e),
                None => Err(io::ErrorKind::UnexpectedEof.into()),
            }
        })
    }

    fn write<'a>(&'a self, data: &'a [u8]) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            if self.inner.fail_writes.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure"));
            }
            if !self.inner.output_open.load(Ordering::SeqCst) {
                return Err(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "output stream closed",
                ));
            }
            self.inner
                .written
                .lock()
                .await
                .push(Bytes::copy_from_slice(data));
            Ok(())
        })
    }

    fn close_input(&self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(async move {
            close_flag(&self.inner.input_open, &self.inner.input_closes, "input stream")
        })
    }

    fn close_output(&self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(async move {
            close_flag(
                &self.inner.output_open,
                &self.inner.output_closes,
                "output stream",
            )
        })
    }

    fn close(&self) -> BoxFuture<'_, io::Result<()>> {
        Box::pin(async move { close_flag(&self.inner.open, &self.inner.closes, "socket") })
    }
}

/// A mock radio stack with a fixed bonded device list.
#[derive(Debug)]
pub struct MockPlatform {
    devices: Vec<PairedDevice>,
    transport: MockTransport,
    authorized: AtomicBool,
    fail_open: AtomicBool,
    /// Simulated open latency in milliseconds (0 = no delay).
    open_delay_ms: AtomicU64,
    open_count: AtomicU32,
    bonded_queries: AtomicU32,
    discovery_cancels: AtomicU32,
}

impl MockPlatform {
    /// Creates a platform with the given bonded devices.
    #[must_use]
    pub fn new(devices: Vec<PairedDevice>) -> Self {
        Self {
            devices,
            transport: MockTransport::new(),
            authorized: AtomicBool::new(true),
            fail_open: AtomicBool::new(false),
            open_delay_ms: AtomicU64::new(0),
            open_count: AtomicU32::new(0),
            bonded_queries: AtomicU32::new(0),
            discovery_cancels: AtomicU32::new(0),
        }
    }

    /// Creates a platform from device names, with generated addresses.
    #[must_use]
    pub fn with_devices(names: &[&str]) -> Self {
        let devices = names
            .iter()
            .enumerate()
            .map(|(i, name)| PairedDevice::new(*name, format!("00:00:00:00:00:{i:02X}")))
            .collect();
        Self::new(devices)
    }

    /// Returns a handle to the transport this platform opens.
    #[must_use]
    pub fn transport(&self) -> MockTransport {
        self.transport.clone()
    }

    /// Grants or revokes radio authorization.
    pub fn set_authorized(&self, authorized: bool) {
        self.authorized.store(authorized, Ordering::SeqCst);
    }

    /// Makes subsequent opens fail.
    pub fn set_fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Adds latency to every open.
    pub fn set_open_delay(&self, delay: Duration) {
        let ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self.open_delay_ms.store(ms, Ordering::SeqCst);
    }

    /// Number of open attempts.
    #[must_use]
    pub fn open_count(&self) -> u32 {
        self.open_count.load(Ordering::SeqCst)
    }

    /// Number of bonded device queries.
    #[must_use]
    pub fn bonded_queries(&self) -> u32 {
        self.bonded_queries.load(Ordering::SeqCst)
    }

    /// Number of discovery cancellations.
    #[must_use]
    pub fn discovery_cancels(&self) -> u32 {
        self.discovery_cancels.load(Ordering::SeqCst)
    }
}

impl Platform for MockPlatform {
    type Transport = MockTransport;

    fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::SeqCst)
    }

    fn bonded_devices(&self) -> io::Result<Vec<PairedDevice>> {
        self.bonded_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.devices.clone())
    }

    fn cancel_discovery(&self) {
        self.discovery_cancels.fetch_add(1, Ordering::SeqCst);
    }

    fn open<'a>(
        &'a self,
        device: &'a PairedDevice,
        service: Uuid,
    ) -> BoxFuture<'a, io::Result<MockTransport>> {
        Box::pin(async move {
            self.open_count.fetch_add(1, Ordering::SeqCst);
            tracing::debug!("mock open of {} for service {}", device, service);

            let delay = self.open_delay_ms.load(Ordering::SeqCst);
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            if self.fail_open.load(Ordering::SeqCst) {
                return Err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "mock open failure",
                ));
            }

            self.transport.reopen();
            Ok(self.transport.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reads_in_order() {
        let transport = MockTransport::new();
        transport.push_read(b"one");
        transport.push_error(io::ErrorKind::TimedOut);
        transport.push_read(b"two");

        let mut buf = [0u8; 8];
        assert_eq!(transport.read(&mut buf).await.unwrap(), 3);
        assert_eq!(&buf[..3], b"one");
        assert_eq!(
            transport.read(&mut buf).await.unwrap_err().kind(),
            io::ErrorKind::TimedOut
        );
        assert_eq!(transport.read(&mut buf).await.unwrap(), 3);
        assert_eq!(transport.read_count(), 3);
    }

    #[tokio::test]
    async fn test_repeated_close_errors() {
        let transport = MockTransport::new();
        assert!(transport.close().await.is_ok());
        assert!(transport.close().await.is_err());
        assert_eq!(transport.close_calls(), (0, 0, 2));
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn test_closed_input_fails_reads() {
        let transport = MockTransport::new();
        transport.close_input().await.unwrap();

        let mut buf = [0u8; 4];
        let err = transport.read(&mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotConnected);
    }
}
