//! Virtual serial device
//!
//! Each open virtual port is an in-memory duplex stream. The host end is
//! handed to the session as its device stream; the device end is owned by a
//! small task that records what the host writes, optionally echoes it back,
//! and pushes bytes to the host on request. Dropping the device end makes the
//! host observe end of stream, which is how an unplug looks to the session.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use link_detect::{SerialPortInfo, UsbId};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Configuration for a virtual device on the bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualDeviceConfig {
    /// Device path reported by enumeration
    pub path: String,
    /// USB vendor id
    pub vid: u16,
    /// USB product id
    pub pid: u16,
    /// Echo every written byte back to the host
    #[serde(default)]
    pub loopback: bool,
    /// Product string reported by enumeration
    #[serde(default)]
    pub product: Option<String>,
}

impl VirtualDeviceConfig {
    pub fn new(path: impl Into<String>, id: UsbId) -> Self {
        Self {
            path: path.into(),
            vid: id.vid,
            pid: id.pid,
            loopback: false,
            product: None,
        }
    }

    pub fn with_loopback(mut self, loopback: bool) -> Self {
        self.loopback = loopback;
        self
    }

    /// Enumeration entry for this device
    pub fn port_info(&self) -> SerialPortInfo {
        let mut info = SerialPortInfo::usb(self.path.clone(), UsbId::new(self.vid, self.pid));
        info.product = self.product.clone();
        info
    }
}

/// Commands sent to a virtual device task
#[derive(Debug)]
pub(crate) enum DeviceCommand {
    /// Push bytes to the host
    Send(Vec<u8>),
    /// Drop the device end, as if the cable was pulled
    Unplug,
}

/// Host side of an open virtual port
///
/// Dropping it marks the port closed, so the bus sees the release the moment
/// the session lets go of the stream.
#[derive(Debug)]
pub struct HostEnd {
    stream: DuplexStream,
    open: Arc<AtomicBool>,
}

impl HostEnd {
    pub(crate) fn new(stream: DuplexStream, open: Arc<AtomicBool>) -> Self {
        Self { stream, open }
    }
}

impl Drop for HostEnd {
    fn drop(&mut self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

impl AsyncRead for HostEnd {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for HostEnd {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }
}

/// Run the device end of a virtual port until unplugged or released
pub(crate) async fn run_virtual_device(
    path: String,
    mut stream: DuplexStream,
    mut cmd_rx: mpsc::UnboundedReceiver<DeviceCommand>,
    received: Arc<Mutex<Vec<u8>>>,
    loopback: bool,
) {
    let mut buf = [0u8; 1024];
    info!("Virtual device {} opened", path);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(DeviceCommand::Send(data)) => {
                        debug!("Virtual device {} sending {} bytes", path, data.len());
                        if let Err(e) = stream.write_all(&data).await {
                            warn!("Virtual device {} write failed: {}", path, e);
                            break;
                        }
                    }
                    Some(DeviceCommand::Unplug) | None => {
                        info!("Virtual device {} unplugged", path);
                        break;
                    }
                }
            }

            result = stream.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        debug!("Host released virtual device {}", path);
                        break;
                    }
                    Ok(n) => {
                        let data = &buf[..n];
                        debug!("Virtual device {} received {:02X?}", path, data);
                        received
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .extend_from_slice(data);
                        if loopback {
                            if let Err(e) = stream.write_all(data).await {
                                warn!("Virtual device {} echo failed: {}", path, e);
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        warn!("Virtual device {} read failed: {}", path, e);
                        break;
                    }
                }
            }
        }
    }
}
