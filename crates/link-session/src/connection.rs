//! Open device connection
//!
//! Each open device is owned by a spawned I/O task, communicating with the
//! session actor via channels. The task pushes incoming bytes to the actor,
//! performs writes on request and acknowledges every write and close, so no
//! driver-level completion is ever dropped.
//!
//! Writes are queued without waiting: a device that stops draining fills the
//! queue and further writes fail as busy. A close preempts the write in
//! progress.
//!
//! A read returning EOF or a hard error means the device was removed. The
//! task then clears the shared open flag, which the liveness watchdog polls.

use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use link_detect::Peripheral;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::actor::Internal;
use crate::driver::{DeviceIo, PeripheralConfig};
use crate::error::DriverError;
use crate::periodic::PeriodicTask;

/// Write request queued to the device I/O task
///
/// The task writes and flushes `data`, replying with the byte count.
#[derive(Debug)]
struct WriteRequest {
    data: Vec<u8>,
    reply: oneshot::Sender<Result<usize, DriverError>>,
}

/// Completion of a queued write
pub type WriteAck = oneshot::Receiver<Result<usize, DriverError>>;

/// Peripheral and line settings of the last successful connect
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectTarget {
    pub peripheral: Peripheral,
    pub config: PeripheralConfig,
}

/// Handle to the device I/O task of one open connection
#[derive(Debug)]
pub struct Connection {
    id: u64,
    target: ConnectTarget,
    open: Arc<AtomicBool>,
    write_tx: mpsc::Sender<WriteRequest>,
    closing: CancellationToken,
    released: oneshot::Receiver<Result<(), DriverError>>,
    task: JoinHandle<()>,
}

impl Connection {
    /// Take ownership of an opened device and start its I/O task
    pub(crate) fn spawn(
        id: u64,
        target: ConnectTarget,
        io: Box<dyn DeviceIo>,
        internal_tx: mpsc::UnboundedSender<Internal>,
        read_buffer_size: usize,
        write_queue: usize,
    ) -> Self {
        let open = Arc::new(AtomicBool::new(true));
        let (write_tx, write_rx) = mpsc::channel(write_queue.max(1));
        let (released_tx, released) = oneshot::channel();
        let closing = CancellationToken::new();

        let task = tokio::spawn(run_device_io(
            DeviceIoTask {
                id,
                path: target.peripheral.id.clone(),
                open: open.clone(),
                closing: closing.clone(),
                internal_tx,
                released: released_tx,
            },
            io,
            write_rx,
            read_buffer_size,
        ));

        Self {
            id,
            target,
            open,
            write_tx,
            closing,
            released,
            task,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &str {
        self.target.peripheral.path()
    }

    /// Whether the device is still attached
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Shared open flag, polled by the liveness watchdog
    pub fn open_flag(&self) -> Arc<AtomicBool> {
        self.open.clone()
    }

    /// Queue a write; the receiver resolves once the device acknowledged it
    ///
    /// Fails with `Busy` when the write queue is full and `Closed` once the
    /// I/O task has ended.
    pub fn write(&self, data: Vec<u8>) -> Result<WriteAck, DriverError> {
        let (reply, rx) = oneshot::channel();
        match self.write_tx.try_send(WriteRequest { data, reply }) {
            Ok(()) => Ok(rx),
            Err(TrySendError::Full(_)) => {
                debug!("Write queue for {} is full", self.path());
                Err(DriverError::Busy)
            }
            Err(TrySendError::Closed(_)) => Err(DriverError::Closed),
        }
    }

    /// Close the device and wait until the I/O task has released it
    ///
    /// Queued writes that have not started are failed.
    pub async fn close(self, timeout: Duration) -> Result<(), DriverError> {
        let Self {
            target,
            open,
            closing,
            released,
            task,
            ..
        } = self;
        open.store(false, Ordering::SeqCst);
        closing.cancel();

        match tokio::time::timeout(timeout, released).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Ok(()),
            Err(_) => {
                warn!(
                    "Device task for {} did not acknowledge close",
                    target.peripheral.path()
                );
                task.abort();
                Err(DriverError::CloseTimeout)
            }
        }
    }
}

/// Spawn the liveness watchdog for connection `id`
///
/// Reports `Unplugged` once when the open flag drops, then stops itself.
pub(crate) fn spawn_watchdog(
    id: u64,
    open: Arc<AtomicBool>,
    period: Duration,
    internal_tx: mpsc::UnboundedSender<Internal>,
) -> PeriodicTask {
    PeriodicTask::spawn("watchdog", period, move || {
        let alive = open.load(Ordering::SeqCst);
        let internal_tx = internal_tx.clone();
        async move {
            if !alive {
                debug!("Watchdog saw connection {} close", id);
                let _ = internal_tx.send(Internal::Unplugged { connection: id });
            }
            alive
        }
    })
}

/// Identity and signalling of one device I/O task
struct DeviceIoTask {
    id: u64,
    path: String,
    open: Arc<AtomicBool>,
    closing: CancellationToken,
    internal_tx: mpsc::UnboundedSender<Internal>,
    released: oneshot::Sender<Result<(), DriverError>>,
}

/// Device I/O loop - runs until the device goes away or a close is requested
async fn run_device_io(
    task: DeviceIoTask,
    mut io: Box<dyn DeviceIo>,
    mut write_rx: mpsc::Receiver<WriteRequest>,
    read_buffer_size: usize,
) {
    let DeviceIoTask {
        id,
        path,
        open,
        closing,
        internal_tx,
        released,
    } = task;
    info!("Starting device I/O for {} (connection {})", path, id);
    let mut buffer = vec![0u8; read_buffer_size.max(1)];
    let mut close_result = Ok(());

    loop {
        tokio::select! {
            biased;

            _ = closing.cancelled() => {
                close_result = io.shutdown().await.map_err(DriverError::from);
                break;
            }

            request = write_rx.recv() => {
                let Some(WriteRequest { data, reply }) = request else {
                    debug!("Connection handle for {} dropped", path);
                    break;
                };
                let result = tokio::select! {
                    result = write_all(&mut io, &data) => result.map(|()| data.len()),
                    _ = closing.cancelled() => Err(DriverError::Closed),
                };
                if let Err(e) = &result {
                    warn!("Write error on {}: {}", path, e);
                }
                let _ = reply.send(result);
            }

            result = io.read(&mut buffer) => {
                match result {
                    Ok(0) => {
                        info!("Device {} reached end of stream", path);
                        break;
                    }
                    Ok(n) => {
                        debug!("Read {} bytes from {}: {:02X?}", n, path, &buffer[..n.min(64)]);
                        let _ = internal_tx.send(Internal::DeviceData {
                            connection: id,
                            data: buffer[..n].to_vec(),
                        });
                    }
                    Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
                    Err(e) => {
                        warn!("Read error on {}: {}", path, e);
                        break;
                    }
                }
            }
        }
    }

    // Release the device before anyone learns it is closed
    drop(io);
    drop(write_rx);
    open.store(false, Ordering::SeqCst);

    let _ = released.send(close_result);
    info!("Device I/O ended for {} (connection {})", path, id);
}

async fn write_all(io: &mut Box<dyn DeviceIo>, data: &[u8]) -> Result<(), DriverError> {
    io.write_all(data).await?;
    io.flush().await?;
    Ok(())
}
