//! Virtual serial bus
//!
//! The bus stands in for both the operating system's port enumeration and
//! the serial driver. Devices can be attached and unplugged at any time, and
//! ports open exclusively, as real serial ports do.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use link_detect::{DetectError, PortEnumerator, SerialPortInfo, UsbId};
use link_session::{DeviceIo, DriverError, PeripheralConfig, SerialDriver};
use tokio::io::duplex;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::device::{run_virtual_device, DeviceCommand, HostEnd, VirtualDeviceConfig};

/// Size of the in-memory pipe behind each open port
const PIPE_SIZE: usize = 4096;

#[derive(Debug)]
struct OpenLink {
    open: Arc<AtomicBool>,
    cmd_tx: mpsc::UnboundedSender<DeviceCommand>,
}

impl OpenLink {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct VirtualPort {
    config: VirtualDeviceConfig,
    link: Option<OpenLink>,
    opens: usize,
    last_config: Option<PeripheralConfig>,
    received: Arc<Mutex<Vec<u8>>>,
}

impl VirtualPort {
    fn new(config: VirtualDeviceConfig) -> Self {
        Self {
            config,
            link: None,
            opens: 0,
            last_config: None,
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn is_open(&self) -> bool {
        self.link.as_ref().is_some_and(OpenLink::is_open)
    }
}

#[derive(Debug, Default)]
struct BusInner {
    ports: BTreeMap<String, VirtualPort>,
    open_failures: VecDeque<String>,
}

/// Shared virtual serial bus
#[derive(Debug, Clone, Default)]
pub struct VirtualBus {
    inner: Arc<Mutex<BusInner>>,
}

impl VirtualBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bus with the given devices already attached
    pub fn with_devices(devices: &[VirtualDeviceConfig]) -> Self {
        let bus = Self::new();
        for device in devices {
            bus.attach(device.clone());
        }
        bus
    }

    fn lock(&self) -> MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a device; replaces any device already at the same path
    pub fn attach(&self, config: VirtualDeviceConfig) {
        info!("Attaching virtual device {}", config.path);
        let path = config.path.clone();
        self.lock().ports.insert(path, VirtualPort::new(config));
    }

    /// Attach a plain USB device
    pub fn attach_usb(&self, path: &str, id: UsbId) {
        self.attach(VirtualDeviceConfig::new(path, id));
    }

    /// Attach a USB device echoing everything written to it
    pub fn attach_loopback(&self, path: &str, id: UsbId) {
        self.attach(VirtualDeviceConfig::new(path, id).with_loopback(true));
    }

    /// Pull the device out; an open session sees end of stream
    pub fn unplug(&self, path: &str) -> bool {
        let Some(port) = self.lock().ports.remove(path) else {
            return false;
        };
        info!("Unplugging virtual device {}", path);
        if let Some(link) = port.link {
            let _ = link.cmd_tx.send(DeviceCommand::Unplug);
        }
        true
    }

    /// Make the next open fail with `reason`
    pub fn fail_next_open(&self, reason: impl Into<String>) {
        self.lock().open_failures.push_back(reason.into());
    }

    /// Push bytes from the device to the host; `false` if the port is not open
    pub fn send_to_host(&self, path: &str, data: &[u8]) -> bool {
        let inner = self.lock();
        match inner.ports.get(path).and_then(|port| port.link.as_ref()) {
            Some(link) if link.is_open() => link.cmd_tx.send(DeviceCommand::Send(data.to_vec())).is_ok(),
            _ => false,
        }
    }

    /// Everything the host has written to the device so far
    pub fn received(&self, path: &str) -> Vec<u8> {
        let inner = self.lock();
        match inner.ports.get(path) {
            Some(port) => port
                .received
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
            None => Vec::new(),
        }
    }

    /// Whether the host currently holds the port open
    pub fn is_open(&self, path: &str) -> bool {
        self.lock().ports.get(path).is_some_and(VirtualPort::is_open)
    }

    /// How many times the port has been opened
    pub fn open_count(&self, path: &str) -> usize {
        self.lock().ports.get(path).map_or(0, |port| port.opens)
    }

    /// Line settings of the most recent open
    pub fn last_config(&self, path: &str) -> Option<PeripheralConfig> {
        self.lock().ports.get(path).and_then(|port| port.last_config)
    }

    /// Paths of the attached devices
    pub fn paths(&self) -> Vec<String> {
        self.lock().ports.keys().cloned().collect()
    }
}

impl PortEnumerator for VirtualBus {
    fn list_ports(&self) -> Result<Vec<SerialPortInfo>, DetectError> {
        Ok(self
            .lock()
            .ports
            .values()
            .map(|port| port.config.port_info())
            .collect())
    }
}

impl SerialDriver for VirtualBus {
    fn open(
        &self,
        path: &str,
        config: &PeripheralConfig,
    ) -> Result<Box<dyn DeviceIo>, DriverError> {
        let mut inner = self.lock();
        let failed = |reason: &str| DriverError::OpenFailed {
            port: path.to_string(),
            reason: reason.to_string(),
        };

        if let Some(reason) = inner.open_failures.pop_front() {
            return Err(failed(&reason));
        }
        let port = inner
            .ports
            .get_mut(path)
            .ok_or_else(|| failed("no such device"))?;
        if port.is_open() {
            return Err(failed("port is busy"));
        }

        let (host, device) = duplex(PIPE_SIZE);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));
        tokio::spawn(run_virtual_device(
            path.to_string(),
            device,
            cmd_rx,
            port.received.clone(),
            port.config.loopback,
        ));

        port.link = Some(OpenLink {
            open: open.clone(),
            cmd_tx,
        });
        port.opens += 1;
        port.last_config = Some(*config);
        debug!("Opened virtual port {} ({} opens)", path, port.opens);

        Ok(Box::new(HostEnd::new(host, open)))
    }
}
