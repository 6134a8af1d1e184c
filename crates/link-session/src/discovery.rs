//! Peripheral discovery
//!
//! A discovery cycle starts with `discover` and ends with the next `discover`
//! or a successful `connect`. While it runs, a periodic task enumerates the
//! attached ports off the event loop and hands each listing back to the
//! session actor tagged with the cycle number. The scanner filters listings,
//! records new peripherals in its directory and reports only those, so a
//! port is announced at most once per cycle.

use std::sync::Arc;
use std::time::Duration;

use link_detect::{
    DiscoveryFilters, Peripheral, PeripheralDirectory, PortEnumerator, SerialPortInfo,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::actor::Internal;
use crate::periodic::PeriodicTask;

/// Owner of the peripheral directory and the active filters
#[derive(Debug, Default)]
pub struct DiscoveryScanner {
    directory: PeripheralDirectory,
    filters: Option<DiscoveryFilters>,
}

impl DiscoveryScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new cycle with `filters`, forgetting every reported peripheral
    pub fn begin(&mut self, filters: DiscoveryFilters) -> u64 {
        let cycle = self.directory.reset();
        debug!("Discovery cycle {} with patterns {:?}", cycle, filters.patterns);
        self.filters = Some(filters);
        cycle
    }

    pub fn cycle(&self) -> u64 {
        self.directory.cycle()
    }

    /// Read-only view of the peripherals reported in the current cycle
    pub fn directory(&self) -> &PeripheralDirectory {
        &self.directory
    }

    /// Record a listing from `cycle`, returning the newly found peripherals
    pub fn accept(&mut self, cycle: u64, ports: &[SerialPortInfo]) -> Vec<Peripheral> {
        if cycle != self.directory.cycle() {
            debug!("Dropping listing from stale cycle {}", cycle);
            return Vec::new();
        }
        let Some(filters) = &self.filters else {
            return Vec::new();
        };

        let mut found = Vec::new();
        for port in ports {
            if !filters.matches(&port.identity()) {
                continue;
            }
            let peripheral = Peripheral::from(port);
            if self.directory.insert(peripheral.clone()) {
                found.push(peripheral);
            }
        }
        found
    }

    /// Spawn the enumeration task for `cycle`
    pub(crate) fn spawn_scan(
        cycle: u64,
        period: Duration,
        enumerator: Arc<dyn PortEnumerator>,
        internal_tx: mpsc::UnboundedSender<Internal>,
    ) -> PeriodicTask {
        PeriodicTask::spawn("discovery", period, move || {
            let enumerator = enumerator.clone();
            let internal_tx = internal_tx.clone();
            async move {
                let listing = tokio::task::spawn_blocking(move || enumerator.list_ports()).await;
                match listing {
                    Ok(Ok(ports)) => internal_tx
                        .send(Internal::DiscoveryListing { cycle, ports })
                        .is_ok(),
                    Ok(Err(e)) => {
                        warn!("Port enumeration failed: {}", e);
                        true
                    }
                    Err(e) => {
                        warn!("Port enumeration task failed: {}", e);
                        true
                    }
                }
            }
        })
    }
}
