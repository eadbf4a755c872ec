//! Device discovery
//!
//! One scan of the local network, bounded twice: atvremote gets the scan
//! timeout, and the whole operation is supervised by a longer outer timeout
//! so a wedged scanner can never hold the discovery slot forever.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::backend::DeviceBackend;
use crate::config::Config;
use crate::error::RemoteError;
use crate::models::DeviceRecord;

#[derive(Clone)]
pub struct DiscoveryWorker {
    backend: Arc<dyn DeviceBackend>,
    scan_timeout: Duration,
    outer_timeout: Duration,
}

impl DiscoveryWorker {
    /// `outer_timeout` is raised to at least one second above `scan_timeout`
    pub fn new(backend: Arc<dyn DeviceBackend>, scan_timeout: Duration, outer_timeout: Duration) -> Self {
        let floor = scan_timeout + Duration::from_secs(1);
        Self {
            backend,
            scan_timeout,
            outer_timeout: outer_timeout.max(floor),
        }
    }

    pub fn from_config(backend: Arc<dyn DeviceBackend>, config: &Config) -> Self {
        Self::new(backend, config.scan_timeout(), config.outer_timeout())
    }

    pub fn scan_timeout(&self) -> Duration {
        self.scan_timeout
    }

    pub fn outer_timeout(&self) -> Duration {
        self.outer_timeout
    }

    /// Scan once. Results are de-duplicated by address.
    pub async fn discover(&self) -> Result<Vec<DeviceRecord>, RemoteError> {
        match timeout(self.outer_timeout, self.backend.scan(self.scan_timeout)).await {
            Ok(Ok(found)) => {
                let devices = dedupe_by_address(found);
                info!("Discovery found {} device(s)", devices.len());
                Ok(devices)
            }
            Ok(Err(e)) => {
                warn!("Discovery failed: {}", e);
                Err(e)
            }
            Err(_) => {
                warn!("Discovery exceeded {}s", self.outer_timeout.as_secs());
                Err(RemoteError::Timeout(format!(
                    "discovery did not finish within {}s",
                    self.outer_timeout.as_secs()
                )))
            }
        }
    }
}

/// Collapse records sharing an address. The first sighting wins; later ones
/// only contribute services it did not list.
pub fn dedupe_by_address(found: Vec<DeviceRecord>) -> Vec<DeviceRecord> {
    let mut index: HashMap<IpAddr, usize> = HashMap::new();
    let mut devices: Vec<DeviceRecord> = Vec::with_capacity(found.len());

    for record in found {
        match index.get(&record.address) {
            Some(&i) => {
                debug!("{} already seen at {}, merging", record.name, record.address);
                devices[i].merge_services(&record);
            }
            None => {
                index.insert(record.address, devices.len());
                devices.push(record);
            }
        }
    }
    devices
}

/// Attach credentials from previously known devices to fresh scan results.
///
/// Matching is by identifier. Credentials for services the device no longer
/// advertises are kept; atvremote ignores them.
pub fn reconcile(found: Vec<DeviceRecord>, known: &[DeviceRecord]) -> Vec<DeviceRecord> {
    found
        .into_iter()
        .map(|mut record| {
            if let Some(previous) = known.iter().find(|k| k.identifier == record.identifier) {
                for (service, credential) in &previous.credentials {
                    record
                        .credentials
                        .entry(*service)
                        .or_insert_with(|| credential.clone());
                }
                if record.model.is_none() {
                    record.model = previous.model.clone();
                }
            }
            record
        })
        .collect()
}
