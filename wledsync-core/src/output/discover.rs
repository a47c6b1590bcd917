//! mDNS discovery of WLED devices on the local network
//!
//! WLED announces itself as `_http._tcp`, so every HTTP service answering
//! in the browse window is collected; callers that need only WLED devices
//! query `/json/info` on each result.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Result, WledSyncError};

/// Service type WLED registers
pub const SERVICE_TYPE: &str = "_http._tcp.local.";

/// Browse window used when none is given
pub const DEFAULT_DISCOVERY_TIME: Duration = Duration::from_secs(5);

/// One HTTP service found on the network
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredDevice {
    /// Instance name without the service suffix
    pub name: String,
    pub address: IpAddr,
    pub port: u16,
}

impl std::fmt::Display for DiscoveredDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}:{}", self.name, self.address, self.port)
    }
}

/// Strip the service type from a full instance name
pub fn device_name(fullname: &str) -> String {
    let suffix = format!(".{}", SERVICE_TYPE);
    fullname
        .strip_suffix(suffix.as_str())
        .unwrap_or(fullname)
        .to_string()
}

/// Pick the address to cast to, IPv4 first
pub fn preferred_address(addresses: impl IntoIterator<Item = IpAddr>) -> Option<IpAddr> {
    let mut addresses: Vec<IpAddr> = addresses.into_iter().collect();
    addresses.sort_by_key(|addr| (!addr.is_ipv4(), *addr));
    addresses.into_iter().next()
}

fn to_device(service: &ServiceInfo) -> Option<DiscoveredDevice> {
    let address = preferred_address(service.get_addresses().iter().copied().map(IpAddr::from))?;
    Some(DiscoveredDevice {
        name: device_name(service.get_fullname()),
        address,
        port: service.get_port(),
    })
}

/// Browse for `duration` and return what resolved, sorted by name
///
/// Services removed before the window closes are dropped from the result.
pub async fn discover(duration: Duration) -> Result<Vec<DiscoveredDevice>> {
    tokio::task::spawn_blocking(move || browse(duration))
        .await
        .map_err(|e| WledSyncError::device(format!("Discovery task failed: {}", e)))?
}

fn browse(duration: Duration) -> Result<Vec<DiscoveredDevice>> {
    let daemon = ServiceDaemon::new()
        .map_err(|e| WledSyncError::device(format!("Cannot start mDNS daemon: {}", e)))?;
    let receiver = daemon
        .browse(SERVICE_TYPE)
        .map_err(|e| WledSyncError::device(format!("Cannot browse {}: {}", SERVICE_TYPE, e)))?;

    info!("Browsing {} for {:?}", SERVICE_TYPE, duration);
    let mut found: BTreeMap<String, DiscoveredDevice> = BTreeMap::new();
    let deadline = Instant::now() + duration;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match receiver.recv_timeout(remaining) {
            Ok(ServiceEvent::ServiceResolved(service)) => match to_device(&service) {
                Some(device) => {
                    debug!("Resolved {}", device);
                    found.insert(service.get_fullname().to_string(), device);
                }
                None => debug!("{} resolved without an address", service.get_fullname()),
            },
            Ok(ServiceEvent::ServiceRemoved(_, fullname)) => {
                debug!("Removed {}", fullname);
                found.remove(&fullname);
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }

    if let Err(e) = daemon.shutdown() {
        warn!("mDNS daemon did not shut down cleanly: {}", e);
    }

    let mut devices: Vec<DiscoveredDevice> = found.into_values().collect();
    devices.sort_by(|a, b| a.name.cmp(&b.name).then(a.address.cmp(&b.address)));
    info!("Discovered {} HTTP services", devices.len());
    Ok(devices)
}
