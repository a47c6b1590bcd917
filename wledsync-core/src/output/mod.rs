//! Network output to LED controllers
//!
//! Supports:
//! - One UDP worker per device with a bounded queue ([`DeviceHandle`])
//! - Fan-out of matrix tiles to several devices ([`MulticastRouter`])
//! - Route table effects while casting ([`IpSwapper`])
//! - The WLED JSON API for matrix size and live mode ([`wled`])
//! - mDNS discovery of devices ([`discover`])

mod device;
pub mod discover;
mod multicast;
mod swapper;
pub mod wled;

pub use device::{
    DeviceHandle, DeviceOptions, DeviceStats, DeviceStatsSnapshot, DEFAULT_QUEUE_CAPACITY,
};
pub use multicast::{FanoutResult, MulticastRouter, RouteTable, FANOUT_TIMEOUT};
pub use swapper::{apply_effect, IpSwapper, SwapEffect, SwapState};

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tracing::debug;

use crate::config::{CastConfig, Protocol};
use crate::error::{Result, WledSyncError};
use crate::protocol::e131::E131Target;
use crate::protocol::{artnet, ArtNetEncoder, DdpEncoder, E131Encoder, PacketEncoder};

/// Where a device host string points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostTarget {
    Ip(IpAddr),
    /// e1.31 per-universe multicast groups
    Multicast,
    /// Art-Net limited broadcast
    Broadcast,
}

/// Resolve a host string: an IP, a hostname, or the `multicast` / `broadcast` keywords
pub async fn resolve_host(host: &str) -> Result<HostTarget> {
    let host = host.trim();
    if host.eq_ignore_ascii_case("multicast") {
        return Ok(HostTarget::Multicast);
    }
    if host.eq_ignore_ascii_case("broadcast") {
        return Ok(HostTarget::Broadcast);
    }
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(HostTarget::Ip(ip));
    }

    let mut addrs = tokio::net::lookup_host((host, 0))
        .await
        .map_err(|e| WledSyncError::device(format!("Cannot resolve {}: {}", host, e)))?;
    let addr = addrs
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| WledSyncError::device(format!("No IPv4 address for {}", host)))?;
    debug!("Resolved {} to {}", host, addr.ip());
    Ok(HostTarget::Ip(addr.ip()))
}

/// Number of pixels a device receives per frame
pub fn device_pixel_count(config: &CastConfig) -> usize {
    let configured = match config.protocol {
        Protocol::E131 => config.e131.pixel_count,
        Protocol::ArtNet => config.artnet.pixel_count,
        _ => 0,
    };
    if configured > 0 {
        configured
    } else {
        config.scale_width as usize * config.scale_height as usize
    }
}

/// Build the packet encoder for one device of a cast
///
/// Returns `None` for [`Protocol::Other`], which has no network output.
pub fn build_encoder(
    config: &CastConfig,
    target: HostTarget,
) -> Result<Option<Box<dyn PacketEncoder>>> {
    let port = config.effective_port();
    let pixels = device_pixel_count(config);

    let encoder: Box<dyn PacketEncoder> = match (config.protocol, target) {
        (Protocol::Other, _) => return Ok(None),
        (Protocol::Ddp, HostTarget::Ip(ip)) => Box::new(DdpEncoder::new(SocketAddr::new(ip, port))),
        (Protocol::E131, HostTarget::Ip(ip)) => Box::new(E131Encoder::new(
            &config.e131,
            E131Target::Unicast(SocketAddr::new(ip, port)),
            pixels,
        )?),
        (Protocol::E131, HostTarget::Multicast) => Box::new(E131Encoder::new(
            &config.e131,
            E131Target::Multicast { port },
            pixels,
        )?),
        (Protocol::ArtNet, HostTarget::Ip(ip)) => Box::new(ArtNetEncoder::new(
            &config.artnet,
            SocketAddr::new(ip, port),
            pixels,
        )?),
        (Protocol::ArtNet, HostTarget::Broadcast) => Box::new(ArtNetEncoder::new(
            &config.artnet,
            SocketAddr::new(IpAddr::V4(artnet::BROADCAST), port),
            pixels,
        )?),
        (protocol, target) => {
            return Err(WledSyncError::config(format!(
                "{:?} is not a valid destination for {}",
                target, protocol
            )));
        }
    };
    Ok(Some(encoder))
}

/// Device options derived from the cast
pub fn device_options(config: &CastConfig) -> DeviceOptions {
    let blackout_on_stop = match config.protocol {
        Protocol::E131 => config.e131.blackout,
        Protocol::ArtNet => config.artnet.blackout,
        _ => false,
    };
    DeviceOptions {
        retry_number: config.retry_number,
        blackout_on_stop,
        ..DeviceOptions::default()
    }
}

/// Spawn a device for `host`, `None` when the protocol has no output
pub async fn spawn_device(
    config: &CastConfig,
    name: impl Into<String>,
    host: &str,
) -> Result<Option<DeviceHandle>> {
    let target = resolve_host(host).await?;
    match build_encoder(config, target)? {
        Some(encoder) => Ok(Some(
            DeviceHandle::spawn(name, encoder, device_options(config)).await?,
        )),
        None => Ok(None),
    }
}

/// Whether `ip` is the loopback placeholder used for unconfigured devices
pub fn is_null_host(ip: IpAddr) -> bool {
    ip == IpAddr::V4(Ipv4Addr::LOCALHOST)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Protocol;

    #[tokio::test]
    async fn test_resolve_keywords() {
        assert_eq!(resolve_host("multicast").await.unwrap(), HostTarget::Multicast);
        assert_eq!(resolve_host("BROADCAST").await.unwrap(), HostTarget::Broadcast);
        assert_eq!(
            resolve_host("192.168.1.50").await.unwrap(),
            HostTarget::Ip("192.168.1.50".parse().unwrap())
        );
    }

    #[test]
    fn test_pixel_count_from_scale() {
        let config = CastConfig::default()
            .with_protocol(Protocol::E131)
            .with_scale(16, 16);
        assert_eq!(device_pixel_count(&config), 256);

        let mut config = config;
        config.e131.pixel_count = 100;
        assert_eq!(device_pixel_count(&config), 100);
    }

    #[test]
    fn test_multicast_keyword_only_for_e131() {
        let ddp = CastConfig::default();
        assert!(build_encoder(&ddp, HostTarget::Multicast).is_err());

        let e131 = CastConfig::default().with_protocol(Protocol::E131).with_scale(8, 8);
        let encoder = build_encoder(&e131, HostTarget::Multicast).unwrap().unwrap();
        assert_eq!(encoder.protocol(), Protocol::E131);

        let other = CastConfig::default().with_protocol(Protocol::Other);
        assert!(build_encoder(&other, HostTarget::Broadcast).unwrap().is_none());
    }
}
