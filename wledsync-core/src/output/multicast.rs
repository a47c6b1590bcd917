//! Fan-out of a cast to several devices
//!
//! Tiles of a split frame are routed through a shared table mapping each
//! matrix slot to a device. The [`IpSwapper`](super::IpSwapper) permutes
//! that table while the cast runs.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::RwLock;
use tracing::debug;

use super::device::DeviceHandle;
use super::swapper::IpSwapper;
use crate::types::Frame;

/// Wait per device when fanning out a frame
pub const FANOUT_TIMEOUT: Duration = Duration::from_secs(1);

/// Slot -> device index; `None` pauses the slot
pub type RouteTable = Arc<RwLock<Vec<Option<usize>>>>;

/// Outcome of one fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutResult {
    pub sent: usize,
    pub dropped: usize,
    pub paused: usize,
}

/// A group of devices fed from one cast
#[derive(Debug)]
pub struct MulticastRouter {
    devices: Vec<DeviceHandle>,
    routes: RouteTable,
    initial: Vec<Option<usize>>,
}

impl MulticastRouter {
    /// Devices must already be in cast index order
    pub fn new(devices: Vec<DeviceHandle>) -> Self {
        let initial: Vec<Option<usize>> = (0..devices.len()).map(Some).collect();
        Self {
            devices,
            routes: Arc::new(RwLock::new(initial.clone())),
            initial,
        }
    }

    pub fn devices(&self) -> &[DeviceHandle] {
        &self.devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Current route table
    pub fn routes(&self) -> Vec<Option<usize>> {
        self.routes.read().clone()
    }

    /// Swapper working on this router's route table
    pub fn swapper(&self) -> IpSwapper {
        IpSwapper::new(Arc::clone(&self.routes), self.initial.clone())
    }

    /// Send tile `i` to the device routed at slot `i`
    pub async fn send_tiles(&self, tiles: Vec<Frame>) -> FanoutResult {
        let routes = self.routes();
        let mut result = FanoutResult::default();
        let mut sends = Vec::with_capacity(tiles.len());

        for (slot, tile) in tiles.into_iter().enumerate() {
            match routes.get(slot).copied().flatten() {
                Some(device) if device < self.devices.len() => {
                    sends.push(
                        self.devices[device].send_frame_timeout(tile.into_bytes(), FANOUT_TIMEOUT),
                    );
                }
                _ => result.paused += 1,
            }
        }

        for ok in join_all(sends).await {
            if ok {
                result.sent += 1;
            } else {
                result.dropped += 1;
            }
        }

        if result.dropped > 0 {
            debug!("Fan-out dropped {} of {} tiles", result.dropped, routes.len());
        }
        result
    }

    /// Send the same frame to every device
    pub async fn broadcast(&self, frame: &Frame) -> FanoutResult {
        let sends = self
            .devices
            .iter()
            .map(|device| device.send_frame_timeout(frame.as_bytes().to_vec(), FANOUT_TIMEOUT));

        let mut result = FanoutResult::default();
        for ok in join_all(sends).await {
            if ok {
                result.sent += 1;
            } else {
                result.dropped += 1;
            }
        }
        result
    }

    /// Stop every device
    pub async fn shutdown(&mut self) {
        join_all(self.devices.iter_mut().map(|device| device.shutdown())).await;
    }
}
