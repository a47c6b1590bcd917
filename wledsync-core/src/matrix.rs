//! Device matrix handling
//!
//! A multicast cast treats `cast_x * cast_y` devices as one large grid.
//! The processed frame is cut into equally sized tiles, emitted row by
//! row, and each tile is routed to one device.

use image::imageops;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::Ipv4Addr;

use crate::error::{Result, WledSyncError};
use crate::types::Frame;

/// One device in the matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CastDevice {
    /// Position in the route table
    pub index: u32,
    pub ip: Ipv4Addr,
}

impl CastDevice {
    pub fn new(index: u32, ip: Ipv4Addr) -> Self {
        Self { index, ip }
    }
}

impl std::fmt::Display for CastDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({},'{}')", self.index, self.ip)
    }
}

/// Parse the list notation `[(0,'192.168.1.1'),(1,'192.168.1.2')]`
pub fn parse_cast_devices(input: &str) -> Result<Vec<CastDevice>> {
    let invalid = || {
        WledSyncError::config(format!(
            "Invalid device list {:?}, expected [(0,'192.168.1.1'), ...]",
            input
        ))
    };

    let body = input
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(invalid)?
        .trim();

    if body.is_empty() {
        return Err(invalid());
    }

    let mut devices = Vec::new();
    let mut rest = body;
    loop {
        let open = rest.strip_prefix('(').ok_or_else(invalid)?;
        let close = open.find(')').ok_or_else(invalid)?;
        let (tuple, after) = open.split_at(close);

        let (index, ip) = tuple.split_once(',').ok_or_else(invalid)?;
        let index: u32 = index.trim().parse().map_err(|_| invalid())?;
        let ip = ip
            .trim()
            .strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
            .ok_or_else(invalid)?;
        let ip: Ipv4Addr = ip.parse().map_err(|_| invalid())?;
        devices.push(CastDevice::new(index, ip));

        rest = after[1..].trim_start();
        if rest.is_empty() {
            break;
        }
        rest = rest.strip_prefix(',').ok_or_else(invalid)?.trim_start();
    }

    Ok(devices)
}

/// Check that `devices` can serve a `cast_x * cast_y` matrix
pub fn validate_cast_devices(devices: &[CastDevice], cast_x: u32, cast_y: u32) -> Result<()> {
    let tiles = cast_x as usize * cast_y as usize;
    if devices.len() != tiles {
        return Err(WledSyncError::config(format!(
            "Matrix {}x{} needs {} devices, got {}",
            cast_x,
            cast_y,
            tiles,
            devices.len()
        )));
    }

    let mut seen = HashSet::new();
    for device in devices {
        if !seen.insert(device.index) {
            return Err(WledSyncError::config(format!(
                "Duplicate device index {}",
                device.index
            )));
        }
    }

    Ok(())
}

/// Devices sorted by route index
pub fn ordered_devices(devices: &[CastDevice]) -> Vec<CastDevice> {
    let mut sorted = devices.to_vec();
    sorted.sort_by_key(|d| d.index);
    sorted
}

/// Split a frame into `cast_x * cast_y` tiles, row-major
///
/// Tiles are `width / cast_x` by `height / cast_y`; remainder pixels on
/// the right and bottom edges are dropped.
pub fn split_into_matrix(frame: &Frame, cast_x: u32, cast_y: u32) -> Result<Vec<Frame>> {
    if cast_x == 0 || cast_y == 0 {
        return Err(WledSyncError::process("Matrix dimensions cannot be zero"));
    }

    let tile_w = frame.width() / cast_x;
    let tile_h = frame.height() / cast_y;
    if tile_w == 0 || tile_h == 0 {
        return Err(WledSyncError::process(format!(
            "Frame {}x{} too small for a {}x{} matrix",
            frame.width(),
            frame.height(),
            cast_x,
            cast_y
        )));
    }

    let mut tiles = Vec::with_capacity(cast_x as usize * cast_y as usize);
    for y in 0..cast_y {
        for x in 0..cast_x {
            let tile =
                imageops::crop_imm(&frame.image, x * tile_w, y * tile_h, tile_w, tile_h).to_image();
            tiles.push(Frame::new(tile, frame.pts));
        }
    }

    Ok(tiles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list() {
        let devices = parse_cast_devices("[(0,'192.168.1.1'), (1, '192.168.1.2')]").unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[1].index, 1);
        assert_eq!(devices[1].ip, Ipv4Addr::new(192, 168, 1, 2));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_cast_devices("").is_err());
        assert!(parse_cast_devices("[]").is_err());
        assert!(parse_cast_devices("[(0,192.168.1.1)]").is_err());
        assert!(parse_cast_devices("[(0,'300.1.1.1')]").is_err());
        assert!(parse_cast_devices("[(0,'1.1.1.1') (1,'1.1.1.2')]").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        let device = CastDevice::new(3, Ipv4Addr::new(10, 0, 0, 7));
        let parsed = parse_cast_devices(&format!("[{}]", device)).unwrap();
        assert_eq!(parsed, vec![device]);
    }
}
