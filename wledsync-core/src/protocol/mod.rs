//! LED protocol packet encoders
//!
//! Encoders turn one frame of packed RGB bytes into UDP datagrams. They do
//! no I/O; the device worker in [`crate::output`] owns the socket.
//!
//! - DDP: pixel stream chunked into 1440 byte packets
//! - e1.31 (sACN): DMX universes, unicast or per-universe multicast
//! - Art-Net: ArtDmx universes, unicast or broadcast

pub mod artnet;
pub mod ddp;
pub mod e131;

pub use artnet::ArtNetEncoder;
pub use ddp::DdpEncoder;
pub use e131::E131Encoder;

use bytes::Bytes;
use std::borrow::Cow;
use std::net::{IpAddr, SocketAddr};

use crate::config::{ChannelLayout, Protocol};
use crate::error::{Result, WledSyncError};

/// A single UDP payload and where it goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub target: SocketAddr,
    pub payload: Bytes,
}

impl Datagram {
    pub fn new(target: SocketAddr, payload: impl Into<Bytes>) -> Self {
        Self {
            target,
            payload: payload.into(),
        }
    }
}

/// Converts frames into protocol datagrams
pub trait PacketEncoder: Send {
    /// Protocol implemented by this encoder
    fn protocol(&self) -> Protocol;

    /// Encode one frame of packed RGB bytes
    fn encode(&mut self, rgb: &[u8]) -> Result<Vec<Datagram>>;

    /// Datagrams that switch every output off, empty if the protocol has none
    fn blackout(&mut self) -> Vec<Datagram>;

    /// Point the encoder at another host
    fn set_host(&mut self, host: IpAddr);

    /// Human readable destination for logs
    fn destination(&self) -> String;

    /// Whether the destination is the unconfigured default and must not be sent to
    fn is_placeholder(&self) -> bool {
        false
    }
}

/// Expand RGB to the device channel layout
///
/// RGBW devices get a zero white channel.
pub fn expand_channels(rgb: &[u8], layout: ChannelLayout) -> Cow<'_, [u8]> {
    match layout {
        ChannelLayout::Rgb => Cow::Borrowed(rgb),
        ChannelLayout::Rgbw => {
            let mut out = Vec::with_capacity(rgb.len() / 3 * 4);
            for px in rgb.chunks_exact(3) {
                out.extend_from_slice(px);
                out.push(0);
            }
            Cow::Owned(out)
        }
    }
}

/// Placement of a channel buffer inside one universe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniverseSlice {
    pub universe: u16,
    /// First DMX slot written in this universe
    pub dmx_start: usize,
    /// One past the last DMX slot written
    pub dmx_end: usize,
    /// Range of the input buffer copied into the slots
    pub input_start: usize,
    pub input_end: usize,
}

/// Mapping of a flat channel buffer onto consecutive universes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniverseMap {
    first: u16,
    last: u16,
    size: usize,
    offset: usize,
    channel_count: usize,
}

impl UniverseMap {
    /// Map `channel_count` channels starting at `offset` in universe `first`
    pub fn new(first: u16, channel_count: usize, size: usize, offset: usize) -> Result<Self> {
        if size == 0 || size > 512 {
            return Err(WledSyncError::protocol(format!(
                "Universe size must be 1-512, got {}",
                size
            )));
        }
        if channel_count == 0 {
            return Err(WledSyncError::protocol("Channel count cannot be zero"));
        }
        // Slot indexes are taken modulo the size, so the offset must fit in the first universe
        if offset >= size {
            return Err(WledSyncError::protocol(format!(
                "Channel offset {} must be below the universe size {}",
                offset, size
            )));
        }

        let span = offset + channel_count - 1;
        let last = first as usize + span / size;
        if last > u16::MAX as usize {
            return Err(WledSyncError::protocol(format!(
                "{} channels from universe {} overflow the universe range",
                channel_count, first
            )));
        }

        Ok(Self {
            first,
            last: last as u16,
            size,
            offset,
            channel_count,
        })
    }

    pub fn first_universe(&self) -> u16 {
        self.first
    }

    pub fn last_universe(&self) -> u16 {
        self.last
    }

    /// Number of universes used
    pub fn universe_count(&self) -> usize {
        (self.last - self.first) as usize + 1
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    pub fn universe_size(&self) -> usize {
        self.size
    }

    /// Per-universe placement, in universe order
    pub fn slices(&self) -> Vec<UniverseSlice> {
        let mut slices = Vec::with_capacity(self.universe_count());
        let mut input = 0;

        for (i, universe) in (self.first..=self.last).enumerate() {
            let u_start = i * self.size;
            let u_end = (i + 1) * self.size;

            let dmx_start = u_start.max(self.offset) % self.size;
            let mut dmx_end = u_end.min(self.offset + self.channel_count) % self.size;
            if dmx_end == 0 {
                dmx_end = self.size;
            }

            let input_end = input + dmx_end - dmx_start;
            slices.push(UniverseSlice {
                universe,
                dmx_start,
                dmx_end,
                input_start: input,
                input_end,
            });
            input = input_end;
        }

        slices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_universe() {
        let map = UniverseMap::new(1, 300, 510, 0).unwrap();
        assert_eq!(map.last_universe(), 1);
        let slices = map.slices();
        assert_eq!(slices.len(), 1);
        assert_eq!((slices[0].dmx_start, slices[0].dmx_end), (0, 300));
    }

    #[test]
    fn test_exact_fit() {
        let map = UniverseMap::new(1, 510, 510, 0).unwrap();
        assert_eq!(map.universe_count(), 1);
        assert_eq!(map.slices()[0].dmx_end, 510);
    }

    #[test]
    fn test_spanning_with_offset() {
        // 16x16 RGB = 768 channels, offset 10
        let map = UniverseMap::new(1, 768, 510, 10).unwrap();
        assert_eq!(map.last_universe(), 2);
        let slices = map.slices();
        assert_eq!(slices[0].dmx_start, 10);
        assert_eq!(slices[0].dmx_end, 510);
        assert_eq!(slices[0].input_end, 500);
        assert_eq!(slices[1].dmx_start, 0);
        assert_eq!(slices[1].dmx_end, 268);
        assert_eq!(slices[1].input_end, 768);
    }

    #[test]
    fn test_trailing_channel_gets_its_universe() {
        let map = UniverseMap::new(0, 513, 512, 0).unwrap();
        assert_eq!(map.universe_count(), 2);
        let last = map.slices()[1];
        assert_eq!((last.dmx_start, last.dmx_end), (0, 1));
        assert_eq!((last.input_start, last.input_end), (512, 513));
    }

    #[test]
    fn test_offset_outside_first_universe_rejected() {
        assert!(UniverseMap::new(1, 30, 510, 510).is_err());
        assert!(UniverseMap::new(1, 30, 6, 7).is_err());
        assert!(UniverseMap::new(1, 30, 510, 509).is_ok());
    }

    #[test]
    fn test_rgbw_expansion() {
        let rgbw = expand_channels(&[1, 2, 3, 4, 5, 6], ChannelLayout::Rgbw);
        assert_eq!(&*rgbw, &[1, 2, 3, 0, 4, 5, 6, 0]);
    }
}
