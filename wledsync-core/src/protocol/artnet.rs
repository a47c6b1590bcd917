//! Art-Net ArtDmx packets

use bytes::{BufMut, BytesMut};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use super::{expand_channels, Datagram, PacketEncoder, UniverseMap};
use crate::config::{ArtNetConfig, ChannelLayout, Protocol};
use crate::error::{Result, WledSyncError};

pub const DEFAULT_PORT: u16 = 6454;
pub const HEADER_LEN: usize = 18;

const ART_NET_ID: &[u8; 8] = b"Art-Net\0";
const OP_DMX: u16 = 0x5000;
const PROTOCOL_VERSION: u16 = 14;

/// Address used for the `broadcast` host keyword
pub const BROADCAST: Ipv4Addr = Ipv4Addr::BROADCAST;

/// Build an ArtDmx packet
///
/// `universe` is the 15 bit port address (Net, SubNet, Universe).
pub fn encode_packet(sequence: u8, universe: u16, data: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + data.len());
    buf.put_slice(ART_NET_ID);
    buf.put_u16_le(OP_DMX);
    buf.put_u16(PROTOCOL_VERSION);
    buf.put_u8(sequence);
    buf.put_u8(0); // physical
    buf.put_u8((universe & 0xff) as u8);
    buf.put_u8(((universe >> 8) & 0x7f) as u8);
    buf.put_u16(data.len() as u16);
    buf.put_slice(data);
    buf
}

/// Art-Net encoder spanning one or more universes
pub struct ArtNetEncoder {
    target: SocketAddr,
    layout: ChannelLayout,
    map: UniverseMap,
    sequence: u8,
}

impl ArtNetEncoder {
    pub fn new(config: &ArtNetConfig, target: SocketAddr, pixel_count: usize) -> Result<Self> {
        if config.universe_size % 2 != 0 {
            return Err(WledSyncError::protocol(
                "Art-Net universe size must be even",
            ));
        }
        let channels = pixel_count * config.channels_per_pixel.channels();
        let map = UniverseMap::new(
            config.universe,
            channels,
            config.universe_size,
            config.channel_offset,
        )?;

        Ok(Self {
            target,
            layout: config.channels_per_pixel,
            map,
            sequence: 0,
        })
    }

    pub fn universe_map(&self) -> &UniverseMap {
        &self.map
    }

    // 0 disables sequencing on the receiver, so the counter skips it
    fn next_sequence(&mut self) -> u8 {
        self.sequence = if self.sequence == 255 { 1 } else { self.sequence + 1 };
        self.sequence
    }

    fn packets(&mut self, data: &[u8]) -> Vec<Datagram> {
        let size = self.map.universe_size();
        let slices = self.map.slices();
        let mut datagrams = Vec::with_capacity(slices.len());

        for slice in slices {
            let mut dmx = vec![0u8; size];
            dmx[slice.dmx_start..slice.dmx_end]
                .copy_from_slice(&data[slice.input_start..slice.input_end]);
            let seq = self.next_sequence();
            datagrams.push(Datagram::new(
                self.target,
                encode_packet(seq, slice.universe, &dmx).freeze(),
            ));
        }

        datagrams
    }
}

impl PacketEncoder for ArtNetEncoder {
    fn protocol(&self) -> Protocol {
        Protocol::ArtNet
    }

    fn encode(&mut self, rgb: &[u8]) -> Result<Vec<Datagram>> {
        let data = expand_channels(rgb, self.layout);
        if data.len() != self.map.channel_count() {
            return Err(WledSyncError::protocol(format!(
                "Invalid buffer size. {} != {}",
                data.len(),
                self.map.channel_count()
            )));
        }
        Ok(self.packets(&data))
    }

    fn blackout(&mut self) -> Vec<Datagram> {
        let zeros = vec![0u8; self.map.channel_count()];
        self.packets(&zeros)
    }

    fn set_host(&mut self, host: IpAddr) {
        self.target.set_ip(host);
    }

    fn destination(&self) -> String {
        format!("artnet://{}", self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let packet = encode_packet(1, 0x0123, &[0u8; 512]);
        assert_eq!(&packet[0..8], b"Art-Net\0");
        assert_eq!(&packet[8..10], &[0x00, 0x50]);
        assert_eq!(&packet[10..12], &[0, 14]);
        assert_eq!(packet[12], 1);
        assert_eq!(packet[14], 0x23);
        assert_eq!(packet[15], 0x01);
        assert_eq!(&packet[16..18], &[0x02, 0x00]);
        assert_eq!(packet.len(), 530);
    }

    #[test]
    fn test_odd_universe_size_rejected() {
        let config = ArtNetConfig {
            universe_size: 511,
            ..ArtNetConfig::default()
        };
        let target = SocketAddr::new(IpAddr::V4(BROADCAST), DEFAULT_PORT);
        assert!(ArtNetEncoder::new(&config, target, 10).is_err());
    }
}
