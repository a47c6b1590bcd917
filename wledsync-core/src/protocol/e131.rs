//! Streaming ACN (ANSI E1.31) data packets
//!
//! Each universe keeps its own 512 slot buffer and sequence number. Slots
//! not covered by the current frame keep their last value.

use bytes::{BufMut, BytesMut};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use uuid::Uuid;

use super::{expand_channels, Datagram, PacketEncoder, UniverseMap};
use crate::config::{ChannelLayout, E131Config, Protocol};
use crate::error::{Result, WledSyncError};

pub const DEFAULT_PORT: u16 = 5568;

/// DMX slots per universe
pub const DMX_SLOTS: usize = 512;

const ACN_PACKET_ID: [u8; 12] = *b"ASC-E1.17\0\0\0";
const VECTOR_ROOT_DATA: u32 = 0x0000_0004;
const VECTOR_FRAMING_DATA: u32 = 0x0000_0002;
const VECTOR_DMP_SET_PROPERTY: u8 = 0x02;
const SOURCE_NAME_LEN: usize = 64;

const ROOT_LAYER_START: usize = 16;
const FRAMING_LAYER_START: usize = 38;
const DMP_LAYER_START: usize = 115;
/// Header bytes before the DMX start code
pub const HEADER_LEN: usize = 125;

/// Where packets are sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum E131Target {
    /// One host receives every universe
    Unicast(SocketAddr),
    /// Each universe goes to its own multicast group
    Multicast { port: u16 },
}

/// Multicast group for a universe: 239.255.{hi}.{lo}
pub fn multicast_group(universe: u16) -> Ipv4Addr {
    let [hi, lo] = universe.to_be_bytes();
    Ipv4Addr::new(239, 255, hi, lo)
}

fn flags_and_length(len: usize) -> u16 {
    0x7000 | (len as u16 & 0x0fff)
}

/// Build one E1.31 data packet
#[allow(clippy::too_many_arguments)]
pub fn encode_packet(
    cid: &[u8; 16],
    source_name: &str,
    priority: u8,
    sequence: u8,
    options: u8,
    universe: u16,
    slots: &[u8],
) -> BytesMut {
    let total = HEADER_LEN + 1 + slots.len();
    let mut buf = BytesMut::with_capacity(total);

    // Root layer
    buf.put_u16(0x0010);
    buf.put_u16(0x0000);
    buf.put_slice(&ACN_PACKET_ID);
    buf.put_u16(flags_and_length(total - ROOT_LAYER_START));
    buf.put_u32(VECTOR_ROOT_DATA);
    buf.put_slice(cid);

    // Framing layer
    buf.put_u16(flags_and_length(total - FRAMING_LAYER_START));
    buf.put_u32(VECTOR_FRAMING_DATA);
    let mut name = [0u8; SOURCE_NAME_LEN];
    let bytes = source_name.as_bytes();
    let n = bytes.len().min(SOURCE_NAME_LEN - 1);
    name[..n].copy_from_slice(&bytes[..n]);
    buf.put_slice(&name);
    buf.put_u8(priority);
    buf.put_u16(0); // synchronization address
    buf.put_u8(sequence);
    buf.put_u8(options);
    buf.put_u16(universe);

    // DMP layer
    buf.put_u16(flags_and_length(total - DMP_LAYER_START));
    buf.put_u8(VECTOR_DMP_SET_PROPERTY);
    buf.put_u8(0xa1);
    buf.put_u16(0x0000);
    buf.put_u16(0x0001);
    buf.put_u16(slots.len() as u16 + 1);
    buf.put_u8(0x00); // DMX start code
    buf.put_slice(slots);

    buf
}

struct UniverseState {
    slots: [u8; DMX_SLOTS],
    sequence: u8,
}

/// e1.31 encoder spanning one or more universes
pub struct E131Encoder {
    target: E131Target,
    cid: [u8; 16],
    name: String,
    priority: u8,
    layout: ChannelLayout,
    map: UniverseMap,
    universes: BTreeMap<u16, UniverseState>,
}

impl E131Encoder {
    /// Create an encoder for `pixel_count` pixels
    pub fn new(config: &E131Config, target: E131Target, pixel_count: usize) -> Result<Self> {
        let channels = pixel_count * config.channels_per_pixel.channels();
        let map = UniverseMap::new(
            config.universe,
            channels,
            config.universe_size,
            config.channel_offset,
        )?;

        let universes = (map.first_universe()..=map.last_universe())
            .map(|u| {
                (
                    u,
                    UniverseState {
                        slots: [0; DMX_SLOTS],
                        sequence: 0,
                    },
                )
            })
            .collect();

        Ok(Self {
            target,
            cid: *Uuid::new_v4().as_bytes(),
            name: config.name.clone(),
            priority: config.priority,
            layout: config.channels_per_pixel,
            map,
            universes,
        })
    }

    pub fn universe_map(&self) -> &UniverseMap {
        &self.map
    }

    fn address_for(&self, universe: u16) -> SocketAddr {
        match self.target {
            E131Target::Unicast(addr) => addr,
            E131Target::Multicast { port } => {
                SocketAddr::new(IpAddr::V4(multicast_group(universe)), port)
            }
        }
    }

    fn packets(&mut self) -> Vec<Datagram> {
        let mut datagrams = Vec::with_capacity(self.universes.len());
        let universes: Vec<u16> = self.universes.keys().copied().collect();

        for universe in universes {
            let target = self.address_for(universe);
            if let Some(state) = self.universes.get_mut(&universe) {
                state.sequence = state.sequence.wrapping_add(1);
                let packet = encode_packet(
                    &self.cid,
                    &self.name,
                    self.priority,
                    state.sequence,
                    0,
                    universe,
                    &state.slots,
                );
                datagrams.push(Datagram::new(target, packet.freeze()));
            }
        }

        datagrams
    }
}

impl PacketEncoder for E131Encoder {
    fn protocol(&self) -> Protocol {
        Protocol::E131
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

        for slice in self.map.slices() {
            if let Some(state) = self.universes.get_mut(&slice.universe) {
                state.slots[slice.dmx_start..slice.dmx_end]
                    .copy_from_slice(&data[slice.input_start..slice.input_end]);
            }
        }

        Ok(self.packets())
    }

    fn blackout(&mut self) -> Vec<Datagram> {
        for state in self.universes.values_mut() {
            state.slots = [0; DMX_SLOTS];
        }
        self.packets()
    }

    fn set_host(&mut self, host: IpAddr) {
        let port = match self.target {
            E131Target::Unicast(addr) => addr.port(),
            E131Target::Multicast { port } => port,
        };
        self.target = E131Target::Unicast(SocketAddr::new(host, port));
    }

    fn destination(&self) -> String {
        match self.target {
            E131Target::Unicast(addr) => format!("e131://{}", addr),
            E131Target::Multicast { port } => format!(
                "e131://multicast:{} (universes {}-{})",
                port,
                self.map.first_universe(),
                self.map.last_universe()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multicast_group() {
        assert_eq!(multicast_group(1), Ipv4Addr::new(239, 255, 0, 1));
        assert_eq!(multicast_group(0x0102), Ipv4Addr::new(239, 255, 1, 2));
    }

    #[test]
    fn test_packet_layout() {
        let packet = encode_packet(&[9; 16], "test", 100, 7, 0, 3, &[0xff; 512]);
        assert_eq!(packet.len(), 638);
        assert_eq!(&packet[4..16], b"ASC-E1.17\0\0\0");
        // root flags/length covers everything after the preamble block
        assert_eq!(u16::from_be_bytes([packet[16], packet[17]]), 0x7000 | 622);
        assert_eq!(&packet[44..48], b"test");
        assert_eq!(packet[108], 100);
        assert_eq!(packet[111], 7);
        assert_eq!(u16::from_be_bytes([packet[113], packet[114]]), 3);
        assert_eq!(u16::from_be_bytes([packet[123], packet[124]]), 513);
        assert_eq!(packet[125], 0);
        assert_eq!(packet[126], 0xff);
    }
}
