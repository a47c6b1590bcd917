//! Distributed Display Protocol
//!
//! A frame is sent as a run of packets of at most 480 RGB pixels. Each
//! packet carries a 10 byte header with the byte offset of its chunk; the
//! last one sets the PUSH flag so the controller displays the frame.

use bytes::{BufMut, BytesMut};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use super::{Datagram, PacketEncoder};
use crate::config::Protocol;
use crate::error::Result;

pub const HEADER_LEN: usize = 10;
pub const MAX_PIXELS: usize = 480;
/// Payload bytes per packet (`MAX_PIXELS * 3`)
pub const MAX_DATALEN: usize = MAX_PIXELS * 3;

pub const VER1: u8 = 0x40;
pub const PUSH: u8 = 0x01;
pub const QUERY: u8 = 0x02;
pub const REPLY: u8 = 0x04;
pub const STORAGE: u8 = 0x08;
pub const TIME: u8 = 0x10;

/// RGB, 8 bits per channel
pub const DATATYPE: u8 = 0x01;
/// Default output device
pub const SOURCE: u8 = 0x01;

pub const DEFAULT_PORT: u16 = 4048;

/// Number of packets needed for `len` bytes
pub fn packet_count(len: usize) -> usize {
    let (count, remainder) = (len / MAX_DATALEN, len % MAX_DATALEN);
    if remainder == 0 { count } else { count + 1 }
}

/// Sequence number for a frame, cycling 1..=15
pub fn sequence(frame_count: u64) -> u8 {
    (frame_count % 15 + 1) as u8
}

/// Write a DDP header
pub fn encode_header(buf: &mut BytesMut, sequence: u8, offset: u32, len: u16, push: bool) {
    buf.put_u8(if push { VER1 | PUSH } else { VER1 });
    buf.put_u8(sequence);
    buf.put_u8(DATATYPE);
    buf.put_u8(SOURCE);
    buf.put_u32(offset);
    buf.put_u16(len);
}

/// DDP encoder for one controller
#[derive(Debug)]
pub struct DdpEncoder {
    target: SocketAddr,
    frame_count: u64,
}

impl DdpEncoder {
    pub fn new(target: SocketAddr) -> Self {
        Self {
            target,
            frame_count: 0,
        }
    }

    /// Frames encoded so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

impl PacketEncoder for DdpEncoder {
    fn protocol(&self) -> Protocol {
        Protocol::Ddp
    }

    fn encode(&mut self, rgb: &[u8]) -> Result<Vec<Datagram>> {
        let count = packet_count(rgb.len());
        // The count includes the frame being sent, so a fresh encoder starts at 2
        self.frame_count += 1;
        let seq = sequence(self.frame_count);
        let mut datagrams = Vec::with_capacity(count);

        for (i, chunk) in rgb.chunks(MAX_DATALEN).enumerate() {
            let mut buf = BytesMut::with_capacity(HEADER_LEN + chunk.len());
            encode_header(
                &mut buf,
                seq,
                (i * MAX_DATALEN) as u32,
                chunk.len() as u16,
                i + 1 == count,
            );
            buf.put_slice(chunk);
            datagrams.push(Datagram::new(self.target, buf.freeze()));
        }

        Ok(datagrams)
    }

    fn blackout(&mut self) -> Vec<Datagram> {
        Vec::new()
    }

    fn set_host(&mut self, host: IpAddr) {
        self.target.set_ip(host);
    }

    fn destination(&self) -> String {
        format!("ddp://{}", self.target)
    }

    fn is_placeholder(&self) -> bool {
        self.target == SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> SocketAddr {
        "192.168.1.50:4048".parse().unwrap()
    }

    #[test]
    fn test_packet_count() {
        assert_eq!(packet_count(0), 0);
        assert_eq!(packet_count(1), 1);
        assert_eq!(packet_count(1440), 1);
        assert_eq!(packet_count(1441), 2);
        assert_eq!(packet_count(2880), 2);
    }

    #[test]
    fn test_header_layout() {
        let mut buf = BytesMut::new();
        encode_header(&mut buf, 3, 1440, 300, true);
        assert_eq!(
            &buf[..],
            &[0x41, 3, 0x01, 0x01, 0x00, 0x00, 0x05, 0xa0, 0x01, 0x2c]
        );
    }

    #[test]
    fn test_sequence_wraps() {
        assert_eq!(sequence(0), 1);
        assert_eq!(sequence(14), 15);
        assert_eq!(sequence(15), 1);
    }

    #[test]
    fn test_only_last_packet_pushes() {
        let mut encoder = DdpEncoder::new(target());
        let frame = vec![7u8; 3000];
        let packets = encoder.encode(&frame).unwrap();

        assert_eq!(packets.len(), 3);
        assert_eq!(packets[0].payload[0], VER1);
        assert_eq!(packets[1].payload[0], VER1);
        assert_eq!(packets[2].payload[0], VER1 | PUSH);
        assert_eq!(packets[2].payload.len(), HEADER_LEN + 120);
        assert_eq!(encoder.frame_count(), 1);
    }

    #[test]
    fn test_localhost_default_is_placeholder() {
        let encoder = DdpEncoder::new("127.0.0.1:4048".parse().unwrap());
        assert!(encoder.is_placeholder());
        let encoder = DdpEncoder::new("127.0.0.1:5000".parse().unwrap());
        assert!(!encoder.is_placeholder());
    }

    #[test]
    fn test_set_host_keeps_port() {
        let mut encoder = DdpEncoder::new(target());
        encoder.set_host("10.0.0.2".parse().unwrap());
        assert_eq!(encoder.target(), "10.0.0.2:4048".parse().unwrap());
    }
}
