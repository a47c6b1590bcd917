//! Integration tests for the packet encoders

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use wledsync_core::config::{ArtNetConfig, ChannelLayout, E131Config};
use wledsync_core::protocol::e131::{multicast_group, E131Target};
use wledsync_core::protocol::{ddp, ArtNetEncoder, DdpEncoder, E131Encoder, PacketEncoder};

fn target(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 50)), port)
}

#[test]
fn test_ddp_frame_spans_packets() {
    let mut encoder = DdpEncoder::new(target(4048));
    // 600 pixels, 1800 bytes: one full packet and 360 bytes
    let rgb: Vec<u8> = (0..1800).map(|i| (i % 251) as u8).collect();

    let datagrams = encoder.encode(&rgb).unwrap();
    assert_eq!(datagrams.len(), 2);

    let first = &datagrams[0].payload;
    let last = &datagrams[1].payload;
    assert_eq!(first.len(), ddp::HEADER_LEN + ddp::MAX_DATALEN);
    assert_eq!(last.len(), ddp::HEADER_LEN + 360);

    // Only the last packet pushes
    assert_eq!(first[0], ddp::VER1);
    assert_eq!(last[0], ddp::VER1 | ddp::PUSH);

    // Offsets are byte offsets into the frame
    assert_eq!(u32::from_be_bytes([first[4], first[5], first[6], first[7]]), 0);
    assert_eq!(
        u32::from_be_bytes([last[4], last[5], last[6], last[7]]),
        ddp::MAX_DATALEN as u32
    );
    assert_eq!(u16::from_be_bytes([last[8], last[9]]), 360);
    assert_eq!(&last[ddp::HEADER_LEN..], &rgb[ddp::MAX_DATALEN..]);
}

#[test]
fn test_ddp_sequence_cycles() {
    let mut encoder = DdpEncoder::new(target(4048));
    let sequences: Vec<u8> = (0..16)
        .map(|_| encoder.encode(&[0, 0, 0]).unwrap()[0].payload[1])
        .collect();
    // First frame counts as frame 1, so the cycle starts at 2
    assert_eq!(sequences[0], 2);
    assert_eq!(sequences[13], 15);
    assert_eq!(sequences[14], 1);
    assert_eq!(sequences[15], 2);
    assert!(sequences.iter().all(|s| (1..=15).contains(s)));
    assert_eq!(encoder.frame_count(), 16);
}

#[test]
fn test_ddp_placeholder_target() {
    let placeholder = DdpEncoder::new(SocketAddr::from((Ipv4Addr::LOCALHOST, ddp::DEFAULT_PORT)));
    assert!(placeholder.is_placeholder());
    assert!(!DdpEncoder::new(target(4048)).is_placeholder());
}

#[test]
fn test_e131_spans_universes() {
    let config = E131Config {
        universe: 3,
        universe_size: 510,
        ..E131Config::default()
    };
    // 200 RGB pixels = 600 channels: 510 in universe 3, 90 in universe 4
    let mut encoder = E131Encoder::new(&config, E131Target::Unicast(target(5568)), 200).unwrap();
    let map = encoder.universe_map();
    assert_eq!((map.first_universe(), map.last_universe()), (3, 4));
    assert_eq!(map.channel_count(), 600);
    let rgb = vec![7u8; 600];

    let datagrams = encoder.encode(&rgb).unwrap();
    assert_eq!(datagrams.len(), 2);

    let universe = |p: &[u8]| u16::from_be_bytes([p[113], p[114]]);
    assert_eq!(universe(&datagrams[0].payload), 3);
    assert_eq!(universe(&datagrams[1].payload), 4);

    let second = &datagrams[1].payload;
    // DMX start code, then 90 set slots and zero padding
    assert_eq!(second[125], 0);
    assert!(second[126..126 + 90].iter().all(|&b| b == 7));
    assert!(second[126 + 90..].iter().all(|&b| b == 0));

    // Priority and root vector
    assert_eq!(second[108], 100);
    assert_eq!(&second[4..13], b"ASC-E1.17");
}

#[test]
fn test_e131_multicast_groups() {
    let config = E131Config {
        universe: 1,
        ..E131Config::default()
    };
    let mut encoder = E131Encoder::new(&config, E131Target::Multicast { port: 5568 }, 300).unwrap();
    let datagrams = encoder.encode(&vec![1u8; 900]).unwrap();

    let groups: Vec<IpAddr> = datagrams.iter().map(|d| d.target.ip()).collect();
    assert_eq!(
        groups,
        vec![
            IpAddr::V4(multicast_group(1)),
            IpAddr::V4(multicast_group(2))
        ]
    );
    assert_eq!(multicast_group(258), Ipv4Addr::new(239, 255, 1, 2));
}

#[test]
fn test_e131_rgbw_and_offset() {
    let config = E131Config {
        channel_offset: 10,
        channels_per_pixel: ChannelLayout::Rgbw,
        ..E131Config::default()
    };
    let mut encoder = E131Encoder::new(&config, E131Target::Unicast(target(5568)), 2).unwrap();
    let datagrams = encoder.encode(&[1, 2, 3, 4, 5, 6]).unwrap();
    assert_eq!(datagrams.len(), 1);

    let slots = &datagrams[0].payload[126..];
    assert!(slots[..10].iter().all(|&b| b == 0));
    assert_eq!(&slots[10..18], &[1, 2, 3, 0, 4, 5, 6, 0]);
}

#[test]
fn test_e131_rejects_wrong_frame_size() {
    let mut encoder =
        E131Encoder::new(&E131Config::default(), E131Target::Unicast(target(5568)), 10).unwrap();
    assert!(encoder.encode(&[0u8; 27]).is_err());
}

#[test]
fn test_e131_blackout_zeroes_slots() {
    let mut encoder =
        E131Encoder::new(&E131Config::default(), E131Target::Unicast(target(5568)), 4).unwrap();
    encoder.encode(&[255u8; 12]).unwrap();

    let blackout = encoder.blackout();
    assert_eq!(blackout.len(), 1);
    assert!(blackout[0].payload[126..].iter().all(|&b| b == 0));
}

#[test]
fn test_artnet_packets() {
    let config = ArtNetConfig {
        universe: 0x0102,
        universe_size: 6,
        ..ArtNetConfig::default()
    };
    let mut encoder = ArtNetEncoder::new(&config, target(6454), 3).unwrap();
    assert_eq!(encoder.universe_map().universe_count(), 2);

    // 9 channels over 6-channel universes
    let datagrams = encoder.encode(&[9u8; 9]).unwrap();
    assert_eq!(datagrams.len(), 2);

    let first = &datagrams[0].payload;
    assert_eq!(&first[..8], b"Art-Net\0");
    assert_eq!(u16::from_le_bytes([first[8], first[9]]), 0x5000);
    assert_eq!(u16::from_be_bytes([first[10], first[11]]), 14);
    // Port address low byte, then net
    assert_eq!((first[14], first[15]), (0x02, 0x01));
    assert_eq!(u16::from_be_bytes([first[16], first[17]]), 6);

    let second = &datagrams[1].payload;
    assert_eq!((second[14], second[15]), (0x03, 0x01));
    assert_eq!(&second[18..], &[9, 9, 9, 0, 0, 0]);
}

#[test]
fn test_artnet_sequence_skips_zero() {
    let config = ArtNetConfig {
        universe_size: 6,
        ..ArtNetConfig::default()
    };
    let mut encoder = ArtNetEncoder::new(&config, target(6454), 2).unwrap();

    let sequences: Vec<u8> = (0..256)
        .map(|_| encoder.encode(&[0u8; 6]).unwrap()[0].payload[12])
        .collect();
    assert_eq!(sequences[0], 1);
    assert_eq!(sequences[254], 255);
    assert_eq!(sequences[255], 1);
    assert!(!sequences.contains(&0));
}

#[test]
fn test_artnet_rejects_odd_universe_size() {
    let config = ArtNetConfig {
        universe_size: 511,
        ..ArtNetConfig::default()
    };
    assert!(ArtNetEncoder::new(&config, target(6454), 10).is_err());
}

#[test]
fn test_encoders_reject_offset_past_universe() {
    let e131 = E131Config {
        universe_size: 510,
        channel_offset: 510,
        ..E131Config::default()
    };
    assert!(E131Encoder::new(&e131, E131Target::Unicast(target(5568)), 10).is_err());

    let artnet = ArtNetConfig {
        universe_size: 510,
        channel_offset: 600,
        ..ArtNetConfig::default()
    };
    assert!(ArtNetEncoder::new(&artnet, target(6454), 10).is_err());
}

#[test]
fn test_set_host_keeps_port() {
    let mut encoder = DdpEncoder::new(target(4049));
    encoder.set_host(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9)));
    assert_eq!(encoder.target(), SocketAddr::from(([10, 0, 0, 9], 4049)));
    assert_eq!(encoder.destination(), "ddp://10.0.0.9:4049");
}
