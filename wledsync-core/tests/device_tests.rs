//! Integration tests for device workers and multicast fan-out

mod mocks;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use mocks::UdpSink;
use wledsync_core::config::E131Config;
use wledsync_core::output::{DeviceHandle, DeviceOptions, MulticastRouter, SwapEffect};
use wledsync_core::protocol::e131::E131Target;
use wledsync_core::protocol::{ddp, DdpEncoder, E131Encoder};
use wledsync_core::Frame;

async fn ddp_device(name: &str, target: SocketAddr, options: DeviceOptions) -> DeviceHandle {
    DeviceHandle::spawn(name, Box::new(DdpEncoder::new(target)), options)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_ddp_frame_reaches_device() {
    let sink = UdpSink::bind().await;
    let mut device = ddp_device("strip", sink.addr(), DeviceOptions::default()).await;

    let frame = Frame::solid(4, 2, [10, 20, 30]);
    assert!(device.send_frame(frame.into_bytes()));

    let packet = &sink.expect(1).await[0];
    assert_eq!(packet[0], ddp::VER1 | ddp::PUSH);
    assert_eq!(u16::from_be_bytes([packet[8], packet[9]]), 24);
    assert_eq!(&packet[ddp::HEADER_LEN..ddp::HEADER_LEN + 3], &[10, 20, 30]);

    device.shutdown().await;
    let stats = device.stats().snapshot();
    assert_eq!(stats.frames, 1);
    assert_eq!(stats.packets, 1);
    assert_eq!(stats.bytes, (ddp::HEADER_LEN + 24) as u64);
    assert!(stats.connected);
    assert!(!device.is_running());
}

#[tokio::test]
async fn test_retry_repeats_datagrams() {
    let sink = UdpSink::bind().await;
    let options = DeviceOptions {
        retry_number: 2,
        ..DeviceOptions::default()
    };
    let mut device = ddp_device("lossy", sink.addr(), options).await;

    device.send_frame(vec![1, 2, 3]);
    let packets = sink.expect(3).await;
    assert!(packets.iter().all(|p| p == &packets[0]));
    assert!(sink.recv(Duration::from_millis(100)).await.is_none());

    device.shutdown().await;
    assert_eq!(device.stats().packets(), 3);
    assert_eq!(device.stats().frames(), 1);
}

#[tokio::test]
async fn test_placeholder_sends_nothing() {
    let placeholder = SocketAddr::from((Ipv4Addr::LOCALHOST, ddp::DEFAULT_PORT));
    let mut device = ddp_device("unset", placeholder, DeviceOptions::default()).await;

    for _ in 0..3 {
        device.send_frame(vec![0; 30]);
    }
    device.shutdown().await;

    let stats = device.stats().snapshot();
    assert_eq!(stats.frames, 3);
    assert_eq!(stats.packets, 0);
}

#[tokio::test]
async fn test_set_host_moves_output() {
    let first = UdpSink::bind().await;
    let second_ip = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 2));
    let second = UdpSink::bind_to(SocketAddr::new(second_ip, first.port())).await;

    let mut device = ddp_device("mover", first.addr(), DeviceOptions::default()).await;
    device.send_frame(vec![1, 1, 1]);
    first.expect(1).await;

    device.set_host(second_ip).await.unwrap();
    device.send_frame(vec![2, 2, 2]);
    let packet = &second.expect(1).await[0];
    assert_eq!(&packet[ddp::HEADER_LEN..], &[2, 2, 2]);
    assert!(first.recv(Duration::from_millis(100)).await.is_none());

    device.shutdown().await;
}

#[tokio::test]
async fn test_e131_blackout_on_shutdown() {
    let sink = UdpSink::bind().await;
    let encoder = E131Encoder::new(&E131Config::default(), E131Target::Unicast(sink.addr()), 2)
        .unwrap();
    let mut device = DeviceHandle::spawn("dmx", Box::new(encoder), DeviceOptions::default())
        .await
        .unwrap();

    device.send_frame(vec![255; 6]);
    let lit = &sink.expect(1).await[0];
    assert_eq!(&lit[126..132], &[255; 6]);

    device.shutdown().await;
    let dark = &sink.expect(1).await[0];
    assert!(dark[126..].iter().all(|&b| b == 0));
    // Each packet carries the next sequence number
    assert_eq!(dark[111], lit[111].wrapping_add(1));
}

#[tokio::test]
async fn test_full_queue_drops_frames() {
    let sink = UdpSink::bind().await;
    let options = DeviceOptions {
        queue_capacity: 1,
        ..DeviceOptions::default()
    };
    let device = ddp_device("slow", sink.addr(), options).await;

    // The worker cannot drain between two synchronous sends on this task
    let accepted: Vec<bool> = (0..5).map(|_| device.send_frame(vec![0; 3])).collect();
    assert!(accepted[0]);
    assert!(accepted.iter().any(|ok| !ok));
    assert!(device.stats().dropped() >= 1);
}

#[tokio::test]
async fn test_router_routes_tiles() {
    let left = UdpSink::bind().await;
    let right = UdpSink::bind().await;
    let devices = vec![
        ddp_device("left", left.addr(), DeviceOptions::default()).await,
        ddp_device("right", right.addr(), DeviceOptions::default()).await,
    ];
    let mut router = MulticastRouter::new(devices);
    assert_eq!(router.routes(), vec![Some(0), Some(1)]);

    let tiles = || vec![Frame::solid(1, 1, [1, 0, 0]), Frame::solid(1, 1, [2, 0, 0])];

    let result = router.send_tiles(tiles()).await;
    assert_eq!(result.sent, 2);
    assert_eq!(left.expect(1).await[0][ddp::HEADER_LEN], 1);
    assert_eq!(right.expect(1).await[0][ddp::HEADER_LEN], 2);

    // The first tick applies right away, the next one is far off
    let swapper = router.swapper();
    swapper
        .start(SwapEffect::Circular, Duration::from_secs(60))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(router.routes(), vec![Some(1), Some(0)]);

    router.send_tiles(tiles()).await;
    assert_eq!(left.expect(1).await[0][ddp::HEADER_LEN], 2);
    assert_eq!(right.expect(1).await[0][ddp::HEADER_LEN], 1);

    swapper.stop();
    assert_eq!(router.routes(), vec![Some(0), Some(1)]);

    let result = router.broadcast(&Frame::solid(1, 1, [9, 9, 9])).await;
    assert_eq!(result.sent, 2);
    assert_eq!(left.expect(1).await[0][ddp::HEADER_LEN], 9);
    assert_eq!(right.expect(1).await[0][ddp::HEADER_LEN], 9);

    router.shutdown().await;
}
