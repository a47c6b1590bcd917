//! Mock infrastructure for testing
//!
//! Provides test frames, a UDP sink standing in for an LED controller, a
//! fake WLED JSON API and helpers for media files on disk.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::{Json, Router};
use image::{Rgb, RgbImage};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinHandle;
use wledsync_core::types::Frame;

/// Create a frame with a gradient pattern
pub fn create_gradient_frame(width: u32, height: u32) -> Frame {
    let image = RgbImage::from_fn(width, height, |x, y| {
        let r = ((x as f32 / width as f32) * 255.0) as u8;
        let g = ((y as f32 / height as f32) * 255.0) as u8;
        let b = (((x + y) as f32 / (width + height) as f32) * 255.0) as u8;
        Rgb([r, g, b])
    });
    Frame::new(image, 0)
}

/// Create a frame whose pixels are numbered 0, 1, 2... in the red channel
pub fn create_indexed_frame(width: u32, height: u32) -> Frame {
    let image = RgbImage::from_fn(width, height, |x, y| Rgb([(y * width + x) as u8, 0, 0]));
    Frame::new(image, 0)
}

/// Write a solid color PNG and return its path
pub fn write_png(dir: &Path, name: &str, width: u32, height: u32, rgb: [u8; 3]) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_pixel(width, height, Rgb(rgb))
        .save(&path)
        .expect("Should write test image");
    path
}

/// UDP socket on localhost collecting what a device sends
pub struct UdpSink {
    socket: UdpSocket,
}

impl UdpSink {
    /// Bind on an ephemeral localhost port
    pub async fn bind() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0")
            .await
            .expect("Should bind UDP sink");
        Self { socket }
    }

    /// Bind on a given address, e.g. another loopback IP with a known port
    pub async fn bind_to(addr: SocketAddr) -> Self {
        let socket = UdpSocket::bind(addr).await.expect("Should bind UDP sink");
        Self { socket }
    }

    pub fn addr(&self) -> SocketAddr {
        self.socket.local_addr().expect("Should have local address")
    }

    pub fn port(&self) -> u16 {
        self.addr().port()
    }

    /// Next datagram, `None` if nothing arrives within `timeout`
    pub async fn recv(&self, timeout: Duration) -> Option<Vec<u8>> {
        let mut buf = vec![0u8; 2048];
        match tokio::time::timeout(timeout, self.socket.recv(&mut buf)).await {
            Ok(Ok(len)) => {
                buf.truncate(len);
                Some(buf)
            }
            _ => None,
        }
    }

    /// Collect `count` datagrams, panicking if they do not arrive in time
    pub async fn expect(&self, count: usize) -> Vec<Vec<u8>> {
        let mut packets = Vec::with_capacity(count);
        while packets.len() < count {
            match self.recv(Duration::from_secs(2)).await {
                Some(packet) => packets.push(packet),
                None => panic!(
                    "Expected {} datagrams, got {}",
                    count,
                    packets.len()
                ),
            }
        }
        packets
    }
}

/// WLED HTTP API on localhost serving a fixed `/json/info`
///
/// Bodies posted to `/json/state` are recorded in order.
pub struct FakeWled {
    addr: SocketAddr,
    states: Arc<Mutex<Vec<Value>>>,
    task: JoinHandle<()>,
}

impl FakeWled {
    pub async fn start(info: Value) -> Self {
        let states = Arc::new(Mutex::new(Vec::new()));
        let posted = Arc::clone(&states);

        let app = Router::new()
            .route(
                "/json/info",
                get(move || {
                    let info = info.clone();
                    async move { Json(info) }
                }),
            )
            .route(
                "/json/state",
                post(move |Json(body): Json<Value>| {
                    let posted = Arc::clone(&posted);
                    async move {
                        posted.lock().push(body);
                        Json(json!({ "success": true }))
                    }
                }),
            );

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Should bind fake WLED");
        let addr = listener.local_addr().expect("Should have local address");
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self { addr, states, task }
    }

    /// A 2D build with a `width` x `height` matrix
    pub async fn matrix(width: u32, height: u32) -> Self {
        Self::start(json!({
            "name": "Matrix",
            "ver": "0.14.4",
            "leds": { "count": width * height, "matrix": { "w": width, "h": height } },
            "udpport": 21324,
        }))
        .await
    }

    /// A 1D build, `/json/info` has no `leds.matrix`
    pub async fn strip(count: u32) -> Self {
        Self::start(json!({
            "name": "Strip",
            "ver": "0.14.4",
            "leds": { "count": count },
            "udpport": 21324,
        }))
        .await
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Bodies posted to `/json/state` so far
    pub fn states(&self) -> Vec<Value> {
        self.states.lock().clone()
    }
}

impl Drop for FakeWled {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gradient_frame_dimensions() {
        let frame = create_gradient_frame(64, 48);
        assert_eq!(frame.width(), 64);
        assert_eq!(frame.height(), 48);
        assert_eq!(frame.as_bytes().len(), 64 * 48 * 3);
    }

    #[test]
    fn test_indexed_frame() {
        let frame = create_indexed_frame(4, 2);
        let reds: Vec<u8> = frame.as_bytes().chunks(3).map(|px| px[0]).collect();
        assert_eq!(reds, vec![0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[tokio::test]
    async fn test_udp_sink_receives() {
        let sink = UdpSink::bind().await;
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"hello", sink.addr()).await.unwrap();
        assert_eq!(sink.expect(1).await[0], b"hello");
    }
}
