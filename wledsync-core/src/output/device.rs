//! UDP transmitter for a single LED controller
//!
//! Each device owns a worker task and a bounded queue. The cast loop never
//! waits on the network: frames are handed over with [`DeviceHandle::send_frame`]
//! and dropped when the worker falls behind.

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{Result, WledSyncError};
use crate::protocol::{Datagram, PacketEncoder};

/// Default frame queue depth per device
pub const DEFAULT_QUEUE_CAPACITY: usize = 500;

/// Commands understood by the device worker
#[derive(Debug)]
enum DeviceCommand {
    Frame(Vec<u8>),
    SetHost(IpAddr),
    Blackout,
    Shutdown { blackout: bool },
}

/// Live counters of a device
#[derive(Debug)]
pub struct DeviceStats {
    frames: AtomicU64,
    packets: AtomicU64,
    bytes: AtomicU64,
    dropped: AtomicU64,
    errors: AtomicU64,
    connected: AtomicBool,
}

impl Default for DeviceStats {
    fn default() -> Self {
        Self {
            frames: AtomicU64::new(0),
            packets: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            connected: AtomicBool::new(true),
        }
    }
}

impl DeviceStats {
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn packets(&self) -> u64 {
        self.packets.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> DeviceStatsSnapshot {
        DeviceStatsSnapshot {
            frames: self.frames(),
            packets: self.packets(),
            bytes: self.bytes(),
            dropped: self.dropped(),
            errors: self.errors(),
            connected: self.is_connected(),
        }
    }
}

/// Point-in-time copy of [`DeviceStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatsSnapshot {
    pub frames: u64,
    pub packets: u64,
    pub bytes: u64,
    pub dropped: u64,
    pub errors: u64,
    pub connected: bool,
}

/// Options for spawning a device worker
#[derive(Debug, Clone)]
pub struct DeviceOptions {
    /// Extra sends of each datagram
    pub retry_number: u32,
    /// Frame queue depth
    pub queue_capacity: usize,
    /// Send the protocol blackout on shutdown
    pub blackout_on_stop: bool,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            retry_number: 0,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            blackout_on_stop: true,
        }
    }
}

/// Handle to a running device worker
#[derive(Debug)]
pub struct DeviceHandle {
    name: String,
    destination: String,
    tx: mpsc::Sender<DeviceCommand>,
    stats: Arc<DeviceStats>,
    overflowing: AtomicBool,
    blackout_on_stop: bool,
    worker: Option<JoinHandle<()>>,
}

impl DeviceHandle {
    /// Bind a UDP socket and start the worker task
    pub async fn spawn(
        name: impl Into<String>,
        encoder: Box<dyn PacketEncoder>,
        options: DeviceOptions,
    ) -> Result<Self> {
        let name = name.into();
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| WledSyncError::device(format!("{}: failed to bind UDP socket: {}", name, e)))?;
        socket
            .set_broadcast(true)
            .map_err(|e| WledSyncError::device(format!("{}: failed to enable broadcast: {}", name, e)))?;

        let destination = encoder.destination();
        let (tx, rx) = mpsc::channel(options.queue_capacity.max(1));
        let stats = Arc::new(DeviceStats::default());

        info!(
            "Device {} -> {} ({} protocol, retry {})",
            name,
            destination,
            encoder.protocol(),
            options.retry_number
        );
        if encoder.is_placeholder() {
            warn!("Device {} has no destination configured, nothing will be sent", name);
        }

        let worker = DeviceWorker {
            name: name.clone(),
            encoder,
            link: Link {
                socket,
                stats: Arc::clone(&stats),
                retry_number: options.retry_number,
            },
        };
        let handle = tokio::spawn(worker.run(rx));

        Ok(Self {
            name,
            destination,
            tx,
            stats,
            overflowing: AtomicBool::new(false),
            blackout_on_stop: options.blackout_on_stop,
            worker: Some(handle),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Destination as it was when the device started
    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn stats(&self) -> &Arc<DeviceStats> {
        &self.stats
    }

    /// Queue a frame without waiting
    ///
    /// Returns `false` when the queue is full and the frame was dropped.
    pub fn send_frame(&self, data: Vec<u8>) -> bool {
        match self.tx.try_send(DeviceCommand::Frame(data)) {
            Ok(()) => {
                if self.overflowing.swap(false, Ordering::Relaxed) {
                    debug!("Device {} queue drained", self.name);
                }
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                if !self.overflowing.swap(true, Ordering::Relaxed) {
                    error!(
                        "Device {} queue is full ({} frames), dropping frames",
                        self.name,
                        self.tx.max_capacity()
                    );
                }
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Queue a frame, waiting at most `timeout` for room
    pub async fn send_frame_timeout(&self, data: Vec<u8>, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.tx.send(DeviceCommand::Frame(data))).await {
            Ok(Ok(())) => true,
            Ok(Err(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(_) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("Device {} did not accept a frame within {:?}", self.name, timeout);
                false
            }
        }
    }

    /// Point the device at another host
    pub async fn set_host(&self, host: IpAddr) -> Result<()> {
        self.tx
            .send(DeviceCommand::SetHost(host))
            .await
            .map_err(|_| WledSyncError::device(format!("Device {} is stopped", self.name)))
    }

    /// Switch every output of the device off
    pub async fn blackout(&self) -> Result<()> {
        self.tx
            .send(DeviceCommand::Blackout)
            .await
            .map_err(|_| WledSyncError::device(format!("Device {} is stopped", self.name)))
    }

    /// Stop the worker and wait for it, after the blackout when configured
    pub async fn shutdown(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        let command = DeviceCommand::Shutdown {
            blackout: self.blackout_on_stop,
        };
        if self.tx.send(command).await.is_err() {
            debug!("Device {} worker already gone", self.name);
        }

        if let Err(e) = worker.await {
            error!("Device {} worker panicked: {}", self.name, e);
        }
        info!(
            "Device {} stopped: {} frames, {} packets, {} dropped",
            self.name,
            self.stats.frames(),
            self.stats.packets(),
            self.stats.dropped()
        );
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

struct DeviceWorker {
    name: String,
    encoder: Box<dyn PacketEncoder>,
    link: Link,
}

/// Socket side of the worker, kept apart from the encoder so it can be
/// borrowed across awaits
struct Link {
    socket: UdpSocket,
    stats: Arc<DeviceStats>,
    retry_number: u32,
}

impl DeviceWorker {
    async fn run(mut self, mut rx: mpsc::Receiver<DeviceCommand>) {
        debug!("Device {} worker started", self.name);

        while let Some(command) = rx.recv().await {
            match command {
                DeviceCommand::Frame(data) => {
                    if self.encoder.is_placeholder() {
                        self.link.stats.frames.fetch_add(1, Ordering::Relaxed);
                        continue;
                    }
                    match self.encoder.encode(&data) {
                        Ok(datagrams) => {
                            self.link.send_all(&self.name, &datagrams).await;
                            self.link.stats.frames.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            self.link.stats.errors.fetch_add(1, Ordering::Relaxed);
                            error!("Device {}: {}", self.name, e);
                        }
                    }
                }
                DeviceCommand::SetHost(host) => {
                    self.encoder.set_host(host);
                    info!("Device {} now sends to {}", self.name, self.encoder.destination());
                }
                DeviceCommand::Blackout => {
                    let datagrams = self.encoder.blackout();
                    self.link.send_all(&self.name, &datagrams).await;
                }
                DeviceCommand::Shutdown { blackout } => {
                    if blackout && !self.encoder.is_placeholder() {
                        let datagrams = self.encoder.blackout();
                        if !datagrams.is_empty() {
                            debug!("Device {} blackout ({} packets)", self.name, datagrams.len());
                        }
                        self.link.send_all(&self.name, &datagrams).await;
                    }
                    break;
                }
            }
        }

        debug!("Device {} worker exiting", self.name);
    }
}

impl Link {
    async fn send_all(&self, name: &str, datagrams: &[Datagram]) {
        for datagram in datagrams {
            for _ in 0..=self.retry_number {
                match self.socket.send_to(&datagram.payload, datagram.target).await {
                    Ok(sent) => {
                        self.stats.packets.fetch_add(1, Ordering::Relaxed);
                        self.stats.bytes.fetch_add(sent as u64, Ordering::Relaxed);
                        if !self.stats.connected.swap(true, Ordering::Relaxed) {
                            warn!("Device {} connection re-established", name);
                        }
                    }
                    Err(e) => {
                        self.stats.errors.fetch_add(1, Ordering::Relaxed);
                        if self.stats.connected.swap(false, Ordering::Relaxed) {
                            error!(
                                "Device {} failed to send to {}: {}",
                                name, datagram.target, e
                            );
                        }
                        break;
                    }
                }
            }
        }
    }
}
