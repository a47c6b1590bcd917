//! Cast session
//!
//! Orchestrates the flow from a frame source to the LED devices:
//! capture, resize and color effects, matrix split, then one UDP worker per
//! device. Actions sent through an [`ActionSender`] are applied between two
//! frames.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::action::{
    encode_png_base64, ActionReply, ActionSender, CastAction, CastImageParams, CastInfo,
    CastRequest, Envelope, ImageBuffer, MulticastCommand,
};
use crate::capture::{open_source, FrameQueues, FrameSource, SourceFrame};
use crate::config::{CastConfig, Protocol};
use crate::error::{Result, WledSyncError};
use crate::matrix::{ordered_devices, split_into_matrix};
use crate::output::{self, wled, DeviceHandle, IpSwapper, MulticastRouter};
use crate::performance::{create_metrics, LatencyStats, PerformanceMetrics};
use crate::process::{pixelart, FrameProcessor};
use crate::types::{Frame, Handle, SourceInfo};

/// Wait between two polls of a source with nothing new
const PENDING_POLL: Duration = Duration::from_millis(10);

/// Totals shared by every cast of the process
#[derive(Debug)]
pub struct CastTotals {
    frames: AtomicU64,
    packets: AtomicU64,
    casts: AtomicU64,
}

static TOTALS: CastTotals = CastTotals {
    frames: AtomicU64::new(0),
    packets: AtomicU64::new(0),
    casts: AtomicU64::new(0),
};

impl CastTotals {
    pub fn global() -> &'static CastTotals {
        &TOTALS
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn packets(&self) -> u64 {
        self.packets.load(Ordering::Relaxed)
    }

    /// Casts started since the last reset
    pub fn casts(&self) -> u64 {
        self.casts.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.frames.store(0, Ordering::Relaxed);
        self.packets.store(0, Ordering::Relaxed);
        self.casts.store(0, Ordering::Relaxed);
    }
}

/// Pipeline state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    /// Source open, devices not started yet
    Idle,
    /// Reaching the devices
    Connecting,
    /// Casting frames
    Running,
    Stopping,
    Stopped,
    /// Stopped on a fatal error
    Error(String),
}

impl PipelineState {
    /// Whether the cast has not finished yet
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Idle | Self::Connecting | Self::Running)
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error(message) => write!(f, "Error ({})", message),
            other => write!(f, "{:?}", other),
        }
    }
}

enum Output {
    /// Protocol without network output
    Null,
    Single(DeviceHandle),
    Multicast {
        router: MulticastRouter,
        swapper: IpSwapper,
        /// Matrix to split frames over, `None` to send whole frames
        matrix: Option<(u32, u32)>,
    },
}

impl Output {
    /// Hand a processed frame to the devices, returning the frames dropped
    async fn send(&self, frame: Frame) -> Result<u64> {
        match self {
            Self::Null => Ok(0),
            Self::Single(device) => Ok(u64::from(!device.send_frame(frame.into_bytes()))),
            Self::Multicast {
                router,
                matrix: Some((cast_x, cast_y)),
                ..
            } => {
                let tiles = split_into_matrix(&frame, *cast_x, *cast_y)?;
                Ok(router.send_tiles(tiles).await.dropped as u64)
            }
            Self::Multicast { router, .. } => Ok(router.broadcast(&frame).await.dropped as u64),
        }
    }

    fn devices(&self) -> &[DeviceHandle] {
        match self {
            Self::Null => &[],
            Self::Single(device) => std::slice::from_ref(device),
            Self::Multicast { router, .. } => router.devices(),
        }
    }

    /// Packets and bytes sent so far by every device
    fn sent(&self) -> (u64, u64) {
        self.devices().iter().fold((0, 0), |(packets, bytes), device| {
            (
                packets + device.stats().packets(),
                bytes + device.stats().bytes(),
            )
        })
    }
}

/// Result of one blocking capture step
struct Grab {
    frame: SourceFrame,
    processed: Option<Result<Frame>>,
    shot: Option<Result<Frame>>,
    capture_time: Duration,
    process_time: Duration,
}

/// A cast from one source to one or several LED devices
pub struct Pipeline {
    handle: Handle,
    config: CastConfig,
    state: PipelineState,
    /// Taken while a blocking capture step runs
    source: Option<Box<dyn FrameSource>>,
    source_info: SourceInfo,
    /// Frames in the source, when known
    length: Option<usize>,
    rate: f64,
    processor: Arc<FrameProcessor>,
    output: Output,
    actions: ActionSender,
    actions_rx: mpsc::Receiver<Envelope>,
    metrics: Arc<PerformanceMetrics>,
    /// First `frame_max` processed frames, with `put_to_buffer`
    frame_buffer: Vec<Frame>,
    /// Pixel-art snapshots, oldest first
    snapshots: VecDeque<Frame>,
    shot_requested: bool,
    last_output: Option<Frame>,
    frames_processed: u64,
    frames_dropped: u64,
    /// Device counters at the previous frame
    sent: (u64, u64),
    /// Completed plays of the source
    plays: u32,
    pace_start: Instant,
    pace_frames: u64,
    start_time: Option<Instant>,
    started_at: SystemTime,
    last_frame_time: Option<Instant>,
}

impl Pipeline {
    /// Validate `config`, open its source and build the frame processor
    ///
    /// Devices are started by [`Pipeline::start`], or by the first call to
    /// [`Pipeline::process`].
    pub async fn new(config: CastConfig, queues: &FrameQueues) -> Result<Self> {
        config.validate_strict()?;
        for warning in config.validate() {
            warn!("{}", warning);
        }

        let source_spec = config.source.clone();
        let queues = queues.clone();
        let source = tokio::task::spawn_blocking(move || open_source(&source_spec, &queues))
            .await
            .map_err(|e| WledSyncError::capture(format!("Source task failed: {}", e)))??;

        let source_info = source.info();
        let length = source.frame_count();
        let rate = match source.rate_hint() {
            Some(native) if native > 0.0 => native.min(config.rate as f64),
            _ => config.rate as f64,
        };
        let processor = Arc::new(FrameProcessor::new(&config)?);
        let (actions, actions_rx) = ActionSender::channel();

        info!(
            "Cast '{}' from {} ({}) to {} {} at {:.1} fps",
            config.name, source_info.name, source_info.kind, config.protocol, config.host, rate
        );

        Ok(Self {
            handle: Handle::new(),
            config,
            state: PipelineState::Idle,
            source: Some(source),
            source_info,
            length,
            rate,
            processor,
            output: Output::Null,
            actions,
            actions_rx,
            metrics: create_metrics(),
            frame_buffer: Vec::new(),
            snapshots: VecDeque::new(),
            shot_requested: false,
            last_output: None,
            frames_processed: 0,
            frames_dropped: 0,
            sent: (0, 0),
            plays: 0,
            pace_start: Instant::now(),
            pace_frames: 0,
            start_time: None,
            started_at: SystemTime::now(),
            last_frame_time: None,
        })
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn config(&self) -> &CastConfig {
        &self.config
    }

    /// Sender for actions on this cast
    pub fn actions(&self) -> ActionSender {
        self.actions.clone()
    }

    pub fn metrics(&self) -> Arc<PerformanceMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Hosts driven by this cast
    fn hosts(&self) -> Vec<String> {
        if self.config.multicast.enabled {
            ordered_devices(&self.config.multicast.devices)
                .iter()
                .map(|d| d.ip.to_string())
                .collect()
        } else {
            vec![self.config.host.clone()]
        }
    }

    /// Reach the devices and start their workers
    pub async fn start(&mut self) -> Result<()> {
        if self.state != PipelineState::Idle {
            return Ok(());
        }
        self.state = PipelineState::Connecting;
        info!("Starting cast {} ({})", self.config.name, self.handle);

        if let Err(e) = self.connect().await {
            error!("Cast {} failed to start: {}", self.config.name, e);
            self.state = PipelineState::Error(e.to_string());
            return Err(e);
        }

        let now = Instant::now();
        self.start_time = Some(now);
        self.pace_start = now;
        self.pace_frames = 0;
        self.started_at = SystemTime::now();
        TOTALS.casts.fetch_add(1, Ordering::Relaxed);
        self.state = PipelineState::Running;
        Ok(())
    }

    async fn connect(&mut self) -> Result<()> {
        if self.config.wled && self.config.protocol.is_network() {
            self.prepare_wled().await;
        }

        let config = &self.config;
        self.output = if !config.protocol.is_network() {
            info!("Protocol {} has no network output", config.protocol);
            Output::Null
        } else if config.multicast.enabled {
            let mut devices = Vec::with_capacity(config.multicast.devices.len());
            for device in ordered_devices(&config.multicast.devices) {
                let name = format!("{}-{}", config.name, device.index);
                if let Some(handle) =
                    output::spawn_device(config, name, &device.ip.to_string()).await?
                {
                    devices.push(handle);
                }
            }
            let router = MulticastRouter::new(devices);
            let swapper = router.swapper();
            let matrix = config
                .multicast
                .is_matrix()
                .then_some((config.multicast.cast_x, config.multicast.cast_y));
            info!(
                "Multicast over {} devices, {}x{} matrix",
                router.len(),
                config.multicast.cast_x,
                config.multicast.cast_y
            );
            Output::Multicast {
                router,
                swapper,
                matrix,
            }
        } else {
            match output::spawn_device(config, config.name.clone(), &config.host).await? {
                Some(device) => Output::Single(device),
                None => Output::Null,
            }
        };
        Ok(())
    }

    /// Read the matrix size and switch live mode on, logging failures
    ///
    /// Only a matrix overrides the scale; a strip keeps the configured size.
    async fn prepare_wled(&mut self) {
        let clients = self.wled_clients();

        if !self.config.multicast.enabled {
            if let Some(client) = clients.first() {
                if !client.is_alive().await {
                    warn!(
                        "WLED device {} does not answer on port {}",
                        client.host(),
                        client.port()
                    );
                }
                match client.matrix_dimensions().await {
                    Ok(Some((width, height))) => {
                        info!("WLED {} matrix is {}x{}", client.host(), width, height);
                        self.config.scale_width = width;
                        self.config.scale_height = height;
                        Arc::make_mut(&mut self.processor).set_output_size(width, height);
                    }
                    Ok(None) => info!(
                        "WLED {} is a strip, keeping {}x{}",
                        client.host(),
                        self.config.scale_width,
                        self.config.scale_height
                    ),
                    Err(e) => warn!("Cannot read WLED matrix size: {}", e),
                }
            }
        }

        for client in &clients {
            if let Err(e) = client.set_live_mode(true, true).await {
                warn!("Cannot switch WLED {} to live mode: {}", client.host(), e);
            }
        }
    }

    fn wled_clients(&self) -> Vec<wled::WledClient> {
        self.hosts()
            .into_iter()
            .filter_map(|host| match wled::WledClient::with_port(host, self.config.wled_port) {
                Ok(client) => Some(client),
                Err(e) => {
                    warn!("{}", e);
                    None
                }
            })
            .collect()
    }

    /// Process one frame
    ///
    /// Call in a loop; returns `false` once the cast should stop.
    pub async fn process(&mut self) -> Result<bool> {
        match self.state {
            PipelineState::Idle => self.start().await?,
            PipelineState::Running => {}
            _ => return Ok(false),
        }

        self.handle_actions().await;
        if self.state != PipelineState::Running {
            return Ok(false);
        }

        if let Some(wait) = self.pace_delay() {
            tokio::time::sleep(wait).await;
        }

        let grab = self.grab().await?;
        self.metrics.record_capture(grab.capture_time);

        match grab.frame {
            SourceFrame::Frame(_) => {}
            SourceFrame::Pending => {
                tokio::time::sleep(PENDING_POLL).await;
                return Ok(true);
            }
            SourceFrame::End => return self.source_ended().await,
        }

        if let Some(shot) = grab.shot {
            match shot {
                Ok(snapshot) => self.store_snapshot(snapshot),
                Err(e) => warn!("Snapshot failed: {}", e),
            }
        }

        let frame = match grab.processed {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                warn!("Dropping frame: {}", e);
                self.frames_dropped += 1;
                self.metrics.record_frames_dropped(1);
                return Ok(true);
            }
            None => return Ok(true),
        };
        self.metrics.record_process(grab.process_time);

        let now = Instant::now();
        if let Some(last) = self.last_frame_time {
            self.metrics.record_frame_time(now.duration_since(last));
        }
        self.last_frame_time = Some(now);

        if self.config.put_to_buffer && self.frame_buffer.len() < self.config.frame_max {
            self.frame_buffer.push(frame.clone());
        }
        self.last_output = Some(frame.clone());

        let send_start = Instant::now();
        let dropped = self.output.send(frame).await?;
        self.metrics.record_send(send_start.elapsed());

        self.frames_processed += 1;
        self.pace_frames += 1;
        self.metrics.record_frame_processed();
        if dropped > 0 {
            self.frames_dropped += dropped;
            self.metrics.record_frames_dropped(dropped);
        }

        let sent = self.output.sent();
        let (packets, bytes) = (sent.0 - self.sent.0, sent.1 - self.sent.1);
        self.sent = sent;
        self.metrics.record_output(packets, bytes);
        TOTALS.frames.fetch_add(1, Ordering::Relaxed);
        TOTALS.packets.fetch_add(packets, Ordering::Relaxed);

        trace!("Frame {} sent ({} packets)", self.frames_processed, packets);
        Ok(true)
    }

    /// Time left until the next frame is due, `None` when behind
    fn pace_delay(&self) -> Option<Duration> {
        let interval = Duration::from_secs_f64(1.0 / self.rate.max(1.0));
        let expected = self.pace_start + interval.mul_f64(self.pace_frames as f64);
        expected
            .checked_duration_since(Instant::now())
            .filter(|wait| !wait.is_zero())
    }

    /// Pull and process the next frame off the async runtime
    async fn grab(&mut self) -> Result<Grab> {
        let Some(mut source) = self.source.take() else {
            return Err(WledSyncError::capture("Source is not available"));
        };
        let processor = Arc::clone(&self.processor);
        let shot_size = self.shot_requested.then(|| self.processor.output_size());

        let joined = tokio::task::spawn_blocking(move || {
            let capture_start = Instant::now();
            let polled = source.next_frame();
            let capture_time = capture_start.elapsed();

            let grab = polled.map(|frame| {
                let process_start = Instant::now();
                let (processed, shot) = match &frame {
                    SourceFrame::Frame(raw) => (
                        Some(processor.process(raw)),
                        shot_size.map(|(w, h)| pixelart(raw, w, h)),
                    ),
                    _ => (None, None),
                };
                Grab {
                    frame,
                    processed,
                    shot,
                    capture_time,
                    process_time: process_start.elapsed(),
                }
            });
            (source, grab)
        })
        .await;

        match joined {
            Ok((source, grab)) => {
                self.source = Some(source);
                let grab = grab?;
                if grab.shot.is_some() {
                    self.shot_requested = false;
                }
                Ok(grab)
            }
            Err(e) => {
                let message = format!("Capture task failed: {}", e);
                self.state = PipelineState::Error(message.clone());
                Err(WledSyncError::capture(message))
            }
        }
    }

    /// Replay or stop when the source runs out
    async fn source_ended(&mut self) -> Result<bool> {
        let repeat = self.config.repeat;
        if repeat >= 0 && self.plays >= repeat as u32 {
            info!(
                "Source {} ended after {} plays",
                self.source_info.name,
                self.plays + 1
            );
            self.state = PipelineState::Stopping;
            return Ok(false);
        }

        self.plays += 1;
        debug!("Replaying {} (play {})", self.source_info.name, self.plays + 1);

        let Some(mut source) = self.source.take() else {
            return Err(WledSyncError::capture("Source is not available"));
        };
        let (source, restarted) = tokio::task::spawn_blocking(move || {
            let result = source.restart();
            (source, result)
        })
        .await
        .map_err(|e| WledSyncError::capture(format!("Restart task failed: {}", e)))?;
        self.source = Some(source);
        restarted?;

        self.pace_start = Instant::now();
        self.pace_frames = 0;
        Ok(true)
    }

    fn store_snapshot(&mut self, snapshot: Frame) {
        let max = self.config.frame_max.max(1);
        while self.snapshots.len() >= max {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(snapshot);
        info!("Snapshot stored ({} in buffer)", self.snapshots.len());
    }

    /// Apply every queued request
    async fn handle_actions(&mut self) {
        while let Ok(envelope) = self.actions_rx.try_recv() {
            let reply = self.handle_request(envelope.request).await;
            if let Err(e) = &reply {
                warn!("Cast {}: {}", self.config.name, e);
            }
            if let Some(tx) = envelope.reply {
                let _ = tx.send(reply);
            }
        }
    }

    async fn handle_request(&mut self, request: CastRequest) -> Result<ActionReply> {
        match request {
            CastRequest::Action(action) => {
                debug!("Cast {}: action {}", self.config.name, action.name());
                self.apply_action(action).await
            }
            CastRequest::Stats => Ok(ActionReply::Stats(Box::new(self.stats()))),
            CastRequest::Snapshots => Ok(ActionReply::Snapshots(self.snapshots.len())),
            CastRequest::SaveSnapshot { index, path } => {
                self.save_snapshot(index, &path)?;
                Ok(ActionReply::Done)
            }
        }
    }

    async fn apply_action(&mut self, action: CastAction) -> Result<ActionReply> {
        match action {
            CastAction::Stop => {
                info!("Stop requested for cast {}", self.config.name);
                self.state = PipelineState::Stopping;
                Ok(ActionReply::Done)
            }
            CastAction::Shot => {
                self.shot_requested = true;
                Ok(ActionReply::Done)
            }
            CastAction::Info { with_image } => {
                Ok(ActionReply::Info(Box::new(self.info(with_image)?)))
            }
            CastAction::Reset => {
                TOTALS.reset();
                info!("Cast totals reset");
                Ok(ActionReply::Done)
            }
            CastAction::Host(ip) => match &self.output {
                Output::Single(device) => {
                    device.set_host(ip.into()).await?;
                    self.config.host = ip.to_string();
                    info!("Cast {} now sends to {}", self.config.name, ip);
                    Ok(ActionReply::Done)
                }
                _ => Ok(ActionReply::Ignored(
                    "host only applies to single device casts".to_string(),
                )),
            },
            CastAction::Multicast(command) => match &self.output {
                Output::Multicast { swapper, .. } => {
                    match command {
                        MulticastCommand::Stop => swapper.stop(),
                        MulticastCommand::Start { effect, delay } => swapper.start(effect, delay)?,
                    }
                    Ok(ActionReply::Done)
                }
                _ => Ok(ActionReply::Ignored("cast is not multicast".to_string())),
            },
            CastAction::OpenPreview | CastAction::ClosePreview => {
                warn!("Preview window is not available, ignoring {}", action.name());
                Ok(ActionReply::Ignored("preview is not available".to_string()))
            }
            CastAction::CastImage(params) => self.cast_image(params),
        }
    }

    fn info(&self, with_image: bool) -> Result<CastInfo> {
        let image = match (&self.last_output, with_image) {
            (Some(frame), true) => Some(encode_png_base64(frame)?),
            _ => None,
        };
        Ok(CastInfo {
            name: self.config.name.clone(),
            start_time: self
                .started_at
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| d.as_secs()),
            source: self.config.source.to_string(),
            protocol: self.config.protocol.to_string(),
            multicast: self.config.multicast.enabled,
            devices: self.hosts(),
            scale: (self.config.scale_width, self.config.scale_height),
            fps: self.config.rate,
            frames: self.frames_processed,
            length: self.length,
            image,
        })
    }

    fn save_snapshot(&self, index: usize, path: &Path) -> Result<()> {
        let frame = self.snapshots.get(index).ok_or_else(|| {
            WledSyncError::action(format!(
                "No snapshot {} ({} stored)",
                index,
                self.snapshots.len()
            ))
        })?;
        frame.image.save(path)?;
        info!("Snapshot {} saved to {}", index, path.display());
        Ok(())
    }

    /// Send one buffered image to a device from a background task
    fn cast_image(&self, params: CastImageParams) -> Result<ActionReply> {
        let frame = match params.buffer_name {
            ImageBuffer::Buffer => self.frame_buffer.get(params.image_number),
            ImageBuffer::Multicast => self.snapshots.get(params.image_number),
        }
        .cloned()
        .ok_or_else(|| {
            WledSyncError::action(format!("No image {} in buffer", params.image_number))
        })?;

        let host = if params.device_number < 0 {
            self.config.host.clone()
        } else {
            ordered_devices(&self.config.multicast.devices)
                .get(params.device_number as usize)
                .map(|d| d.ip.to_string())
                .ok_or_else(|| {
                    WledSyncError::action(format!("No cast device {}", params.device_number))
                })?
        };
        if host.parse().is_ok_and(output::is_null_host) {
            warn!("Nothing to do for localhost");
            return Ok(ActionReply::Ignored("nothing to do for localhost".to_string()));
        }

        let mut config = self.config.clone();
        config.retry_number = params.retry_number;
        config.e131.blackout = false;
        config.artnet.blackout = false;
        if config.protocol == Protocol::Other {
            config.protocol = Protocol::Ddp;
        }

        tokio::spawn(async move {
            let mut device = match output::spawn_device(&config, "cast-image", &host).await {
                Ok(Some(device)) => device,
                Ok(None) => return,
                Err(e) => {
                    error!("cast_image to {}: {}", host, e);
                    return;
                }
            };

            let data = frame.into_bytes();
            if params.fps_number == 0 {
                device.send_frame(data);
            } else {
                let interval = Duration::from_secs_f64(1.0 / params.fps_number as f64);
                let until = Instant::now() + Duration::from_millis(params.duration_number);
                while Instant::now() < until {
                    device.send_frame(data.clone());
                    tokio::time::sleep(interval).await;
                }
            }
            device.shutdown().await;
        });

        Ok(ActionReply::Done)
    }

    /// Stop the cast: effects, devices, then WLED live mode
    pub async fn stop(&mut self) -> Result<()> {
        if self.state == PipelineState::Stopped {
            return Ok(());
        }
        let failed = matches!(self.state, PipelineState::Error(_));
        if !failed {
            self.state = PipelineState::Stopping;
        }
        info!("Stopping cast {} ({})", self.config.name, self.handle);

        self.actions_rx.close();
        self.handle_actions().await;

        match &mut self.output {
            Output::Null => {}
            Output::Single(device) => device.shutdown().await,
            Output::Multicast {
                router, swapper, ..
            } => {
                swapper.stop();
                router.shutdown().await;
            }
        }

        if self.config.wled && self.config.wled_live_off && self.config.protocol.is_network() {
            for client in self.wled_clients() {
                if let Err(e) = client.set_live_mode(true, false).await {
                    warn!("Cannot switch WLED {} out of live mode: {}", client.host(), e);
                }
            }
        }

        self.source = None;
        if !failed {
            self.state = PipelineState::Stopped;
        }

        let stats = self.stats();
        info!(
            "Cast {} stopped - {} frames in {:.1}s ({:.1} fps), {} dropped, {} packets",
            self.config.name,
            stats.frames_processed,
            stats.elapsed_seconds,
            stats.actual_fps,
            stats.frames_dropped,
            stats.latency.packets_sent
        );
        Ok(())
    }

    /// Process frames until the cast stops, then stop it
    pub async fn run_until_stopped(&mut self) -> Result<PipelineStats> {
        let result = loop {
            match self.process().await {
                Ok(true) => continue,
                Ok(false) => break Ok(()),
                Err(e) => {
                    error!("Cast {} failed: {}", self.config.name, e);
                    self.state = PipelineState::Error(e.to_string());
                    break Err(e);
                }
            }
        };
        self.stop().await?;
        result.map(|_| self.stats())
    }

    pub fn is_running(&self) -> bool {
        self.state.is_active()
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &Frame> {
        self.snapshots.iter()
    }

    pub fn frame_buffer(&self) -> &[Frame] {
        &self.frame_buffer
    }

    /// Current route table, for multicast casts
    pub fn routes(&self) -> Option<Vec<Option<usize>>> {
        match &self.output {
            Output::Multicast { router, .. } => Some(router.routes()),
            _ => None,
        }
    }

    pub fn stats(&self) -> PipelineStats {
        let elapsed = self
            .start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        let devices = self.output.devices();

        PipelineStats {
            handle: self.handle.as_u64(),
            name: self.config.name.clone(),
            state: self.state.clone(),
            source: self.config.source.to_string(),
            protocol: self.config.protocol,
            resolution: self.processor.output_size(),
            fps: self.config.rate,
            frames_processed: self.frames_processed,
            frames_dropped: self.frames_dropped,
            devices: devices.len(),
            devices_connected: devices
                .iter()
                .filter(|d| d.stats().is_connected())
                .count(),
            actual_fps: if elapsed > 0.0 {
                self.frames_processed as f64 / elapsed
            } else {
                0.0
            },
            elapsed_seconds: elapsed,
            latency: self.metrics.get_stats(),
            total_frames: TOTALS.frames(),
            total_packets: TOTALS.packets(),
        }
    }
}

/// Pipeline statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStats {
    pub handle: u64,
    pub name: String,
    pub state: PipelineState,
    pub source: String,
    pub protocol: Protocol,
    /// Processed frame size, before any matrix split
    pub resolution: (u32, u32),
    /// Target framerate
    pub fps: u32,
    pub frames_processed: u64,
    /// Frames a device queue refused or a processing step failed on
    pub frames_dropped: u64,
    pub devices: usize,
    pub devices_connected: usize,
    pub actual_fps: f64,
    pub elapsed_seconds: f64,
    pub latency: LatencyStats,
    /// Frames sent by every cast since the last reset
    pub total_frames: u64,
    pub total_packets: u64,
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cast {} ({}): {} - {} {}x{} @ {}fps (actual: {:.1}fps), {}/{} devices up, {} frames, {} dropped, {} packets",
            self.name,
            self.handle,
            self.state,
            self.protocol,
            self.resolution.0,
            self.resolution.1,
            self.fps,
            self.actual_fps,
            self.devices_connected,
            self.devices,
            self.frames_processed,
            self.frames_dropped,
            self.latency.packets_sent
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CastSource;

    fn queue_config() -> CastConfig {
        CastConfig::new(CastSource::queue("test"))
            .with_protocol(Protocol::Other)
            .with_scale(4, 4)
            .with_rate(100)
    }

    #[test]
    fn test_state_display() {
        assert_eq!(PipelineState::Running.to_string(), "Running");
        assert_eq!(
            PipelineState::Error("boom".into()).to_string(),
            "Error (boom)"
        );
    }

    #[tokio::test]
    async fn test_queue_frame_is_processed() {
        let queues = FrameQueues::new();
        let mut pipeline = Pipeline::new(queue_config(), &queues).await.unwrap();
        assert_eq!(*pipeline.state(), PipelineState::Idle);

        queues.push("test", Frame::solid(8, 8, [255, 255, 255]));
        assert!(pipeline.process().await.unwrap());
        assert_eq!(*pipeline.state(), PipelineState::Running);
        assert_eq!(pipeline.frames_processed(), 1);

        pipeline.stop().await.unwrap();
        assert_eq!(*pipeline.state(), PipelineState::Stopped);
        assert!(!pipeline.process().await.unwrap());
    }

    #[tokio::test]
    async fn test_stop_action() {
        let queues = FrameQueues::new();
        let mut pipeline = Pipeline::new(queue_config(), &queues).await.unwrap();
        pipeline.actions().send(CastAction::Stop).await.unwrap();
        assert!(!pipeline.process().await.unwrap());
        assert_eq!(*pipeline.state(), PipelineState::Stopping);
    }

    #[tokio::test]
    async fn test_pace_delay_follows_frame_schedule() {
        let mut pipeline = Pipeline::new(queue_config().with_rate(10), &FrameQueues::new())
            .await
            .unwrap();
        let interval = Duration::from_millis(100);

        // Frame 0 is due at the start
        pipeline.pace_start = Instant::now();
        pipeline.pace_frames = 0;
        assert_eq!(pipeline.pace_delay(), None);

        // Frame 5 is due at start + 5 intervals
        pipeline.pace_frames = 5;
        let wait = pipeline.pace_delay().unwrap();
        assert!(wait <= interval * 5 && wait > interval * 4, "waited {:?}", wait);

        // Late frames shorten the next wait instead of pushing the schedule back
        pipeline.pace_start = Instant::now() - Duration::from_millis(250);
        pipeline.pace_frames = 3;
        let wait = pipeline.pace_delay().unwrap();
        assert!(wait <= Duration::from_millis(50), "waited {:?}", wait);

        // Behind schedule: send at once, no catch-up sleep
        pipeline.pace_start = Instant::now() - Duration::from_secs(1);
        pipeline.pace_frames = 5;
        assert_eq!(pipeline.pace_delay(), None);
    }

    #[tokio::test]
    async fn test_frames_are_paced_at_rate() {
        let queues = FrameQueues::new();
        let mut pipeline = Pipeline::new(queue_config().with_rate(50), &queues)
            .await
            .unwrap();

        let start = Instant::now();
        for _ in 0..10 {
            queues.push("test", Frame::solid(4, 4, [9, 9, 9]));
            assert!(pipeline.process().await.unwrap());
        }
        assert_eq!(pipeline.frames_processed(), 10);
        // Ten frames at 50 fps: the last is due 9 intervals after the first
        assert!(start.elapsed() >= Duration::from_millis(180));
        assert_eq!(pipeline.pace_frames, 10);
    }

    #[tokio::test]
    async fn test_shot_ring_is_capped() {
        let queues = FrameQueues::new();
        let mut config = queue_config();
        config.frame_max = 2;
        let mut pipeline = Pipeline::new(config, &queues).await.unwrap();
        let actions = pipeline.actions();

        for i in 0..3u8 {
            actions.send(CastAction::Shot).await.unwrap();
            queues.push("test", Frame::solid(8, 8, [i, i, i]));
            assert!(pipeline.process().await.unwrap());
        }

        let snapshots: Vec<&Frame> = pipeline.snapshots().collect();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].as_bytes()[0], 1);
        assert_eq!((snapshots[1].width(), snapshots[1].height()), (8, 8));
    }
}
