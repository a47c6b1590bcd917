//! Camera capture via nokhwa
//!
//! The camera lives on its own thread; the source only receives decoded
//! frames and always hands out the newest one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use tracing::{error, info, warn};

use super::{FrameSource, SourceFrame};
use crate::error::{Result, WledSyncError};
use crate::types::{Frame, SourceInfo, SourceKind};

/// Frames buffered between the camera thread and the cast
const CHANNEL_DEPTH: usize = 4;

/// Source reading a camera by index
pub struct WebcamSource {
    index: u32,
    info: SourceInfo,
    rx: mpsc::Receiver<Frame>,
    running: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
    rate: Option<f64>,
}

impl WebcamSource {
    pub fn open(index: u32) -> Result<Self> {
        let (tx, rx) = mpsc::sync_channel(CHANNEL_DEPTH);
        let (ready_tx, ready_rx) = mpsc::channel();
        let running = Arc::new(AtomicBool::new(true));
        let running_thread = Arc::clone(&running);

        let thread = thread::Builder::new()
            .name(format!("webcam-{}", index))
            .spawn(move || capture_loop(index, tx, ready_tx, running_thread))
            .map_err(|e| WledSyncError::capture(format!("Failed to spawn camera thread: {}", e)))?;

        let (name, width, height, fps) = ready_rx
            .recv()
            .map_err(|_| WledSyncError::capture(format!("Camera {} thread exited", index)))??;
        info!("Camera {} '{}' opened at {}x{} {} fps", index, name, width, height, fps);

        Ok(Self {
            index,
            info: SourceInfo::new(index.to_string(), name, SourceKind::Webcam)
                .with_dimensions(width, height),
            rx,
            running,
            thread: Some(thread),
            rate: (fps > 0).then_some(fps as f64),
        })
    }
}

type Ready = Result<(String, u32, u32, u32)>;

fn capture_loop(
    index: u32,
    tx: mpsc::SyncSender<Frame>,
    ready: mpsc::Sender<Ready>,
    running: Arc<AtomicBool>,
) {
    let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
    let mut camera = match Camera::new(CameraIndex::Index(index), requested)
        .and_then(|mut c| c.open_stream().map(|_| c))
    {
        Ok(camera) => camera,
        Err(e) => {
            let _ = ready.send(Err(WledSyncError::capture(format!(
                "Failed to open camera {}: {}",
                index, e
            ))));
            return;
        }
    };

    let resolution = camera.resolution();
    let _ = ready.send(Ok((
        camera.info().human_name(),
        resolution.width(),
        resolution.height(),
        camera.frame_rate(),
    )));

    let mut pts = 0u64;
    while running.load(Ordering::Relaxed) {
        let buffer = match camera.frame() {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!("Camera {}: failed to capture frame: {}", index, e);
                continue;
            }
        };
        let decoded = match buffer.decode_image::<RgbFormat>() {
            Ok(image) => image,
            Err(e) => {
                warn!("Camera {}: failed to decode frame: {}", index, e);
                continue;
            }
        };

        pts += 1;
        let (width, height) = (decoded.width(), decoded.height());
        let frame = match Frame::from_raw(width, height, decoded.into_raw()) {
            Ok(mut frame) => {
                frame.pts = pts;
                frame
            }
            Err(e) => {
                error!("Camera {}: {}", index, e);
                break;
            }
        };

        match tx.try_send(frame) {
            Ok(()) | Err(mpsc::TrySendError::Full(_)) => {}
            Err(mpsc::TrySendError::Disconnected(_)) => break,
        }
    }

    if let Err(e) = camera.stop_stream() {
        warn!("Camera {}: failed to stop stream: {}", index, e);
    }
    info!("Camera {} capture ended", index);
}

impl FrameSource for WebcamSource {
    fn info(&self) -> SourceInfo {
        self.info.clone()
    }

    fn next_frame(&mut self) -> Result<SourceFrame> {
        let mut latest = None;
        loop {
            match self.rx.try_recv() {
                Ok(frame) => latest = Some(frame),
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    return Ok(match latest {
                        Some(frame) => SourceFrame::Frame(frame),
                        None => SourceFrame::End,
                    });
                }
            }
        }
        Ok(latest.map_or(SourceFrame::Pending, SourceFrame::Frame))
    }

    fn rate_hint(&self) -> Option<f64> {
        self.rate
    }
}

impl Drop for WebcamSource {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Camera {} thread panicked", self.index);
            }
        }
    }
}

/// Cameras found by the native backend
pub fn list_sources() -> Result<Vec<SourceInfo>> {
    let cameras = match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => cameras,
        Err(e) => {
            warn!("Camera query failed: {}", e);
            return Ok(Vec::new());
        }
    };

    Ok(cameras
        .iter()
        .enumerate()
        .map(|(i, camera)| {
            SourceInfo::new(i.to_string(), camera.human_name(), SourceKind::Webcam)
        })
        .collect())
}
