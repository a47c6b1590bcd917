//! Monitor, window and area capture via xcap

use image::DynamicImage;
use tracing::{debug, info, warn};
use xcap::{Monitor, Window};

use super::{FrameSource, SourceFrame};
use crate::error::{Result, WledSyncError};
use crate::types::{Frame, SourceInfo, SourceKind};

#[derive(Debug, Clone)]
enum Target {
    /// Monitor by name, primary when unset
    Monitor(Option<String>),
    /// Window by id, with the title it was found by
    Window { id: u32, title: String },
    Area {
        monitor: Option<String>,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },
}

/// Captures a monitor, a window or part of a monitor
///
/// xcap handles are looked up again for every frame, so the source keeps
/// only plain identifiers and stays `Send`.
#[derive(Debug)]
pub struct DesktopSource {
    target: Target,
    info: SourceInfo,
    frame_count: u64,
}

fn find_monitor(name: Option<&str>) -> Result<Monitor> {
    let monitors = Monitor::all()
        .map_err(|e| WledSyncError::capture(format!("Failed to enumerate monitors: {}", e)))?;

    match name {
        Some(name) => monitors
            .into_iter()
            .find(|m| m.name() == name)
            .ok_or_else(|| WledSyncError::SourceNotFound(format!("monitor {}", name))),
        None => {
            let mut monitors = monitors.into_iter();
            let first = monitors
                .next()
                .ok_or_else(|| WledSyncError::SourceNotFound("no monitor".to_string()))?;
            if first.is_primary() {
                return Ok(first);
            }
            Ok(monitors.find(|m| m.is_primary()).unwrap_or(first))
        }
    }
}

impl DesktopSource {
    /// Capture a whole monitor
    pub fn monitor(name: Option<&str>) -> Result<Self> {
        let monitor = find_monitor(name)?;
        info!(
            "Capturing monitor '{}' ({}x{})",
            monitor.name(),
            monitor.width(),
            monitor.height()
        );
        let info = SourceInfo::new(
            format!("desktop:{}", monitor.name()),
            monitor.name(),
            SourceKind::Desktop,
        )
        .with_dimensions(monitor.width(), monitor.height())
        .with_primary(monitor.is_primary());

        Ok(Self {
            target: Target::Monitor(name.map(str::to_string)),
            info,
            frame_count: 0,
        })
    }

    /// Capture the first visible window whose title contains `title`
    pub fn window(title: &str) -> Result<Self> {
        let windows = Window::all()
            .map_err(|e| WledSyncError::capture(format!("Failed to enumerate windows: {}", e)))?;
        let window = windows
            .into_iter()
            .find(|w| !w.is_minimized() && w.title().contains(title))
            .ok_or_else(|| WledSyncError::SourceNotFound(format!("window '{}'", title)))?;

        info!("Capturing window '{}' ({})", window.title(), window.app_name());
        let info = SourceInfo::new(format!("win={}", window.title()), window.title(), SourceKind::Window)
            .with_dimensions(window.width(), window.height());

        Ok(Self {
            target: Target::Window {
                id: window.id(),
                title: window.title().to_string(),
            },
            info,
            frame_count: 0,
        })
    }

    /// Capture a rectangle of a monitor, in monitor coordinates
    pub fn area(monitor: Option<&str>, x: i32, y: i32, width: u32, height: u32) -> Result<Self> {
        let m = find_monitor(monitor)?;
        if x < 0 || y < 0 || x as u32 >= m.width() || y as u32 >= m.height() {
            return Err(WledSyncError::capture(format!(
                "Area origin {},{} is outside monitor '{}' ({}x{})",
                x,
                y,
                m.name(),
                m.width(),
                m.height()
            )));
        }
        info!("Capturing area {}x{}+{}+{} of '{}'", width, height, x, y, m.name());

        let info = SourceInfo::new(
            format!("area={},{},{},{}", x, y, width, height),
            format!("{} area", m.name()),
            SourceKind::Area,
        )
        .with_dimensions(width, height);

        Ok(Self {
            target: Target::Area {
                monitor: monitor.map(str::to_string),
                x,
                y,
                width,
                height,
            },
            info,
            frame_count: 0,
        })
    }

    fn grab(&self) -> Result<image::RgbImage> {
        let rgba = match &self.target {
            Target::Monitor(name) => find_monitor(name.as_deref())?.capture_image(),
            Target::Window { id, title } => {
                let windows = Window::all().map_err(|e| {
                    WledSyncError::capture(format!("Failed to enumerate windows: {}", e))
                })?;
                let window = windows
                    .into_iter()
                    .find(|w| w.id() == *id)
                    .ok_or_else(|| WledSyncError::SourceNotFound(format!("window '{}'", title)))?;
                window.capture_image()
            }
            Target::Area {
                monitor,
                x,
                y,
                width,
                height,
            } => {
                let m = find_monitor(monitor.as_deref())?;
                m.capture_image().map(|full| {
                    let w = (*width).min(full.width().saturating_sub(*x as u32));
                    let h = (*height).min(full.height().saturating_sub(*y as u32));
                    image::imageops::crop_imm(&full, *x as u32, *y as u32, w, h).to_image()
                })
            }
        }
        .map_err(|e| WledSyncError::capture(format!("{}: {}", self.info.name, e)))?;

        Ok(DynamicImage::ImageRgba8(rgba).to_rgb8())
    }
}

impl FrameSource for DesktopSource {
    fn info(&self) -> SourceInfo {
        self.info.clone()
    }

    fn next_frame(&mut self) -> Result<SourceFrame> {
        match self.grab() {
            Ok(image) => {
                self.frame_count += 1;
                Ok(SourceFrame::Frame(Frame::new(image, self.frame_count)))
            }
            Err(WledSyncError::SourceNotFound(what)) => {
                warn!("{} disappeared, ending capture", what);
                Ok(SourceFrame::End)
            }
            Err(e) => Err(e),
        }
    }
}

/// Monitors and visible windows
pub fn list_sources() -> Result<Vec<SourceInfo>> {
    let mut sources = Vec::new();

    let monitors = Monitor::all()
        .map_err(|e| WledSyncError::capture(format!("Failed to enumerate monitors: {}", e)))?;
    for monitor in monitors {
        sources.push(
            SourceInfo::new(
                format!("desktop:{}", monitor.name()),
                monitor.name(),
                SourceKind::Desktop,
            )
            .with_dimensions(monitor.width(), monitor.height())
            .with_primary(monitor.is_primary()),
        );
    }

    match Window::all() {
        Ok(windows) => {
            for window in windows.iter().filter(|w| !w.is_minimized() && !w.title().is_empty()) {
                sources.push(
                    SourceInfo::new(
                        format!("win={}", window.title()),
                        format!("{} ({})", window.title(), window.app_name()),
                        SourceKind::Window,
                    )
                    .with_dimensions(window.width(), window.height()),
                );
            }
        }
        Err(e) => debug!("Window enumeration unavailable: {}", e),
    }

    Ok(sources)
}
