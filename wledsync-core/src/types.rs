//! Core types for WLEDVideoSync
//!
//! These types represent the fundamental data structures used throughout
//! the capture and casting pipeline.

use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Result, WledSyncError};

/// Global handle counter for unique cast IDs
static HANDLE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Opaque handle for a cast session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    /// Create a new unique handle
    pub fn new() -> Self {
        Self(HANDLE_COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw handle value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for Handle {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Handle({})", self.0)
    }
}

/// Kind of capture source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Full monitor/display capture
    Desktop,
    /// Individual window capture
    Window,
    /// Rectangular region of a monitor
    Area,
    /// Image, GIF or video file
    Media,
    /// Camera device
    Webcam,
    /// Frames pushed from outside (mobile WebSocket stream)
    Queue,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Desktop => write!(f, "Desktop"),
            SourceKind::Window => write!(f, "Window"),
            SourceKind::Area => write!(f, "Area"),
            SourceKind::Media => write!(f, "Media"),
            SourceKind::Webcam => write!(f, "Webcam"),
            SourceKind::Queue => write!(f, "Queue"),
        }
    }
}

/// What to cast
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CastSource {
    /// Capture a monitor, the primary one when no name is given
    Desktop {
        /// Monitor name
        #[serde(default)]
        monitor: Option<String>,
    },
    /// Capture a window by title
    Window {
        /// Window title (substring match)
        title: String,
    },
    /// Capture a region of a monitor
    Area {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
        #[serde(default)]
        monitor: Option<String>,
    },
    /// Image, animated GIF, image directory or video file
    Media {
        /// File or directory path
        path: PathBuf,
    },
    /// Camera device by index
    Webcam {
        /// Device index
        index: u32,
    },
    /// Named frame queue fed by the mobile server
    Queue {
        /// Queue name
        name: String,
    },
}

impl Default for CastSource {
    fn default() -> Self {
        Self::Desktop { monitor: None }
    }
}

impl CastSource {
    /// Create a desktop capture source
    pub fn desktop(monitor: Option<String>) -> Self {
        Self::Desktop { monitor }
    }

    /// Create a window capture source
    pub fn window(title: impl Into<String>) -> Self {
        Self::Window {
            title: title.into(),
        }
    }

    /// Create a media file source
    pub fn media(path: impl Into<PathBuf>) -> Self {
        Self::Media { path: path.into() }
    }

    /// Create a queue source
    pub fn queue(name: impl Into<String>) -> Self {
        Self::Queue { name: name.into() }
    }

    /// Get the source kind
    pub fn kind(&self) -> SourceKind {
        match self {
            Self::Desktop { .. } => SourceKind::Desktop,
            Self::Window { .. } => SourceKind::Window,
            Self::Area { .. } => SourceKind::Area,
            Self::Media { .. } => SourceKind::Media,
            Self::Webcam { .. } => SourceKind::Webcam,
            Self::Queue { .. } => SourceKind::Queue,
        }
    }
}

impl std::fmt::Display for CastSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Desktop { monitor: None } => write!(f, "desktop"),
            Self::Desktop {
                monitor: Some(name),
            } => write!(f, "desktop:{}", name),
            Self::Window { title } => write!(f, "win={}", title),
            Self::Area {
                x,
                y,
                width,
                height,
                ..
            } => write!(f, "area={},{},{},{}", x, y, width, height),
            Self::Media { path } => write!(f, "{}", path.display()),
            Self::Webcam { index } => write!(f, "{}", index),
            Self::Queue { name } => write!(f, "queue:{}", name),
        }
    }
}

impl std::str::FromStr for CastSource {
    type Err = WledSyncError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(WledSyncError::config("Empty source"));
        }

        if s.eq_ignore_ascii_case("desktop") {
            return Ok(Self::Desktop { monitor: None });
        }
        if let Some(monitor) = s.strip_prefix("desktop:") {
            return Ok(Self::Desktop {
                monitor: Some(monitor.to_string()),
            });
        }
        if let Some(title) = s.strip_prefix("win=") {
            return Ok(Self::window(title));
        }
        if let Some(area) = s.strip_prefix("area=") {
            let parts: Vec<&str> = area.split(',').map(str::trim).collect();
            if parts.len() != 4 {
                return Err(WledSyncError::config(format!(
                    "Area must be x,y,width,height: {}",
                    area
                )));
            }
            let parse = |v: &str| {
                v.parse::<i64>()
                    .map_err(|_| WledSyncError::config(format!("Invalid area value: {}", v)))
            };
            let (x, y, w, h) = (
                parse(parts[0])?,
                parse(parts[1])?,
                parse(parts[2])?,
                parse(parts[3])?,
            );
            if w <= 0 || h <= 0 {
                return Err(WledSyncError::config("Area width and height must be positive"));
            }
            return Ok(Self::Area {
                x: x as i32,
                y: y as i32,
                width: w as u32,
                height: h as u32,
                monitor: None,
            });
        }
        if s.eq_ignore_ascii_case("queue") {
            return Ok(Self::queue(crate::capture::DEFAULT_QUEUE));
        }
        if let Some(name) = s.strip_prefix("queue:") {
            return Ok(Self::queue(name));
        }
        if let Ok(index) = s.parse::<u32>() {
            return Ok(Self::Webcam { index });
        }

        Ok(Self::media(s))
    }
}

/// Information about an available capture source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Identifier usable as a source string
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// What kind of source this is
    pub kind: SourceKind,
    /// Native resolution (width, height), when known
    pub dimensions: Option<(u32, u32)>,
    /// Whether this is the primary monitor
    pub primary: bool,
}

impl SourceInfo {
    /// Create a new source info
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            dimensions: None,
            primary: false,
        }
    }

    /// Set the native dimensions
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.dimensions = Some((width, height));
        self
    }

    /// Mark as primary
    pub fn with_primary(mut self, primary: bool) -> Self {
        self.primary = primary;
        self
    }
}

impl std::fmt::Display for SourceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.id, self.name)?;
        if let Some((w, h)) = self.dimensions {
            write!(f, " ({}x{})", w, h)?;
        }
        if self.primary {
            write!(f, " [primary]")?;
        }
        Ok(())
    }
}

/// RGB24 video frame
#[derive(Debug, Clone)]
pub struct Frame {
    /// Pixel data
    pub image: RgbImage,
    /// Frame counter assigned by the source
    pub pts: u64,
}

impl Frame {
    /// Wrap an image
    pub fn new(image: RgbImage, pts: u64) -> Self {
        Self { image, pts }
    }

    /// Build a frame from packed RGB bytes
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(WledSyncError::process(format!(
                "Buffer size {} does not match {}x{} RGB ({})",
                data.len(),
                width,
                height,
                expected
            )));
        }
        RgbImage::from_raw(width, height, data)
            .map(|image| Self::new(image, 0))
            .ok_or_else(|| WledSyncError::process("Invalid RGB buffer"))
    }

    /// A frame filled with a single color
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        Self::new(RgbImage::from_pixel(width, height, Rgb(rgb)), 0)
    }

    /// Width in pixels
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height in pixels
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Number of pixels
    pub fn pixel_count(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    /// Packed RGB bytes, row-major
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Take the packed RGB bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.image.into_raw()
    }
}
