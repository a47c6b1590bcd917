//! Configuration types for WLEDVideoSync
//!
//! Provides cast settings, color effects, protocol options and the
//! multicast device matrix.

mod dmx;
mod file;
mod text;

pub use dmx::{ArtNetConfig, ChannelLayout, E131Config};
pub use text::{ScrollDirection, TextConfig, TextEffect};
pub use file::{
    sample_config, ConfigFile, DefaultsSection, MobileSection, ScheduleEntry,
};

use crate::error::{Result, WledSyncError};
use crate::matrix::CastDevice;
use crate::types::CastSource;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Network protocol used to reach the LED device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Distributed Display Protocol (WLED native realtime)
    #[default]
    Ddp,
    /// Streaming ACN / e1.31
    E131,
    /// Art-Net ArtDmx
    ArtNet,
    /// No network output, frames are processed and counted only
    Other,
}

impl Protocol {
    /// Default UDP port for this protocol
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Ddp => 4048,
            Self::E131 => 5568,
            Self::ArtNet => 6454,
            Self::Other => 0,
        }
    }

    /// Whether frames leave the process
    pub fn is_network(&self) -> bool {
        !matches!(self, Self::Other)
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ddp => write!(f, "ddp"),
            Self::E131 => write!(f, "e131"),
            Self::ArtNet => write!(f, "artnet"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl std::str::FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ddp" => Ok(Self::Ddp),
            "e131" | "e1.31" | "sacn" => Ok(Self::E131),
            "artnet" | "art-net" => Ok(Self::ArtNet),
            "other" | "none" => Ok(Self::Other),
            _ => Err(format!("Unknown protocol: {}", s)),
        }
    }
}

/// Mirror mode applied after color effects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FlipMode {
    /// Upside down
    #[default]
    Vertical,
    /// Left to right
    Horizontal,
    /// Both axes
    Both,
}

impl std::str::FromStr for FlipMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vertical" | "v" | "0" => Ok(Self::Vertical),
            "horizontal" | "h" | "1" => Ok(Self::Horizontal),
            "both" | "-1" => Ok(Self::Both),
            _ => Err(format!("Unknown flip mode: {}", s)),
        }
    }
}

/// Resampling filter used when scaling frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Nearest,
    Linear,
    Cubic,
    /// Box filter, best for large downscales
    #[default]
    Area,
    Lanczos,
}

impl std::str::FromStr for Interpolation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nearest" => Ok(Self::Nearest),
            "linear" | "bilinear" => Ok(Self::Linear),
            "cubic" | "bicubic" => Ok(Self::Cubic),
            "area" => Ok(Self::Area),
            "lanczos" => Ok(Self::Lanczos),
            _ => Err(format!("Unknown interpolation: {}", s)),
        }
    }
}

/// Color correction and effect settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    /// Gamma applied through a lookup table
    pub gamma: f64,
    /// Automatic brightness/contrast from the gray histogram
    pub auto_bright: bool,
    /// Histogram percentage clipped by auto brightness
    pub clip_hist_percent: f64,
    /// Saturation adjustment in percent (-100..=100)
    pub saturation: i32,
    /// Brightness adjustment in percent
    pub brightness: i32,
    /// Contrast adjustment in percent
    pub contrast: i32,
    /// Sharpen strength in percent
    pub sharpen: i32,
    /// Red channel factor, 0 leaves the channel untouched
    pub balance_r: f64,
    pub balance_g: f64,
    pub balance_b: f64,
    /// Mirror the frame
    pub flip: bool,
    pub flip_mode: FlipMode,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            gamma: 0.5,
            auto_bright: false,
            clip_hist_percent: 25.0,
            saturation: 0,
            brightness: 0,
            contrast: 0,
            sharpen: 0,
            balance_r: 0.0,
            balance_g: 0.0,
            balance_b: 0.0,
            flip: false,
            flip_mode: FlipMode::default(),
        }
    }
}

impl ColorConfig {
    /// Whether any of the per-pixel filters is active
    pub fn has_filters(&self) -> bool {
        self.saturation != 0
            || self.brightness != 0
            || self.contrast != 0
            || self.sharpen != 0
            || self.balance_r != 0.0
            || self.balance_g != 0.0
            || self.balance_b != 0.0
    }
}

/// Virtual matrix of devices treated as one large pixel grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MulticastConfig {
    pub enabled: bool,
    /// Devices per row
    pub cast_x: u32,
    /// Devices per column
    pub cast_y: u32,
    /// Devices, routed to tiles by ascending index
    pub devices: Vec<CastDevice>,
}

impl Default for MulticastConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cast_x: 1,
            cast_y: 1,
            devices: Vec::new(),
        }
    }
}

impl MulticastConfig {
    /// Number of tiles in the matrix
    pub fn tiles(&self) -> usize {
        self.cast_x as usize * self.cast_y as usize
    }

    /// Whether frames are split across a matrix larger than 1x1
    pub fn is_matrix(&self) -> bool {
        self.enabled && self.tiles() > 1
    }
}

/// Configuration for a cast session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CastConfig {
    /// Name used in logs and status output
    pub name: String,
    /// What to capture
    pub source: CastSource,
    /// Output protocol
    pub protocol: Protocol,
    /// Device host (IPv4, hostname, or multicast/broadcast keyword)
    pub host: String,
    /// Destination port, protocol default when unset
    pub port: Option<u16>,
    /// Frames per second
    pub rate: u32,
    /// Output width in pixels
    pub scale_width: u32,
    /// Output height in pixels
    pub scale_height: u32,
    /// Keep the source aspect ratio and letterbox
    pub keep_ratio: bool,
    pub interpolation: Interpolation,
    /// Extra sends per packet
    pub retry_number: u32,
    /// Media replays: 0 once, n extra times, -1 forever
    pub repeat: i32,
    /// Snapshot buffer capacity
    pub frame_max: usize,
    /// Keep the first `frame_max` processed frames
    pub put_to_buffer: bool,
    /// Query the WLED API for matrix size and switch live mode
    pub wled: bool,
    /// Leave live mode when the cast stops
    pub wled_live_off: bool,
    /// HTTP port of the WLED JSON API
    pub wled_port: u16,
    pub color: ColorConfig,
    /// Text drawn over each frame
    pub text: TextConfig,
    pub e131: E131Config,
    pub artnet: ArtNetConfig,
    pub multicast: MulticastConfig,
}

impl Default for CastConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            source: CastSource::default(),
            protocol: Protocol::default(),
            host: default_host(),
            port: None,
            rate: 25,
            scale_width: 128,
            scale_height: 128,
            keep_ratio: false,
            interpolation: Interpolation::default(),
            retry_number: 0,
            repeat: 0,
            frame_max: 8,
            put_to_buffer: false,
            wled: false,
            wled_live_off: true,
            wled_port: crate::output::wled::HTTP_PORT,
            color: ColorConfig::default(),
            text: TextConfig::default(),
            e131: E131Config::default(),
            artnet: ArtNetConfig::default(),
            multicast: MulticastConfig::default(),
        }
    }
}

fn default_name() -> String {
    "cast".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

impl CastConfig {
    /// Create a config for the given source
    pub fn new(source: CastSource) -> Self {
        Self {
            source,
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_rate(mut self, rate: u32) -> Self {
        self.rate = rate;
        self
    }

    pub fn with_scale(mut self, width: u32, height: u32) -> Self {
        self.scale_width = width;
        self.scale_height = height;
        self
    }

    pub fn with_retry(mut self, retry_number: u32) -> Self {
        self.retry_number = retry_number;
        self
    }

    pub fn with_repeat(mut self, repeat: i32) -> Self {
        self.repeat = repeat;
        self
    }

    /// Use the WLED JSON API on `port`
    pub fn with_wled(mut self, port: u16) -> Self {
        self.wled = true;
        self.wled_port = port;
        self
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.color.gamma = gamma;
        self
    }

    /// Enable multicast over the given matrix
    pub fn with_multicast(mut self, cast_x: u32, cast_y: u32, devices: Vec<CastDevice>) -> Self {
        self.multicast = MulticastConfig {
            enabled: true,
            cast_x,
            cast_y,
            devices,
        };
        self
    }

    /// Destination port, falling back to the protocol default
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.protocol.default_port())
    }

    /// Time between frames
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate.max(1) as f64)
    }

    /// Size of the processed frame before any matrix split
    pub fn output_size(&self) -> (u32, u32) {
        if self.multicast.is_matrix() {
            (
                self.scale_width * self.multicast.cast_x,
                self.scale_height * self.multicast.cast_y,
            )
        } else {
            (self.scale_width, self.scale_height)
        }
    }

    /// Validate the configuration and return any warnings
    ///
    /// Returns a list of warning messages for settings that work but are
    /// likely not what the user wants.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        let pixels = self.scale_width as usize * self.scale_height as usize;
        if self.protocol == Protocol::Ddp && pixels > 4096 {
            warnings.push(format!(
                "{}x{} is {} pixels per device, WLED usually drives far fewer LEDs.",
                self.scale_width, self.scale_height, pixels
            ));
        }

        if self.rate > 60 {
            warnings.push(format!(
                "{} fps exceeds what most LED controllers refresh. Frames may be dropped.",
                self.rate
            ));
        }

        if self.color.gamma > 0.0 && (self.color.gamma < 0.1 || self.color.gamma > 5.0) {
            warnings.push(format!("Gamma {} is unusually strong.", self.color.gamma));
        }

        if self.multicast.enabled && self.protocol != Protocol::Ddp {
            warnings.push(format!(
                "Multicast with {} sends the same universe layout to every device.",
                self.protocol
            ));
        }

        warnings
    }

    /// Validate and return an error if configuration is invalid
    pub fn validate_strict(&self) -> Result<()> {
        if self.rate == 0 {
            return Err(WledSyncError::config("Frame rate cannot be zero"));
        }
        if self.rate > 240 {
            return Err(WledSyncError::config(format!(
                "Frame rate {} exceeds maximum supported (240)",
                self.rate
            )));
        }
        if self.scale_width == 0 || self.scale_height == 0 {
            return Err(WledSyncError::config("Scale cannot be zero"));
        }
        if self.retry_number > 10 {
            return Err(WledSyncError::config(format!(
                "Retry number {} exceeds maximum (10)",
                self.retry_number
            )));
        }
        if self.repeat < -1 {
            return Err(WledSyncError::config("Repeat must be -1 or more"));
        }
        if self.color.gamma <= 0.0 {
            return Err(WledSyncError::config("Gamma must be positive"));
        }
        text::check_text(&self.text).map_err(WledSyncError::config)?;

        match self.protocol {
            Protocol::E131 => {
                dmx::check_universe("e131", self.e131.universe_size, self.e131.channel_offset)
                    .map_err(WledSyncError::config)?;
                if self.e131.priority > 200 {
                    return Err(WledSyncError::config("e131 priority must be 0-200"));
                }
            }
            Protocol::ArtNet => {
                dmx::check_universe(
                    "artnet",
                    self.artnet.universe_size,
                    self.artnet.channel_offset,
                )
                .map_err(WledSyncError::config)?;
                if self.artnet.universe_size % 2 != 0 {
                    return Err(WledSyncError::config(
                        "artnet universe_size must be even",
                    ));
                }
                if self.artnet.universe > 0x7fff {
                    return Err(WledSyncError::config("artnet universe must be below 32768"));
                }
            }
            Protocol::Ddp | Protocol::Other => {}
        }

        if self.multicast.enabled {
            let m = &self.multicast;
            if m.cast_x == 0 || m.cast_y == 0 {
                return Err(WledSyncError::config("Matrix dimensions cannot be zero"));
            }
            if m.devices.len() < 2 {
                return Err(WledSyncError::config(
                    "Multicast needs at least two devices",
                ));
            }
            if m.is_matrix() {
                crate::matrix::validate_cast_devices(&m.devices, m.cast_x, m.cast_y)?;
            }
        }

        Ok(())
    }
}
