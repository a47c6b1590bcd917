//! Configuration file loading and merging
//!
//! Loads user configuration from `~/.config/wledvideosync/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info};

use super::{
    ArtNetConfig, CastConfig, ColorConfig, E131Config, Interpolation, MulticastConfig, TextConfig,
};
use crate::error::{Result, WledSyncError};
use crate::types::CastSource;

/// Configuration file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Default cast settings
    #[serde(default)]
    pub defaults: DefaultsSection,

    /// Color effects
    #[serde(default)]
    pub color: ColorConfig,

    /// Text overlay
    #[serde(default)]
    pub text: TextConfig,

    /// e1.31 device settings
    #[serde(default)]
    pub e131: E131Config,

    /// Art-Net device settings
    #[serde(default)]
    pub artnet: ArtNetConfig,

    /// Device matrix
    #[serde(default)]
    pub multicast: MulticastConfig,

    /// Mobile stream server
    #[serde(default)]
    pub mobile: MobileSection,

    /// Timed actions sent to the running cast
    #[serde(default)]
    pub schedule: Vec<ScheduleEntry>,
}

/// Default cast settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsSection {
    /// Protocol: ddp, e131, artnet, other
    #[serde(default = "default_protocol")]
    pub protocol: String,

    /// Device host
    #[serde(default = "default_host")]
    pub host: String,

    /// Destination port (0 = protocol default)
    #[serde(default)]
    pub port: u16,

    /// Frames per second
    #[serde(default = "default_rate")]
    pub rate: u32,

    #[serde(default = "default_scale")]
    pub scale_width: u32,

    #[serde(default = "default_scale")]
    pub scale_height: u32,

    #[serde(default)]
    pub keep_ratio: bool,

    #[serde(default)]
    pub interpolation: Interpolation,

    #[serde(default)]
    pub retry_number: u32,

    /// Media replays (-1 = forever)
    #[serde(default)]
    pub repeat: i32,

    /// Snapshot buffer capacity
    #[serde(default = "default_frame_max")]
    pub frame_max: usize,

    /// Use the WLED JSON API
    #[serde(default)]
    pub wled: bool,

    #[serde(default = "default_wled_port")]
    pub wled_port: u16,
}

/// Mobile WebSocket stream server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MobileSection {
    /// Start the server with each cast
    #[serde(default)]
    pub enabled: bool,

    /// Bind address
    #[serde(default = "default_mobile_host")]
    pub host: String,

    #[serde(default = "default_mobile_port")]
    pub port: u16,

    /// Queue receiving the decoded frames
    #[serde(default = "default_queue")]
    pub queue: String,

    /// Image shown while no frame arrives
    #[serde(default)]
    pub default_image: Option<PathBuf>,

    /// Seconds without frames before the default image is shown
    #[serde(default = "default_stale_secs")]
    pub stale_secs: f64,
}

/// A timed action for the running cast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// Action name (shot, reset, multicast, host, stop, ...)
    pub action: String,

    /// Action parameters
    #[serde(default)]
    pub params: String,

    /// Seconds between runs (0 = run once)
    #[serde(default)]
    pub every_secs: u64,

    /// Seconds before the first run
    #[serde(default)]
    pub delay_secs: u64,

    /// Number of runs (0 = unlimited)
    #[serde(default)]
    pub count: u32,
}

// Default value functions
fn default_protocol() -> String {
    "ddp".to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_rate() -> u32 {
    25
}

fn default_scale() -> u32 {
    128
}

fn default_frame_max() -> usize {
    8
}

fn default_wled_port() -> u16 {
    crate::output::wled::HTTP_PORT
}

fn default_mobile_host() -> String {
    "0.0.0.0".to_string()
}

fn default_mobile_port() -> u16 {
    8000
}

fn default_queue() -> String {
    crate::capture::DEFAULT_QUEUE.to_string()
}

fn default_stale_secs() -> f64 {
    2.0
}

impl Default for DefaultsSection {
    fn default() -> Self {
        Self {
            protocol: default_protocol(),
            host: default_host(),
            port: 0,
            rate: default_rate(),
            scale_width: default_scale(),
            scale_height: default_scale(),
            keep_ratio: false,
            interpolation: Interpolation::default(),
            retry_number: 0,
            repeat: 0,
            frame_max: default_frame_max(),
            wled: false,
            wled_port: default_wled_port(),
        }
    }
}

impl Default for MobileSection {
    fn default() -> Self {
        Self {
            enabled: false,
            host: default_mobile_host(),
            port: default_mobile_port(),
            queue: default_queue(),
            default_image: None,
            stale_secs: default_stale_secs(),
        }
    }
}

impl ConfigFile {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("wledvideosync").join("config.toml")
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("wledvideosync")
                .join("config.toml")
        } else {
            PathBuf::from("/etc/wledvideosync/config.toml")
        }
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path())
    }

    /// Load configuration from a specific path
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| WledSyncError::Config(format!("Failed to read config file: {}", e)))?;

        let config: ConfigFile = toml::from_str(&content)?;

        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to(Self::default_path())
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    WledSyncError::Config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)?;

        std::fs::write(&path, content)
            .map_err(|e| WledSyncError::Config(format!("Failed to write config file: {}", e)))?;

        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Build a cast config for `source` from the file settings
    pub fn to_cast_config(&self, source: CastSource) -> Result<CastConfig> {
        let d = &self.defaults;
        let protocol = d.protocol.parse().map_err(WledSyncError::config)?;

        Ok(CastConfig {
            source,
            protocol,
            host: d.host.clone(),
            port: (d.port != 0).then_some(d.port),
            rate: d.rate,
            scale_width: d.scale_width,
            scale_height: d.scale_height,
            keep_ratio: d.keep_ratio,
            interpolation: d.interpolation,
            retry_number: d.retry_number,
            repeat: d.repeat,
            frame_max: d.frame_max,
            wled: d.wled,
            wled_port: d.wled_port,
            color: self.color.clone(),
            text: self.text.clone(),
            e131: self.e131.clone(),
            artnet: self.artnet.clone(),
            multicast: self.multicast.clone(),
            ..CastConfig::default()
        })
    }
}

/// Generate a sample configuration file
pub fn sample_config() -> String {
    r#"# WLEDVideoSync Configuration
# https://github.com/zak-45/WLEDVideoSync

[defaults]
# Protocol: ddp, e131, artnet, other
protocol = "ddp"

# Device IP or hostname ("multicast" for e131, "broadcast" for artnet)
host = "192.168.1.50"

# Destination port (0 = protocol default: ddp 4048, e131 5568, artnet 6454)
port = 0

# Frames per second
rate = 25

# Output size in pixels, usually the LED matrix size
scale_width = 16
scale_height = 16

# Letterbox instead of stretching
keep_ratio = false

# Resampling: nearest, linear, cubic, area, lanczos
interpolation = "area"

# Extra sends per packet on lossy networks
retry_number = 0

# Media replays: 0 once, n extra times, -1 forever
repeat = 0

# Snapshot buffer size
frame_max = 8

# Read matrix size from WLED and switch it to live mode
wled = true
wled_port = 80

[color]
gamma = 0.5
auto_bright = false
clip_hist_percent = 25.0
saturation = 0
brightness = 0
contrast = 0
sharpen = 0
# Channel factors, 0 leaves a channel untouched
balance_r = 0.0
balance_g = 0.0
balance_b = 0.0
flip = false
# vertical, horizontal, both
flip_mode = "vertical"

# Text scrolled over the cast
[text]
enabled = false
text = "WLEDVideoSync"
# Pixels per second, 0 keeps the text still
speed = 50.0
# left, right, up, down
direction = "left"
color = [255, 255, 255]
# none, blink, fade, color_cycle, rainbow_cycle
effect = "none"
# font_size = 8.0
font_family = "sans-serif"
# font_file = "/usr/share/fonts/TTF/DejaVuSans.ttf"
opacity = 1.0
blink_interval = 0.5
color_interval = 1.0
fade_step = 5

[e131]
name = "WLEDVideoSync"
universe = 1
# 0 = derived from scale_width * scale_height
pixel_count = 0
priority = 100
universe_size = 510
channel_offset = 0
# 3 = RGB, 4 = RGBW
channels_per_pixel = 3
blackout = true

[artnet]
name = "WLEDVideoSync"
universe = 0
pixel_count = 0
universe_size = 512
channel_offset = 0
channels_per_pixel = 3
blackout = true

[multicast]
enabled = false
cast_x = 2
cast_y = 1
devices = [
    { index = 0, ip = "192.168.1.50" },
    { index = 1, ip = "192.168.1.51" },
]

[mobile]
enabled = false
host = "0.0.0.0"
port = 8000
queue = "mobile"
stale_secs = 2.0

# Timed actions for the running cast
[[schedule]]
action = "multicast"
params = "circular,500"
delay_secs = 10
every_secs = 0
count = 1
"#
    .to_string()
}
