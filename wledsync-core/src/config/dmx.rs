//! DMX-over-IP device settings (e1.31 and Art-Net)
//!
//! Both protocols map a flat channel buffer onto consecutive universes,
//! optionally starting at a channel offset inside the first universe.

use serde::{Deserialize, Serialize};

/// Number of channels per pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum ChannelLayout {
    /// Red, green, blue
    #[default]
    Rgb,
    /// Red, green, blue, white
    Rgbw,
}

impl ChannelLayout {
    /// Channels used by one pixel
    pub fn channels(&self) -> usize {
        match self {
            Self::Rgb => 3,
            Self::Rgbw => 4,
        }
    }
}

impl TryFrom<u8> for ChannelLayout {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            3 => Ok(Self::Rgb),
            4 => Ok(Self::Rgbw),
            other => Err(format!("channels_per_pixel must be 3 or 4, got {}", other)),
        }
    }
}

impl From<ChannelLayout> for u8 {
    fn from(layout: ChannelLayout) -> Self {
        layout.channels() as u8
    }
}

/// sACN / e1.31 device settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct E131Config {
    /// Source name carried in the framing layer
    pub name: String,
    /// First universe
    pub universe: u16,
    /// Pixel count, 0 derives it from the cast scale
    pub pixel_count: usize,
    /// Packet priority (0-200)
    pub priority: u8,
    /// Channels used per universe
    pub universe_size: usize,
    /// Channel offset inside the first universe
    pub channel_offset: usize,
    /// 3 for RGB, 4 for RGBW
    pub channels_per_pixel: ChannelLayout,
    /// Send a zeroed frame when the device stops
    pub blackout: bool,
}

impl Default for E131Config {
    fn default() -> Self {
        Self {
            name: "WLEDVideoSync".to_string(),
            universe: 1,
            pixel_count: 0,
            priority: 100,
            universe_size: 510,
            channel_offset: 0,
            channels_per_pixel: ChannelLayout::Rgb,
            blackout: true,
        }
    }
}

/// Art-Net device settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtNetConfig {
    pub name: String,
    pub universe: u16,
    pub pixel_count: usize,
    /// Bytes per ArtDmx packet, even, at most 512
    pub universe_size: usize,
    pub channel_offset: usize,
    pub channels_per_pixel: ChannelLayout,
    pub blackout: bool,
}

impl Default for ArtNetConfig {
    fn default() -> Self {
        Self {
            name: "WLEDVideoSync".to_string(),
            universe: 0,
            pixel_count: 0,
            universe_size: 512,
            channel_offset: 0,
            channels_per_pixel: ChannelLayout::Rgb,
            blackout: true,
        }
    }
}

/// Check universe sizing shared by both protocols
pub(crate) fn check_universe(
    protocol: &str,
    universe_size: usize,
    channel_offset: usize,
) -> Result<(), String> {
    if universe_size == 0 || universe_size > 512 {
        return Err(format!(
            "{} universe_size must be between 1 and 512, got {}",
            protocol, universe_size
        ));
    }
    if channel_offset >= universe_size {
        return Err(format!(
            "{} channel_offset {} must be below universe_size {}",
            protocol, channel_offset, universe_size
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_from_u8() {
        assert_eq!(ChannelLayout::try_from(3).unwrap(), ChannelLayout::Rgb);
        assert_eq!(ChannelLayout::try_from(4).unwrap(), ChannelLayout::Rgbw);
        assert!(ChannelLayout::try_from(5).is_err());
    }

    #[test]
    fn test_check_universe() {
        assert!(check_universe("e131", 510, 0).is_ok());
        assert!(check_universe("e131", 0, 0).is_err());
        assert!(check_universe("e131", 600, 0).is_err());
        assert!(check_universe("e131", 510, 510).is_err());
    }
}
