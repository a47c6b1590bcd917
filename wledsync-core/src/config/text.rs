//! Text overlay settings
//!
//! A line of text scrolled over every processed frame, with an optional
//! per-frame animation effect.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Scroll direction of the overlay text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    /// Enters on the right, leaves on the left
    #[default]
    Left,
    Right,
    /// Enters at the bottom, leaves at the top
    Up,
    Down,
}

impl std::str::FromStr for ScrollDirection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            _ => Err(format!("Unknown scroll direction: {}", s)),
        }
    }
}

/// Animation applied to the text on top of scrolling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TextEffect {
    #[default]
    None,
    /// Toggle visibility every `blink_interval` seconds
    Blink,
    /// Ramp opacity up and down by `fade_step` per frame
    Fade,
    /// Step through red, green, blue, yellow, magenta, cyan
    ColorCycle,
    /// Rotate the hue one degree per frame
    RainbowCycle,
}

impl std::str::FromStr for TextEffect {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "none" | "" => Ok(Self::None),
            "blink" => Ok(Self::Blink),
            "fade" => Ok(Self::Fade),
            "color_cycle" => Ok(Self::ColorCycle),
            "rainbow_cycle" | "rainbow" => Ok(Self::RainbowCycle),
            _ => Err(format!("Unknown text effect: {}", s)),
        }
    }
}

/// `[text]` section and per-cast overlay settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    /// Draw the overlay
    pub enabled: bool,
    pub text: String,
    /// Scroll speed in pixels per second, 0 keeps the text still
    pub speed: f64,
    pub direction: ScrollDirection,
    pub color: [u8; 3],
    pub effect: TextEffect,
    /// Font size in pixels, half the frame height when unset
    pub font_size: Option<f32>,
    /// Family looked up in the system fonts
    pub font_family: String,
    /// TTF/OTF file used instead of the system fonts
    pub font_file: Option<PathBuf>,
    /// Peak opacity (0.0-1.0)
    pub opacity: f64,
    /// Seconds between blink toggles
    pub blink_interval: f64,
    /// Seconds between color cycle steps
    pub color_interval: f64,
    /// Opacity change per frame for fade, out of 255
    pub fade_step: u8,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            text: "WLEDVideoSync".to_string(),
            speed: 50.0,
            direction: ScrollDirection::default(),
            color: [255, 255, 255],
            effect: TextEffect::default(),
            font_size: None,
            font_family: "sans-serif".to_string(),
            font_file: None,
            opacity: 1.0,
            blink_interval: 0.5,
            color_interval: 1.0,
            fade_step: 5,
        }
    }
}

/// Check the overlay settings, `Err` carries the message
pub(crate) fn check_text(text: &TextConfig) -> std::result::Result<(), String> {
    if !text.enabled {
        return Ok(());
    }
    if !(0.0..=1.0).contains(&text.opacity) {
        return Err(format!("text opacity must be 0.0-1.0, got {}", text.opacity));
    }
    if text.speed < 0.0 || !text.speed.is_finite() {
        return Err(format!("text speed must be 0 or more, got {}", text.speed));
    }
    if let Some(size) = text.font_size {
        if !(size > 0.0 && size <= 512.0) {
            return Err(format!("text font_size must be 1-512, got {}", size));
        }
    }
    if text.effect == TextEffect::Blink && text.blink_interval <= 0.0 {
        return Err("text blink_interval must be positive".to_string());
    }
    if text.effect == TextEffect::ColorCycle && text.color_interval <= 0.0 {
        return Err("text color_interval must be positive".to_string());
    }
    if text.effect == TextEffect::Fade && text.fade_step == 0 {
        return Err("text fade_step cannot be zero".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effect_names() {
        assert_eq!("color-cycle".parse::<TextEffect>().unwrap(), TextEffect::ColorCycle);
        assert_eq!("rainbow".parse::<TextEffect>().unwrap(), TextEffect::RainbowCycle);
        assert!("explode".parse::<TextEffect>().is_err());
        assert_eq!("UP".parse::<ScrollDirection>().unwrap(), ScrollDirection::Up);
    }

    #[test]
    fn test_section_from_toml() {
        let text: TextConfig = toml::from_str(
            r#"
            enabled = true
            text = "Hello"
            effect = "color_cycle"
            direction = "down"
            color = [255, 0, 0]
            "#,
        )
        .unwrap();
        assert_eq!(text.effect, TextEffect::ColorCycle);
        assert_eq!(text.direction, ScrollDirection::Down);
        assert_eq!(text.speed, 50.0);
        assert!(check_text(&text).is_ok());
    }

    #[test]
    fn test_check_text() {
        let mut text = TextConfig {
            enabled: true,
            opacity: 1.5,
            ..TextConfig::default()
        };
        assert!(check_text(&text).is_err());

        text.opacity = 0.8;
        text.effect = TextEffect::Fade;
        text.fade_step = 0;
        assert!(check_text(&text).is_err());

        // Disabled overlays are not checked
        text.enabled = false;
        assert!(check_text(&text).is_ok());
    }
}
