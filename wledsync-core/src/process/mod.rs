//! Frame processing between capture and the devices
//!
//! This module provides:
//! - Scaling to the LED matrix size (optionally letterboxed)
//! - Gamma correction through a lookup table
//! - Automatic brightness/contrast
//! - Saturation, brightness, contrast, sharpen and color balance filters
//! - Mirroring and pixel-art snapshots
//! - An animated text overlay drawn last

pub mod color;
pub mod scaler;
pub mod text;

pub use color::{apply_filters, auto_brightness_contrast, GammaLut};
pub use scaler::{calculate_scaled_size, flip, grid, pixelart, resize};
pub use text::TextAnimator;

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::{CastConfig, ColorConfig, Interpolation, TextConfig};
use crate::error::Result;
use crate::types::Frame;

/// Per-cast frame processor
///
/// Built once from the cast config; [`FrameProcessor::process`] runs the
/// whole chain on each frame.
#[derive(Debug, Clone)]
pub struct FrameProcessor {
    width: u32,
    height: u32,
    keep_ratio: bool,
    interpolation: Interpolation,
    lut: GammaLut,
    color: ColorConfig,
    text: TextConfig,
    fps: f64,
    /// Shared by clones so the animation keeps running across frames
    overlay: Option<Arc<Mutex<TextAnimator>>>,
}

impl FrameProcessor {
    /// Create a processor producing frames of the cast output size
    pub fn new(config: &CastConfig) -> Result<Self> {
        let (width, height) = config.output_size();
        let lut = GammaLut::new(config.color.gamma)?;
        debug!(
            "Frame processor: {}x{} gamma={} auto_bright={} filters={}",
            width,
            height,
            config.color.gamma,
            config.color.auto_bright,
            config.color.has_filters()
        );

        let fps = config.rate.max(1) as f64;
        let overlay = if config.text.enabled {
            let animator = TextAnimator::new(&config.text, width, height, fps)?;
            Some(Arc::new(Mutex::new(animator)))
        } else {
            None
        };

        Ok(Self {
            width,
            height,
            keep_ratio: config.keep_ratio,
            interpolation: config.interpolation,
            lut,
            color: config.color.clone(),
            text: config.text.clone(),
            fps,
            overlay,
        })
    }

    /// Output dimensions
    pub fn output_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Change the output size (WLED matrix discovered after start)
    ///
    /// The text overlay is laid out again for the new size.
    pub fn set_output_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        if self.overlay.is_some() {
            self.overlay = match TextAnimator::new(&self.text, width, height, self.fps) {
                Ok(animator) => Some(Arc::new(Mutex::new(animator))),
                Err(e) => {
                    warn!("Dropping text overlay: {}", e);
                    None
                }
            };
        }
    }

    /// Whether a text overlay is drawn
    pub fn has_overlay(&self) -> bool {
        self.overlay.is_some()
    }

    /// Resize, gamma, auto brightness, filters, flip, text
    pub fn process(&self, frame: &Frame) -> Result<Frame> {
        let mut out = resize(
            frame,
            self.width,
            self.height,
            self.keep_ratio,
            self.interpolation,
        )?;

        if !self.lut.is_identity() {
            self.lut.apply(&mut out.image);
        }

        if self.color.auto_bright {
            auto_brightness_contrast(&mut out.image, self.color.clip_hist_percent);
        }

        if self.color.has_filters() {
            apply_filters(&mut out.image, &self.color);
        }

        if self.color.flip {
            flip(&mut out, self.color.flip_mode);
        }

        if let Some(overlay) = &self.overlay {
            overlay.lock().apply(&mut out.image);
        }

        Ok(out)
    }
}
