//! Color correction and per-pixel effects
//!
//! All operations work on packed RGB24 and saturate to `0..=255`.

use image::RgbImage;

use crate::config::ColorConfig;
use crate::error::{Result, WledSyncError};

/// BT.601 luma of an RGB pixel
#[inline]
pub fn luma(px: &[u8]) -> f32 {
    0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32
}

#[inline]
fn saturate(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// 256-entry gamma lookup table
#[derive(Debug, Clone)]
pub struct GammaLut {
    gamma: f64,
    table: [u8; 256],
}

impl GammaLut {
    /// Build the table: `((i / 255) ^ (1 / gamma)) * 255`, truncated
    pub fn new(gamma: f64) -> Result<Self> {
        if !gamma.is_finite() || gamma <= 0.0 {
            return Err(WledSyncError::process(format!(
                "Gamma must be positive, got {}",
                gamma
            )));
        }

        let inverse = 1.0 / gamma;
        let mut table = [0u8; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            *entry = ((i as f64 / 255.0).powf(inverse) * 255.0) as u8;
        }

        Ok(Self { gamma, table })
    }

    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Whether the table maps every value to itself
    pub fn is_identity(&self) -> bool {
        self.table.iter().enumerate().all(|(i, v)| *v as usize == i)
    }

    pub fn lookup(&self, value: u8) -> u8 {
        self.table[value as usize]
    }

    pub fn apply(&self, image: &mut RgbImage) {
        for v in image.iter_mut() {
            *v = self.table[*v as usize];
        }
    }
}

/// Stretch the gray histogram to the full range
///
/// `clip_hist_percent` of the pixels (split between both ends) are
/// allowed to saturate.
pub fn auto_brightness_contrast(image: &mut RgbImage, clip_hist_percent: f64) {
    let mut hist = [0u64; 256];
    for px in image.pixels() {
        hist[saturate(luma(&px.0)) as usize] += 1;
    }

    let mut accumulator = [0f64; 256];
    let mut sum = 0f64;
    for (acc, count) in accumulator.iter_mut().zip(hist.iter()) {
        sum += *count as f64;
        *acc = sum;
    }

    let maximum = accumulator[255];
    let clip = clip_hist_percent * (maximum / 100.0) / 2.0;

    let mut min_gray = 0usize;
    while min_gray < 255 && accumulator[min_gray] < clip {
        min_gray += 1;
    }

    let mut max_gray = 255usize;
    while max_gray > 0 && accumulator[max_gray] >= maximum - clip {
        max_gray -= 1;
    }

    let range = max_gray as f64 - min_gray as f64;
    let alpha = if range > 0.0 { 255.0 / range } else { 255.0 / 0.1 };
    let beta = -(min_gray as f64) * alpha;

    for v in image.iter_mut() {
        *v = saturate((alpha * *v as f64 + beta).abs() as f32);
    }
}

/// Blend every pixel with its own gray value
pub fn adjust_saturation(image: &mut RgbImage, percent: i32) {
    let alpha = 1.0 + percent as f32 / 100.0;
    for px in image.pixels_mut() {
        let gray = luma(&px.0);
        for c in px.0.iter_mut() {
            *c = saturate(gray + (*c as f32 - gray) * alpha);
        }
    }
}

/// Scale all channels towards black or white
pub fn adjust_brightness(image: &mut RgbImage, percent: i32) {
    let alpha = 1.0 + percent as f32 / 100.0;
    for v in image.iter_mut() {
        *v = saturate(*v as f32 * alpha);
    }
}

/// Blend with the mean luminance of the image
pub fn adjust_contrast(image: &mut RgbImage, percent: i32) {
    let pixels = image.width() as f64 * image.height() as f64;
    if pixels == 0.0 {
        return;
    }
    let mean = (image.pixels().map(|px| luma(&px.0) as f64).sum::<f64>() / pixels) as f32;
    let alpha = 1.0 + percent as f32 / 100.0;
    for v in image.iter_mut() {
        *v = saturate(mean + (*v as f32 - mean) * alpha);
    }
}

/// Laplacian sharpen, kernel `[[0,-a,0],[-a,1+4a,-a],[0,-a,0]]`
pub fn sharpen(image: &mut RgbImage, percent: i32) {
    let a = percent as f32 / 100.0;
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    let src = image.clone();
    let at = |x: i64, y: i64, c: usize| -> f32 {
        let x = x.clamp(0, w as i64 - 1) as u32;
        let y = y.clamp(0, h as i64 - 1) as u32;
        src.get_pixel(x, y).0[c] as f32
    };

    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let px = image.get_pixel_mut(x as u32, y as u32);
            for c in 0..3 {
                let neighbours = at(x - 1, y, c) + at(x + 1, y, c) + at(x, y - 1, c) + at(x, y + 1, c);
                let center = at(x, y, c);
                px.0[c] = saturate(center * (1.0 + 4.0 * a) - neighbours * a);
            }
        }
    }
}

/// Multiply each channel by its factor; 0 leaves the channel alone
pub fn balance(image: &mut RgbImage, r: f64, g: f64, b: f64) {
    let factor = |f: f64| if f == 0.0 { 1.0 } else { f as f32 };
    let scale = [factor(r), factor(g), factor(b)];
    for px in image.pixels_mut() {
        for (c, s) in px.0.iter_mut().zip(scale) {
            *c = saturate(*c as f32 * s);
        }
    }
}

/// Apply the non-zero filters of `color`, in a fixed order
pub fn apply_filters(image: &mut RgbImage, color: &ColorConfig) {
    if color.saturation != 0 {
        adjust_saturation(image, color.saturation);
    }
    if color.brightness != 0 {
        adjust_brightness(image, color.brightness);
    }
    if color.contrast != 0 {
        adjust_contrast(image, color.contrast);
    }
    if color.sharpen != 0 {
        sharpen(image, color.sharpen);
    }
    if color.balance_r != 0.0 || color.balance_g != 0.0 || color.balance_b != 0.0 {
        balance(image, color.balance_r, color.balance_g, color.balance_b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_gamma_table() {
        let lut = GammaLut::new(0.5).unwrap();
        assert_eq!(lut.lookup(0), 0);
        assert_eq!(lut.lookup(255), 255);
        // (128/255)^2 * 255 = 64.25
        assert_eq!(lut.lookup(128), 64);
        assert!(GammaLut::new(0.0).is_err());
    }

    #[test]
    fn test_brightness_saturates() {
        let mut img = RgbImage::from_pixel(2, 2, Rgb([200, 100, 0]));
        adjust_brightness(&mut img, 50);
        assert_eq!(img.get_pixel(0, 0).0, [255, 150, 0]);
    }

    #[test]
    fn test_full_desaturation_is_gray() {
        let mut img = RgbImage::from_pixel(1, 1, Rgb([255, 0, 0]));
        adjust_saturation(&mut img, -100);
        let px = img.get_pixel(0, 0).0;
        assert_eq!(px[0], px[1]);
        assert_eq!(px[1], px[2]);
    }

    #[test]
    fn test_sharpen_flat_image_unchanged() {
        let mut img = RgbImage::from_pixel(4, 4, Rgb([90, 90, 90]));
        sharpen(&mut img, 80);
        assert!(img.pixels().all(|p| p.0 == [90, 90, 90]));
    }

    #[test]
    fn test_balance_zero_is_identity() {
        let mut img = RgbImage::from_pixel(1, 1, Rgb([100, 100, 100]));
        balance(&mut img, 2.0, 0.0, 0.5);
        assert_eq!(img.get_pixel(0, 0).0, [200, 100, 50]);
    }

    #[test]
    fn test_auto_brightness_stretches_range() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([100, 100, 100]));
        img.put_pixel(1, 0, Rgb([150, 150, 150]));
        auto_brightness_contrast(&mut img, 25.0);
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(img.get_pixel(1, 0).0[0], 255);
    }
}
