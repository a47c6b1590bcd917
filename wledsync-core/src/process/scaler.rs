//! Frame scaling and geometry
//!
//! Handles resolution changes between capture and the LED matrix size,
//! plus mirroring and the pixel-art preview used for snapshots.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use tracing::trace;

use crate::config::{FlipMode, Interpolation};
use crate::error::{Result, WledSyncError};
use crate::types::Frame;

fn filter_for(interp: Interpolation) -> FilterType {
    match interp {
        Interpolation::Nearest => FilterType::Nearest,
        Interpolation::Linear | Interpolation::Area => FilterType::Triangle,
        Interpolation::Cubic => FilterType::CatmullRom,
        Interpolation::Lanczos => FilterType::Lanczos3,
    }
}

fn resize_exact(image: &RgbImage, width: u32, height: u32, interp: Interpolation) -> RgbImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    match interp {
        // Box average over the source pixels of each target pixel
        Interpolation::Area if width <= image.width() && height <= image.height() => {
            imageops::thumbnail(image, width, height)
        }
        other => imageops::resize(image, width, height, filter_for(other)),
    }
}

/// Resize a frame to `width x height`
///
/// With `keep_ratio` the image is fitted inside the target and centered
/// on a black canvas.
pub fn resize(
    frame: &Frame,
    width: u32,
    height: u32,
    keep_ratio: bool,
    interp: Interpolation,
) -> Result<Frame> {
    if width == 0 || height == 0 {
        return Err(WledSyncError::process("Cannot resize to zero dimensions"));
    }
    if frame.width() == 0 || frame.height() == 0 {
        return Err(WledSyncError::process("Cannot resize an empty frame"));
    }

    if !keep_ratio {
        let image = resize_exact(&frame.image, width, height, interp);
        return Ok(Frame::new(image, frame.pts));
    }

    let (fit_w, fit_h) = calculate_scaled_size(frame.width(), frame.height(), width, height);
    trace!(
        "Letterbox {}x{} -> {}x{} inside {}x{}",
        frame.width(),
        frame.height(),
        fit_w,
        fit_h,
        width,
        height
    );
    let fitted = resize_exact(&frame.image, fit_w, fit_h, interp);
    let mut canvas = RgbImage::from_pixel(width, height, Rgb([0, 0, 0]));
    imageops::replace(
        &mut canvas,
        &fitted,
        ((width - fit_w) / 2) as i64,
        ((height - fit_h) / 2) as i64,
    );
    Ok(Frame::new(canvas, frame.pts))
}

/// Calculate scaled dimensions maintaining aspect ratio
pub fn calculate_scaled_size(
    src_width: u32,
    src_height: u32,
    max_width: u32,
    max_height: u32,
) -> (u32, u32) {
    let src_aspect = src_width as f64 / src_height as f64;
    let dst_aspect = max_width as f64 / max_height as f64;

    if src_aspect > dst_aspect {
        // Width-limited
        let height = (max_width as f64 / src_aspect) as u32;
        (max_width, height.max(1))
    } else {
        // Height-limited
        let width = (max_height as f64 * src_aspect) as u32;
        (width.max(1), max_height)
    }
}

/// Blocky preview: shrink to `width x height`, blow back up to the original size
pub fn pixelart(frame: &Frame, width: u32, height: u32) -> Result<Frame> {
    if width == 0 || height == 0 {
        return Err(WledSyncError::process("Pixel-art size cannot be zero"));
    }
    let small = imageops::resize(&frame.image, width, height, FilterType::Triangle);
    let big = imageops::resize(&small, frame.width(), frame.height(), FilterType::Nearest);
    Ok(Frame::new(big, frame.pts))
}

/// Mirror a frame in place
pub fn flip(frame: &mut Frame, mode: FlipMode) {
    match mode {
        FlipMode::Vertical => imageops::flip_vertical_in_place(&mut frame.image),
        FlipMode::Horizontal => imageops::flip_horizontal_in_place(&mut frame.image),
        FlipMode::Both => {
            imageops::flip_vertical_in_place(&mut frame.image);
            imageops::flip_horizontal_in_place(&mut frame.image);
        }
    }
}

/// Lay out same-size frames on a grid, `cols` per row
pub fn grid(frames: &[Frame], cols: u32) -> Result<Frame> {
    let first = frames
        .first()
        .ok_or_else(|| WledSyncError::process("No frames to lay out"))?;
    if cols == 0 {
        return Err(WledSyncError::process("Grid needs at least one column"));
    }

    let (w, h) = (first.width(), first.height());
    let rows = (frames.len() as u32).div_ceil(cols);
    let mut canvas = RgbImage::new(w * cols.min(frames.len() as u32), h * rows);

    for (i, frame) in frames.iter().enumerate() {
        if (frame.width(), frame.height()) != (w, h) {
            return Err(WledSyncError::process(format!(
                "Grid frame {} is {}x{}, expected {}x{}",
                i,
                frame.width(),
                frame.height(),
                w,
                h
            )));
        }
        let (col, row) = (i as u32 % cols, i as u32 / cols);
        imageops::replace(&mut canvas, &frame.image, (col * w) as i64, (row * h) as i64);
    }

    Ok(Frame::new(canvas, first.pts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaled_size() {
        let (w, h) = calculate_scaled_size(1920, 1080, 64, 64);
        assert_eq!(w, 64);
        assert_eq!(h, 36);

        let (w, h) = calculate_scaled_size(1080, 1920, 64, 64);
        assert_eq!(w, 36);
        assert_eq!(h, 64);
    }

    #[test]
    fn test_resize_exact() {
        let frame = Frame::solid(640, 480, [200, 10, 10]);
        let out = resize(&frame, 16, 16, false, Interpolation::Area).unwrap();
        assert_eq!((out.width(), out.height()), (16, 16));
        assert_eq!(out.image.get_pixel(8, 8).0, [200, 10, 10]);
    }

    #[test]
    fn test_keep_ratio_letterboxes() {
        let frame = Frame::solid(200, 100, [255, 255, 255]);
        let out = resize(&frame, 20, 20, true, Interpolation::Linear).unwrap();
        assert_eq!((out.width(), out.height()), (20, 20));
        assert_eq!(out.image.get_pixel(10, 0).0, [0, 0, 0]);
        assert_eq!(out.image.get_pixel(10, 10).0, [255, 255, 255]);
    }

    #[test]
    fn test_flip_horizontal() {
        let mut frame = Frame::from_raw(2, 1, vec![1, 1, 1, 2, 2, 2]).unwrap();
        flip(&mut frame, FlipMode::Horizontal);
        assert_eq!(frame.as_bytes(), &[2, 2, 2, 1, 1, 1]);
    }

    #[test]
    fn test_grid() {
        let frames = vec![Frame::solid(2, 2, [1, 1, 1]); 3];
        let out = grid(&frames, 2).unwrap();
        assert_eq!((out.width(), out.height()), (4, 4));
    }
}
