//! Animated text overlay
//!
//! The text is rasterized once into a coverage mask through `usvg`/`resvg`.
//! Each frame then moves the mask along the scroll direction, advances the
//! effect, and blends the mask over the processed frame in the current color.
//!
//! Horizontal scrolling travels over the text width plus one frame width
//! before wrapping, so a blank frame width separates two passes. Vertical
//! scrolling does the same with heights.

use std::path::Path;
use std::sync::{Arc, OnceLock};

use image::{GrayImage, Luma, RgbImage};
use tracing::{debug, warn};
use usvg::fontdb::{Database, Family, Query, Stretch, Style, Weight};

use crate::config::{ScrollDirection, TextConfig, TextEffect};
use crate::error::{Result, WledSyncError};

/// Widest mask rendered, in pixels
const MAX_TEXT_WIDTH: u32 = 8192;

/// Colors stepped through by [`TextEffect::ColorCycle`]
pub const COLOR_CYCLE: [[u8; 3]; 6] = [
    [255, 0, 0],
    [0, 255, 0],
    [0, 0, 255],
    [255, 255, 0],
    [255, 0, 255],
    [0, 255, 255],
];

static SYSTEM_FONTS: OnceLock<Arc<Database>> = OnceLock::new();

/// System fonts, loaded on first use
fn system_fonts() -> Arc<Database> {
    Arc::clone(SYSTEM_FONTS.get_or_init(|| {
        let mut db = Database::new();
        db.load_system_fonts();
        debug!("Loaded {} system font faces", db.len());
        Arc::new(db)
    }))
}

/// Font database and family name for the overlay settings
fn font_source(settings: &TextConfig) -> Result<(Arc<Database>, String)> {
    let Some(path) = &settings.font_file else {
        return Ok((system_fonts(), settings.font_family.clone()));
    };

    let mut db = (*system_fonts()).clone();
    let known = db.len();
    db.load_font_file(path)
        .map_err(|e| WledSyncError::config(format!("Font {}: {}", path.display(), e)))?;
    let family = db
        .faces()
        .skip(known)
        .find_map(|face| face.families.first().map(|(name, _)| name.clone()))
        .ok_or_else(|| font_error(path))?;
    debug!("Text font {} from {}", family, path.display());
    Ok((Arc::new(db), family))
}

/// Resolve the requested family, falling back to sans-serif then any face
fn font_resolver() -> usvg::FontResolver<'static> {
    usvg::FontResolver {
        select_font: Box::new(|font, fontdb| {
            let mut families: Vec<Family<'_>> = font
                .families()
                .iter()
                .map(|family| match family {
                    usvg::FontFamily::Serif => Family::Serif,
                    usvg::FontFamily::SansSerif => Family::SansSerif,
                    usvg::FontFamily::Cursive => Family::Cursive,
                    usvg::FontFamily::Fantasy => Family::Fantasy,
                    usvg::FontFamily::Monospace => Family::Monospace,
                    usvg::FontFamily::Named(name) => Family::Name(name),
                })
                .collect();
            families.push(Family::SansSerif);

            let query = Query {
                families: &families,
                weight: Weight(font.weight()),
                stretch: Stretch::Normal,
                style: Style::Normal,
            };
            fontdb
                .query(&query)
                .or_else(|| fontdb.faces().next().map(|face| face.id))
        }),
        select_fallback: usvg::FontResolver::default_fallback_selector(),
    }
}

fn font_error(path: &Path) -> WledSyncError {
    WledSyncError::config(format!("Font {} has no usable face", path.display()))
}

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// Rasterize `text` into a coverage mask one line high
///
/// The mask is as wide as the inked text; it is empty (zero wide) when no
/// font can draw the text.
pub fn render_text(text: &str, font_size: f32, family: &str, fontdb: Arc<Database>) -> Result<GrayImage> {
    let line_height = (font_size * 1.25).ceil().max(1.0) as u32;
    let canvas_width = ((text.chars().count() as f32 + 1.0) * font_size)
        .ceil()
        .clamp(1.0, MAX_TEXT_WIDTH as f32) as u32;

    let svg = format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{canvas_width}" height="{line_height}"><text x="0" y="{font_size}" font-family="{}" font-size="{font_size}" fill="white">{}</text></svg>"#,
        xml_escape(family),
        xml_escape(text),
    );
    let opts = usvg::Options {
        fontdb,
        font_resolver: font_resolver(),
        ..Default::default()
    };
    let tree = usvg::Tree::from_data(svg.as_bytes(), &opts)
        .map_err(|e| WledSyncError::process(format!("Cannot lay out text: {}", e)))?;

    let inked = tree.root().abs_bounding_box().right().ceil();
    let width = if inked.is_finite() && inked > 0.0 {
        (inked as u32).min(canvas_width)
    } else {
        0
    };
    if width == 0 {
        return Ok(GrayImage::new(0, line_height));
    }

    let mut pixmap = resvg::tiny_skia::Pixmap::new(canvas_width, line_height)
        .ok_or_else(|| WledSyncError::process("Cannot allocate text pixmap"))?;
    resvg::render(
        &tree,
        resvg::tiny_skia::Transform::identity(),
        &mut pixmap.as_mut(),
    );

    // White fill: the premultiplied alpha is the coverage
    let data = pixmap.data();
    Ok(GrayImage::from_fn(width, line_height, |x, y| {
        Luma([data[((y * canvas_width + x) * 4 + 3) as usize]])
    }))
}

/// Fully saturated color at `hue` degrees
pub fn hue_color(hue: u32) -> [u8; 3] {
    let h = (hue % 360) as f64 / 60.0;
    let x = 1.0 - (h % 2.0 - 1.0).abs();
    let (r, g, b) = match h as u32 {
        0 => (1.0, x, 0.0),
        1 => (x, 1.0, 0.0),
        2 => (0.0, 1.0, x),
        3 => (0.0, x, 1.0),
        4 => (x, 0.0, 1.0),
        _ => (1.0, 0.0, x),
    };
    [
        (r * 255.0_f64).round() as u8,
        (g * 255.0_f64).round() as u8,
        (b * 255.0_f64).round() as u8,
    ]
}

/// Per-cast text animation state
#[derive(Debug, Clone)]
pub struct TextAnimator {
    settings: TextConfig,
    mask: GrayImage,
    width: u32,
    height: u32,
    fps: f64,
    x: f64,
    y: f64,
    color: [u8; 3],
    /// Current opacity out of 255
    level: i32,
    /// Opacity ceiling out of 255
    peak: i32,
    visible: bool,
    fading_in: bool,
    /// Frames since the last blink toggle or color step
    effect_frames: u64,
    color_index: usize,
    frames: u64,
}

impl TextAnimator {
    /// Render the text for a `width` x `height` frame cast at `fps`
    pub fn new(settings: &TextConfig, width: u32, height: u32, fps: f64) -> Result<Self> {
        let font_size = settings.font_size.unwrap_or(height as f32 * 0.5).max(1.0);
        let (fontdb, family) = font_source(settings)?;
        let mask = render_text(&settings.text, font_size, &family, fontdb)?;
        if mask.width() == 0 {
            warn!(
                "Text '{}' rendered empty, no font found for '{}'",
                settings.text, family
            );
        } else {
            debug!(
                "Text overlay '{}' {}x{} px, {:?} {:?}",
                settings.text,
                mask.width(),
                mask.height(),
                settings.direction,
                settings.effect
            );
        }
        Ok(Self::with_mask(settings, mask, width, height, fps))
    }

    /// Animate an already rendered coverage mask
    pub fn with_mask(settings: &TextConfig, mask: GrayImage, width: u32, height: u32, fps: f64) -> Self {
        let peak = (settings.opacity.clamp(0.0, 1.0) * 255.0).round() as i32;
        let mut animator = Self {
            settings: settings.clone(),
            mask,
            width,
            height,
            fps: fps.max(1.0),
            x: 0.0,
            y: 0.0,
            color: settings.color,
            level: if settings.effect == TextEffect::Fade { 0 } else { peak },
            peak,
            visible: true,
            fading_in: true,
            effect_frames: 0,
            color_index: 0,
            frames: 0,
        };
        animator.reset_position();
        animator
    }

    fn reset_position(&mut self) {
        let (w, h) = (self.width as f64, self.height as f64);
        let (mw, mh) = (self.mask.width() as f64, self.mask.height() as f64);
        let centered_x = ((w - mw) / 2.0).max(0.0).floor();
        let centered_y = ((h - mh) / 2.0).max(0.0).floor();

        (self.x, self.y) = if self.settings.speed == 0.0 {
            (centered_x, centered_y)
        } else {
            match self.settings.direction {
                ScrollDirection::Left => (w, centered_y),
                ScrollDirection::Right => (-(mw + w), centered_y),
                ScrollDirection::Up => (centered_x, h),
                ScrollDirection::Down => (centered_x, -(mh + h)),
            }
        };
    }

    /// Top-left corner of the text in frame coordinates
    pub fn position(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    pub fn color(&self) -> [u8; 3] {
        self.color
    }

    /// Opacity the next draw uses, 0 while blinked out
    pub fn opacity(&self) -> f64 {
        if self.visible {
            self.level as f64 / 255.0
        } else {
            0.0
        }
    }

    pub fn mask_size(&self) -> (u32, u32) {
        self.mask.dimensions()
    }

    /// Move one frame along the scroll and step the effect
    pub fn advance(&mut self) {
        self.frames += 1;
        self.scroll();

        let fps = self.fps;
        match self.settings.effect {
            TextEffect::None => {}
            TextEffect::Blink => {
                self.effect_frames += 1;
                if self.effect_frames as f64 >= (fps * self.settings.blink_interval).max(1.0) {
                    self.effect_frames = 0;
                    self.visible = !self.visible;
                }
            }
            TextEffect::Fade => {
                let step = self.settings.fade_step as i32;
                if self.fading_in {
                    self.level += step;
                    if self.level >= self.peak {
                        self.level = self.peak;
                        self.fading_in = false;
                    }
                } else {
                    self.level -= step;
                    if self.level <= 0 {
                        self.level = 0;
                        self.fading_in = true;
                    }
                }
            }
            TextEffect::ColorCycle => {
                self.effect_frames += 1;
                if self.effect_frames as f64 >= (fps * self.settings.color_interval).max(1.0) {
                    self.effect_frames = 0;
                    self.color_index = (self.color_index + 1) % COLOR_CYCLE.len();
                    self.color = COLOR_CYCLE[self.color_index];
                }
            }
            TextEffect::RainbowCycle => {
                self.color = hue_color((self.frames % 360) as u32);
            }
        }
    }

    fn scroll(&mut self) {
        let step = self.settings.speed / self.fps;
        if step == 0.0 {
            return;
        }
        let (w, h) = (self.width as f64, self.height as f64);
        let span_x = self.mask.width() as f64 + w;
        let span_y = self.mask.height() as f64 + h;

        match self.settings.direction {
            ScrollDirection::Left => {
                self.x -= step;
                if self.x <= -span_x {
                    self.x = w;
                }
            }
            ScrollDirection::Right => {
                self.x += step;
                if self.x >= w {
                    self.x = -span_x;
                }
            }
            ScrollDirection::Up => {
                self.y -= step;
                if self.y <= -span_y {
                    self.y = h;
                }
            }
            ScrollDirection::Down => {
                self.y += step;
                if self.y >= h {
                    self.y = -span_y;
                }
            }
        }
    }

    /// Blend the text over `image` at the current position
    pub fn draw(&self, image: &mut RgbImage) {
        let opacity = self.opacity();
        if opacity <= 0.0 || self.mask.width() == 0 {
            return;
        }

        let (ox, oy) = (self.x.floor() as i64, self.y.floor() as i64);
        let (iw, ih) = (image.width() as i64, image.height() as i64);
        for (mx, my, coverage) in self.mask.enumerate_pixels() {
            let (x, y) = (ox + mx as i64, oy + my as i64);
            if coverage[0] == 0 || x < 0 || y < 0 || x >= iw || y >= ih {
                continue;
            }
            let a = coverage[0] as f64 / 255.0 * opacity;
            let px = image.get_pixel_mut(x as u32, y as u32);
            for (dst, src) in px.0.iter_mut().zip(self.color) {
                *dst = (*dst as f64 * (1.0 - a) + src as f64 * a).round() as u8;
            }
        }
    }

    /// Advance one frame and draw over `image`
    pub fn apply(&mut self, image: &mut RgbImage) {
        self.advance();
        self.draw(image);
    }
}
