//! File based sources
//!
//! A media path can be a still image, an animated GIF, a directory of
//! images (played in name order) or, with the `video` feature, any video
//! file ffmpeg can decode.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage};
use tracing::{debug, info};

use super::{FrameSource, SourceFrame};
use crate::error::{Result, WledSyncError};
use crate::types::{Frame, SourceInfo, SourceKind};

/// Extensions decoded with the `image` crate
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "bmp", "gif", "webp", "tif", "tiff", "tga", "ico", "pnm", "qoi",
];

/// Extensions routed to the video decoder
pub const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "webm", "m4v", "mpg", "mpeg", "flv", "wmv", "ts",
];

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

pub fn is_image_file(path: &Path) -> bool {
    extension(path).is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.as_str()))
}

pub fn is_video_file(path: &Path) -> bool {
    extension(path).is_some_and(|e| VIDEO_EXTENSIONS.contains(&e.as_str()))
}

/// A decoded frame and how long it stays on screen
#[derive(Debug, Clone)]
struct TimedFrame {
    frame: Frame,
    delay: Option<Duration>,
}

enum Content {
    Frames(Vec<TimedFrame>),
    #[cfg(feature = "video")]
    Video(video::VideoDecoder),
}

/// Source reading a file or directory
pub struct MediaSource {
    path: PathBuf,
    content: Content,
    position: usize,
    dimensions: Option<(u32, u32)>,
}

impl MediaSource {
    /// Open `path` and decode what can be decoded up front
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(WledSyncError::SourceNotFound(path.display().to_string()));
        }

        let content = if path.is_dir() {
            Content::Frames(load_directory(&path)?)
        } else if extension(&path).as_deref() == Some("gif") {
            Content::Frames(load_gif(&path)?)
        } else if is_video_file(&path) {
            open_video(&path)?
        } else {
            let image = image::open(&path)?;
            Content::Frames(vec![TimedFrame {
                frame: Frame::new(image.to_rgb8(), 0),
                delay: None,
            }])
        };

        let dimensions = match &content {
            Content::Frames(frames) => frames.first().map(|f| (f.frame.width(), f.frame.height())),
            #[cfg(feature = "video")]
            Content::Video(decoder) => Some(decoder.dimensions()),
        };

        let source = Self {
            path,
            content,
            position: 0,
            dimensions,
        };
        info!(
            "Opened media {} ({} frames)",
            source.path.display(),
            source
                .frame_count()
                .map_or_else(|| "unknown".to_string(), |n| n.to_string())
        );
        Ok(source)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSource for MediaSource {
    fn info(&self) -> SourceInfo {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string());
        let info = SourceInfo::new(self.path.display().to_string(), name, SourceKind::Media);
        match self.dimensions {
            Some((w, h)) => info.with_dimensions(w, h),
            None => info,
        }
    }

    fn next_frame(&mut self) -> Result<SourceFrame> {
        match &mut self.content {
            Content::Frames(frames) => match frames.get(self.position) {
                Some(timed) => {
                    let mut frame = timed.frame.clone();
                    frame.pts = self.position as u64;
                    self.position += 1;
                    Ok(SourceFrame::Frame(frame))
                }
                None => Ok(SourceFrame::End),
            },
            #[cfg(feature = "video")]
            Content::Video(decoder) => match decoder.next()? {
                Some(mut frame) => {
                    frame.pts = self.position as u64;
                    self.position += 1;
                    Ok(SourceFrame::Frame(frame))
                }
                None => Ok(SourceFrame::End),
            },
        }
    }

    fn frame_count(&self) -> Option<usize> {
        match &self.content {
            Content::Frames(frames) => Some(frames.len()),
            #[cfg(feature = "video")]
            Content::Video(decoder) => decoder.frame_count(),
        }
    }

    fn rate_hint(&self) -> Option<f64> {
        match &self.content {
            Content::Frames(frames) => {
                let delays: Vec<Duration> = frames.iter().filter_map(|f| f.delay).collect();
                if delays.is_empty() {
                    return None;
                }
                let average = delays.iter().sum::<Duration>() / delays.len() as u32;
                (!average.is_zero()).then(|| 1.0 / average.as_secs_f64())
            }
            #[cfg(feature = "video")]
            Content::Video(decoder) => decoder.rate(),
        }
    }

    fn restart(&mut self) -> Result<()> {
        self.position = 0;
        #[cfg(feature = "video")]
        if let Content::Video(decoder) = &mut self.content {
            decoder.rewind()?;
        }
        debug!("Media {} rewound", self.path.display());
        Ok(())
    }
}

fn load_directory(dir: &Path) -> Result<Vec<TimedFrame>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_image_file(p))
        .collect();
    paths.sort();

    if paths.is_empty() {
        return Err(WledSyncError::capture(format!(
            "No images in {}",
            dir.display()
        )));
    }

    paths
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let image = image::open(p).map_err(|e| {
                WledSyncError::capture(format!("{}: {}", p.display(), e))
            })?;
            Ok(TimedFrame {
                frame: Frame::new(image.to_rgb8(), i as u64),
                delay: None,
            })
        })
        .collect()
}

fn load_gif(path: &Path) -> Result<Vec<TimedFrame>> {
    let reader = BufReader::new(File::open(path)?);
    let decoder = GifDecoder::new(reader)?;
    let frames = decoder.into_frames().collect_frames()?;

    let timed: Vec<TimedFrame> = frames
        .into_iter()
        .enumerate()
        .map(|(i, f)| {
            let (numer, denom) = f.delay().numer_denom_ms();
            let ms = numer as f64 / denom.max(1) as f64;
            let rgb = DynamicImage::ImageRgba8(f.into_buffer()).to_rgb8();
            TimedFrame {
                frame: Frame::new(rgb, i as u64),
                delay: (ms > 0.0).then(|| Duration::from_secs_f64(ms / 1000.0)),
            }
        })
        .collect();

    if timed.is_empty() {
        return Err(WledSyncError::capture(format!(
            "{} has no frames",
            path.display()
        )));
    }
    debug!("GIF {} decoded, {} frames", path.display(), timed.len());
    Ok(timed)
}

#[cfg(feature = "video")]
fn open_video(path: &Path) -> Result<Content> {
    Ok(Content::Video(video::VideoDecoder::open(path)?))
}

#[cfg(not(feature = "video"))]
fn open_video(path: &Path) -> Result<Content> {
    Err(WledSyncError::Unsupported(format!(
        "{}: video files need the video feature",
        path.display()
    )))
}

#[cfg(feature = "video")]
mod video {
    use std::path::{Path, PathBuf};

    use ffmpeg::format::{input, Pixel};
    use ffmpeg::media::Type;
    use ffmpeg::software::scaling::{self, Flags};
    use ffmpeg::util::frame::video::Video;
    use ffmpeg_next as ffmpeg;

    use crate::error::{Result, WledSyncError};
    use crate::types::Frame;

    struct Scaler(scaling::Context);

    // SAFETY: the context is owned by a single decoder and only used from
    // whichever thread currently holds the source.
    unsafe impl Send for Scaler {}

    pub struct VideoDecoder {
        path: PathBuf,
        input: ffmpeg::format::context::Input,
        stream_index: usize,
        decoder: ffmpeg::decoder::Video,
        scaler: Scaler,
        rate: Option<f64>,
        frame_count: Option<usize>,
        eof: bool,
    }

    impl VideoDecoder {
        pub fn open(path: &Path) -> Result<Self> {
            ffmpeg::init()
                .map_err(|e| WledSyncError::capture(format!("FFmpeg init failed: {}", e)))?;

            let input = input(&path)?;
            let stream = input
                .streams()
                .best(Type::Video)
                .ok_or_else(|| WledSyncError::capture(format!("{}: no video stream", path.display())))?;
            let stream_index = stream.index();

            let rate = f64::from(stream.avg_frame_rate());
            let rate = (rate.is_finite() && rate > 0.0).then_some(rate);
            let frame_count = (stream.frames() > 0).then_some(stream.frames() as usize);

            let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?;
            let decoder = context.decoder().video()?;
            let scaler = scaling::Context::get(
                decoder.format(),
                decoder.width(),
                decoder.height(),
                Pixel::RGB24,
                decoder.width(),
                decoder.height(),
                Flags::BILINEAR,
            )?;

            Ok(Self {
                path: path.to_path_buf(),
                input,
                stream_index,
                decoder,
                scaler: Scaler(scaler),
                rate,
                frame_count,
                eof: false,
            })
        }

        pub fn dimensions(&self) -> (u32, u32) {
            (self.decoder.width(), self.decoder.height())
        }

        pub fn rate(&self) -> Option<f64> {
            self.rate
        }

        pub fn frame_count(&self) -> Option<usize> {
            self.frame_count
        }

        /// Decode the next frame, `None` at the end of the stream
        pub fn next(&mut self) -> Result<Option<Frame>> {
            let mut decoded = Video::empty();
            loop {
                if self.decoder.receive_frame(&mut decoded).is_ok() {
                    return self.convert(&decoded).map(Some);
                }
                if self.eof {
                    return Ok(None);
                }

                let mut sent = false;
                for (stream, packet) in self.input.packets() {
                    if stream.index() == self.stream_index {
                        self.decoder.send_packet(&packet)?;
                        sent = true;
                        break;
                    }
                }
                if !sent {
                    self.decoder.send_eof()?;
                    self.eof = true;
                }
            }
        }

        fn convert(&mut self, decoded: &Video) -> Result<Frame> {
            let mut rgb = Video::empty();
            self.scaler.0.run(decoded, &mut rgb)?;

            let (width, height) = (rgb.width(), rgb.height());
            let stride = rgb.stride(0);
            let row = width as usize * 3;
            let data = rgb.data(0);
            let mut packed = Vec::with_capacity(row * height as usize);
            for y in 0..height as usize {
                packed.extend_from_slice(&data[y * stride..y * stride + row]);
            }
            Frame::from_raw(width, height, packed)
        }

        /// Reopen the file from the start
        pub fn rewind(&mut self) -> Result<()> {
            *self = Self::open(&self.path.clone())?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_still_image_yields_one_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("red.png");
        RgbImage::from_pixel(4, 2, Rgb([255, 0, 0])).save(&path).unwrap();

        let mut source = MediaSource::open(&path).unwrap();
        assert_eq!(source.info().dimensions, Some((4, 2)));
        assert!(matches!(source.next_frame().unwrap(), SourceFrame::Frame(_)));
        assert!(matches!(source.next_frame().unwrap(), SourceFrame::End));

        source.restart().unwrap();
        assert!(matches!(source.next_frame().unwrap(), SourceFrame::Frame(_)));
    }

    #[test]
    fn test_directory_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        RgbImage::from_pixel(1, 1, Rgb([2, 2, 2])).save(dir.path().join("b.png")).unwrap();
        RgbImage::from_pixel(1, 1, Rgb([1, 1, 1])).save(dir.path().join("a.png")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "skip").unwrap();

        let mut source = MediaSource::open(dir.path()).unwrap();
        assert_eq!(source.frame_count(), Some(2));
        let SourceFrame::Frame(first) = source.next_frame().unwrap() else {
            panic!("expected a frame");
        };
        assert_eq!(first.as_bytes(), &[1, 1, 1]);
    }

    #[test]
    fn test_missing_path() {
        assert!(matches!(
            MediaSource::open("/nonexistent/clip.png"),
            Err(WledSyncError::SourceNotFound(_))
        ));
    }

    #[test]
    fn test_extension_detection() {
        assert!(is_video_file(Path::new("clip.MP4")));
        assert!(is_image_file(Path::new("frame.jpeg")));
        assert!(!is_image_file(Path::new("clip.mkv")));
    }
}
