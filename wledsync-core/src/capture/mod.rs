//! Frame sources for a cast
//!
//! This module handles:
//! - Image, GIF, image directory and video files ([`media`])
//! - Frames pushed from the mobile WebSocket server ([`queue`])
//! - Monitors, windows and screen areas (feature `desktop`)
//! - Cameras (feature `webcam`)
//!
//! Sources are synchronous; the pipeline drives them from a blocking task.

pub mod media;
pub mod queue;

#[cfg(feature = "desktop")]
pub mod desktop;
#[cfg(feature = "webcam")]
pub mod webcam;

pub use media::MediaSource;
pub use queue::{FrameQueues, QueueSource, QueueSettings};

use crate::error::{Result, WledSyncError};
use crate::types::{CastSource, Frame, SourceInfo};

/// Queue used when a source string just says `queue`
pub const DEFAULT_QUEUE: &str = "mobile";

/// Result of polling a source
#[derive(Debug, Clone)]
pub enum SourceFrame {
    /// A new frame
    Frame(Frame),
    /// Nothing new yet, poll again on the next tick
    Pending,
    /// The source is exhausted
    End,
}

/// Something frames can be pulled from
pub trait FrameSource: Send {
    /// Description of the source
    fn info(&self) -> SourceInfo;

    /// Pull the next frame
    fn next_frame(&mut self) -> Result<SourceFrame>;

    /// Native frame rate, when the source has one
    fn rate_hint(&self) -> Option<f64> {
        None
    }

    /// Number of frames, for sources with a known length
    fn frame_count(&self) -> Option<usize> {
        None
    }

    /// Rewind to the first frame (used for repeats)
    fn restart(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Open the source described by `source`
pub fn open_source(source: &CastSource, queues: &FrameQueues) -> Result<Box<dyn FrameSource>> {
    match source {
        CastSource::Media { path } => Ok(Box::new(MediaSource::open(path)?)),
        CastSource::Queue { name } => Ok(Box::new(queues.source(name))),

        #[cfg(feature = "desktop")]
        CastSource::Desktop { monitor } => {
            Ok(Box::new(desktop::DesktopSource::monitor(monitor.as_deref())?))
        }
        #[cfg(feature = "desktop")]
        CastSource::Window { title } => Ok(Box::new(desktop::DesktopSource::window(title)?)),
        #[cfg(feature = "desktop")]
        CastSource::Area {
            x,
            y,
            width,
            height,
            monitor,
        } => Ok(Box::new(desktop::DesktopSource::area(
            monitor.as_deref(),
            *x,
            *y,
            *width,
            *height,
        )?)),
        #[cfg(not(feature = "desktop"))]
        CastSource::Desktop { .. } | CastSource::Window { .. } | CastSource::Area { .. } => {
            Err(WledSyncError::Unsupported(format!(
                "{} capture needs the desktop feature",
                source.kind()
            )))
        }

        #[cfg(feature = "webcam")]
        CastSource::Webcam { index } => Ok(Box::new(webcam::WebcamSource::open(*index)?)),
        #[cfg(not(feature = "webcam"))]
        CastSource::Webcam { .. } => Err(WledSyncError::Unsupported(
            "Webcam capture needs the webcam feature".to_string(),
        )),
    }
}

/// List sources available with the enabled features
pub fn list_sources() -> Result<Vec<SourceInfo>> {
    #[allow(unused_mut)]
    let mut sources = Vec::new();

    #[cfg(feature = "desktop")]
    sources.extend(desktop::list_sources()?);

    #[cfg(feature = "webcam")]
    sources.extend(webcam::list_sources()?);

    Ok(sources)
}
