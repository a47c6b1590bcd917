//! Named frame queues
//!
//! The mobile server pushes decoded images into a queue by name and a cast
//! with a `queue:<name>` source reads the most recent one. Only the latest
//! frame is kept; a slow cast skips frames instead of falling behind.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::debug;

use super::{FrameSource, SourceFrame};
use crate::types::{Frame, SourceInfo, SourceKind};

/// Time without frames before the default image is shown
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
struct Queued {
    frame: Arc<Frame>,
    received: Instant,
    seq: u64,
}

/// How queue sources behave when the producer goes quiet
#[derive(Debug, Clone)]
pub struct QueueSettings {
    /// Shown when no frame arrived for `stale_after`; black when unset
    pub default_image: Option<Arc<Frame>>,
    pub stale_after: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            default_image: None,
            stale_after: DEFAULT_STALE_AFTER,
        }
    }
}

/// Registry of named queues, shared between producers and casts
#[derive(Debug, Clone, Default)]
pub struct FrameQueues {
    queues: Arc<RwLock<HashMap<String, watch::Sender<Option<Queued>>>>>,
    settings: QueueSettings,
}

impl FrameQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: QueueSettings) -> Self {
        Self {
            queues: Arc::default(),
            settings,
        }
    }

    fn sender(&self, name: &str) -> watch::Sender<Option<Queued>> {
        if let Some(tx) = self.queues.read().get(name) {
            return tx.clone();
        }
        self.queues
            .write()
            .entry(name.to_string())
            .or_insert_with(|| watch::channel(None).0)
            .clone()
    }

    /// Replace the latest frame of `name`
    pub fn push(&self, name: &str, frame: Frame) {
        let tx = self.sender(name);
        tx.send_modify(|slot| {
            let seq = slot.as_ref().map_or(1, |q| q.seq + 1);
            *slot = Some(Queued {
                frame: Arc::new(frame),
                received: Instant::now(),
                seq,
            });
        });
    }

    /// Latest frame of `name`, if any
    pub fn latest(&self, name: &str) -> Option<Frame> {
        let queues = self.queues.read();
        let tx = queues.get(name)?;
        let latest = tx.borrow().as_ref().map(|q| (*q.frame).clone());
        latest
    }

    /// Names of the queues created so far
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// A cast source reading `name`
    pub fn source(&self, name: &str) -> QueueSource {
        let rx = self.sender(name).subscribe();
        QueueSource {
            name: name.to_string(),
            rx,
            settings: self.settings.clone(),
            last_seq: 0,
            opened: Instant::now(),
            delivered: 0,
        }
    }
}

/// Reads the latest frame of a queue
#[derive(Debug)]
pub struct QueueSource {
    name: String,
    rx: watch::Receiver<Option<Queued>>,
    settings: QueueSettings,
    last_seq: u64,
    opened: Instant,
    delivered: u64,
}

impl QueueSource {
    fn default_frame(&self) -> Frame {
        match &self.settings.default_image {
            Some(image) => (**image).clone(),
            None => Frame::solid(1, 1, [0, 0, 0]),
        }
    }
}

impl FrameSource for QueueSource {
    fn info(&self) -> SourceInfo {
        SourceInfo::new(format!("queue:{}", self.name), &self.name, SourceKind::Queue)
    }

    fn next_frame(&mut self) -> crate::error::Result<SourceFrame> {
        let current = self.rx.borrow_and_update().clone();

        let last_received = match current {
            Some(queued) if queued.seq != self.last_seq => {
                self.last_seq = queued.seq;
                self.delivered += 1;
                let mut frame = (*queued.frame).clone();
                frame.pts = self.delivered;
                return Ok(SourceFrame::Frame(frame));
            }
            Some(queued) => queued.received,
            None => self.opened,
        };

        if last_received.elapsed() >= self.settings.stale_after {
            debug!("Queue {} is quiet, showing default image", self.name);
            self.delivered += 1;
            let mut frame = self.default_frame();
            frame.pts = self.delivered;
            return Ok(SourceFrame::Frame(frame));
        }

        Ok(SourceFrame::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_frame_only_once() {
        let queues = FrameQueues::new();
        let mut source = queues.source("phone");
        assert!(matches!(source.next_frame().unwrap(), SourceFrame::Pending));

        queues.push("phone", Frame::solid(2, 2, [1, 2, 3]));
        queues.push("phone", Frame::solid(2, 2, [4, 5, 6]));

        match source.next_frame().unwrap() {
            SourceFrame::Frame(frame) => assert_eq!(&frame.as_bytes()[..3], &[4, 5, 6]),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(source.next_frame().unwrap(), SourceFrame::Pending));
    }

    #[test]
    fn test_default_image_when_stale() {
        let queues = FrameQueues::with_settings(QueueSettings {
            default_image: Some(Arc::new(Frame::solid(1, 1, [9, 9, 9]))),
            stale_after: Duration::ZERO,
        });
        let mut source = queues.source("idle");
        match source.next_frame().unwrap() {
            SourceFrame::Frame(frame) => assert_eq!(frame.as_bytes(), &[9, 9, 9]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_names_and_latest() {
        let queues = FrameQueues::new();
        queues.push("b", Frame::solid(1, 1, [0, 0, 0]));
        queues.push("a", Frame::solid(1, 1, [7, 7, 7]));
        assert_eq!(queues.names(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(queues.latest("a").unwrap().as_bytes(), &[7, 7, 7]);
        assert!(queues.latest("missing").is_none());
    }
}
