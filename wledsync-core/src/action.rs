//! Cast actions
//!
//! Actions act on a running cast between two frames: stop it, take a
//! snapshot, report its state or drive the multicast route effects. They
//! arrive as `(name, params)` pairs from the control socket and the
//! scheduler, or as JSON requests of the form
//! `{"action":{"type":"...","param":{...}}}`.

use std::io::Cursor;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use base64::Engine;
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::error::{Result, WledSyncError};
use crate::output::SwapEffect;
use crate::pipeline::PipelineStats;
use crate::types::Frame;

/// Pending requests a cast keeps before senders wait
pub const ACTION_QUEUE_CAPACITY: usize = 64;

/// Upper bound of the `fps_number` parameter of `cast_image`
pub const CAST_IMAGE_MAX_FPS: u32 = 60;

/// Upper bound of the `retry_number` parameter of `cast_image`
pub const CAST_IMAGE_MAX_RETRY: u32 = 10;

/// Action names accepted by [`CastAction::parse`]
pub const ACTION_NAMES: &[&str] = &[
    "stop",
    "shot",
    "info",
    "reset",
    "host",
    "multicast",
    "open-preview",
    "close-preview",
];

/// Route effect command for multicast casts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MulticastCommand {
    /// Stop the running effect and restore the routing
    Stop,
    /// Start an effect, one tick per `delay`
    Start { effect: SwapEffect, delay: Duration },
}

impl std::str::FromStr for MulticastCommand {
    type Err = WledSyncError;

    /// `stop`, `<effect>,<delay_ms>` or `<section effect>,<delay_ms>,<size>[,<by>]`
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        let name = parts[0].to_lowercase();
        if name == "stop" {
            return Ok(Self::Stop);
        }

        let number = |index: usize, what: &str| -> Result<u64> {
            let raw = parts.get(index).ok_or_else(|| {
                WledSyncError::action(format!("multicast {} needs a {}", name, what))
            })?;
            raw.parse().map_err(|_| {
                WledSyncError::action(format!("multicast {}: invalid {} '{}'", name, what, raw))
            })
        };

        let delay = Duration::from_millis(number(1, "delay")?);
        let effect = match name.as_str() {
            "circular" => SwapEffect::Circular,
            "reverse" => SwapEffect::Reverse,
            "random" => SwapEffect::Random,
            "pause" => SwapEffect::RandomReplace,
            "shuffle_sections" => SwapEffect::ShuffleSections {
                size: number(2, "section size")? as usize,
            },
            "reverse_sections" => SwapEffect::ReverseSections {
                size: number(2, "section size")? as usize,
            },
            "rotate_sections" => SwapEffect::RotateSections {
                size: number(2, "section size")? as usize,
                by: number(3, "rotation")? as usize,
            },
            other => {
                return Err(WledSyncError::action(format!(
                    "Unknown multicast effect '{}'",
                    other
                )))
            }
        };

        Ok(Self::Start { effect, delay })
    }
}

/// Action applied to a running cast
#[derive(Debug, Clone, PartialEq)]
pub enum CastAction {
    /// Stop casting
    Stop,
    /// Store a pixel-art snapshot of the next frame
    Shot,
    /// Report the cast state, with the next frame when `with_image`
    Info { with_image: bool },
    /// Reset the totals shared by all casts
    Reset,
    /// Point the single device at another host
    Host(Ipv4Addr),
    Multicast(MulticastCommand),
    OpenPreview,
    ClosePreview,
    /// Send one buffered image to a device for a while
    CastImage(CastImageParams),
}

impl CastAction {
    /// Parse an action name with its parameter string
    ///
    /// Anything after the first `_` of the name is ignored, so scheduled
    /// jobs can use `shot_1`, `shot_2`... as distinct names.
    pub fn parse(action: &str, params: &str) -> Result<Self> {
        let name = action
            .split('_')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        let params = params.trim();

        match name.as_str() {
            "stop" => Ok(Self::Stop),
            "shot" => Ok(Self::Shot),
            "info" => Ok(Self::Info {
                with_image: matches!(
                    params.to_lowercase().as_str(),
                    "image" | "true" | "1" | "yes"
                ),
            }),
            "reset" => Ok(Self::Reset),
            "host" => params
                .parse::<Ipv4Addr>()
                .map(Self::Host)
                .map_err(|_| WledSyncError::action(format!("Invalid host address '{}'", params))),
            "multicast" => params.parse().map(Self::Multicast),
            "open-preview" => Ok(Self::OpenPreview),
            "close-preview" => Ok(Self::ClosePreview),
            other => Err(WledSyncError::action(format!(
                "Unknown action '{}', expected one of: {}",
                other,
                ACTION_NAMES.join(", ")
            ))),
        }
    }

    /// Name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Stop => "stop",
            Self::Shot => "shot",
            Self::Info { .. } => "info",
            Self::Reset => "reset",
            Self::Host(_) => "host",
            Self::Multicast(_) => "multicast",
            Self::OpenPreview => "open-preview",
            Self::ClosePreview => "close-preview",
            Self::CastImage(_) => "cast_image",
        }
    }
}

/// Which buffer `cast_image` reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageBuffer {
    /// Frames kept by `put_to_buffer`
    #[default]
    Buffer,
    /// Snapshots taken by `shot`
    Multicast,
}

/// Parameters of the `cast_image` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastImageParams {
    pub image_number: usize,
    /// Index into the multicast devices, -1 for the cast host
    pub device_number: i64,
    /// Clamped to `0..=CAST_IMAGE_MAX_FPS`
    #[serde(
        default = "default_image_fps",
        alias = "fps",
        deserialize_with = "clamped_fps"
    )]
    pub fps_number: u32,
    /// How long to keep sending, in milliseconds
    #[serde(default = "default_image_duration", alias = "duration")]
    pub duration_number: u64,
    /// Clamped to `0..=CAST_IMAGE_MAX_RETRY`
    #[serde(default, alias = "retry", deserialize_with = "clamped_retry")]
    pub retry_number: u32,
    #[serde(default, alias = "buffer")]
    pub buffer_name: ImageBuffer,
}

fn default_image_fps() -> u32 {
    25
}

fn default_image_duration() -> u64 {
    1000
}

fn clamped<'de, D>(deserializer: D, max: u32) -> std::result::Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = i64::deserialize(deserializer)?;
    Ok(value.clamp(0, max as i64) as u32)
}

fn clamped_fps<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    clamped(deserializer, CAST_IMAGE_MAX_FPS)
}

fn clamped_retry<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    clamped(deserializer, CAST_IMAGE_MAX_RETRY)
}

/// Validated JSON action request
///
/// ```json
/// {"action":{"type":"cast_image","param":{"image_number":0,"device_number":-1}}}
/// {"action":{"type":"multicast","param":{"params":"circular,1000"}}}
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub kind: String,
    pub action: CastAction,
}

impl ActionRequest {
    /// Validate a request and turn it into an action
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let action = value
            .get("action")
            .and_then(serde_json::Value::as_object)
            .ok_or_else(|| WledSyncError::action("Request needs an \"action\" object"))?;
        let kind = action
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| WledSyncError::action("Request action needs a string \"type\""))?;
        let param = action
            .get("param")
            .and_then(serde_json::Value::as_object)
            .ok_or_else(|| WledSyncError::action("Request action needs a \"param\" object"))?;

        let parsed = if kind == "cast_image" {
            let params: CastImageParams =
                serde_json::from_value(serde_json::Value::Object(param.clone())).map_err(|e| {
                    WledSyncError::action(format!("Invalid cast_image parameters: {}", e))
                })?;
            CastAction::CastImage(params)
        } else {
            let base = kind.split('_').next().unwrap_or_default();
            if !ACTION_NAMES.contains(&base) {
                return Err(WledSyncError::action(format!(
                    "Unexpected action type '{}'",
                    kind
                )));
            }
            let params = param
                .get("params")
                .and_then(serde_json::Value::as_str)
                .unwrap_or_default();
            CastAction::parse(kind, params)?
        };

        Ok(Self {
            kind: kind.to_string(),
            action: parsed,
        })
    }
}

impl std::str::FromStr for ActionRequest {
    type Err = WledSyncError;

    fn from_str(input: &str) -> Result<Self> {
        Self::from_json(&serde_json::from_str(input)?)
    }
}

/// State of a cast as reported by the `info` action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastInfo {
    pub name: String,
    /// Start time, seconds since the Unix epoch
    pub start_time: u64,
    pub source: String,
    pub protocol: String,
    pub multicast: bool,
    pub devices: Vec<String>,
    pub scale: (u32, u32),
    pub fps: u32,
    pub frames: u64,
    /// Frames in the media, when known
    pub length: Option<usize>,
    /// Base64 PNG of the latest processed frame
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl std::fmt::Display for CastInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {} -> {} ({}x{} @ {} fps, {} frames)",
            self.name,
            self.source,
            self.protocol,
            self.devices.join(", "),
            self.scale.0,
            self.scale.1,
            self.fps,
            self.frames
        )
    }
}

/// Encode a frame as a base64 PNG
pub fn encode_png_base64(frame: &Frame) -> Result<String> {
    let mut png = Cursor::new(Vec::new());
    frame.image.write_to(&mut png, ImageFormat::Png)?;
    Ok(base64::engine::general_purpose::STANDARD.encode(png.into_inner()))
}

/// Answer of a cast to a request
#[derive(Debug, Clone)]
pub enum ActionReply {
    Done,
    Info(Box<CastInfo>),
    Stats(Box<PipelineStats>),
    Snapshots(usize),
    /// Accepted but not applicable to this cast
    Ignored(String),
}

/// What travels on the action channel
#[derive(Debug)]
pub(crate) enum CastRequest {
    Action(CastAction),
    Stats,
    Snapshots,
    SaveSnapshot { index: usize, path: PathBuf },
}

#[derive(Debug)]
pub(crate) struct Envelope {
    pub request: CastRequest,
    pub reply: Option<oneshot::Sender<Result<ActionReply>>>,
}

/// Cloneable handle sending requests to a cast
#[derive(Debug, Clone)]
pub struct ActionSender {
    tx: mpsc::Sender<Envelope>,
}

impl ActionSender {
    pub(crate) fn channel() -> (Self, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(ACTION_QUEUE_CAPACITY);
        (Self { tx }, rx)
    }

    /// Queue an action without waiting for it to run
    pub async fn send(&self, action: CastAction) -> Result<()> {
        self.tx
            .send(Envelope {
                request: CastRequest::Action(action),
                reply: None,
            })
            .await
            .map_err(|_| WledSyncError::NoActiveCast)
    }

    async fn call(&self, request: CastRequest) -> Result<ActionReply> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                request,
                reply: Some(reply),
            })
            .await
            .map_err(|_| WledSyncError::NoActiveCast)?;
        rx.await.map_err(|_| WledSyncError::NoActiveCast)?
    }

    /// Run an action and wait for its outcome
    pub async fn request(&self, action: CastAction) -> Result<ActionReply> {
        self.call(CastRequest::Action(action)).await
    }

    pub async fn stats(&self) -> Result<PipelineStats> {
        match self.call(CastRequest::Stats).await? {
            ActionReply::Stats(stats) => Ok(*stats),
            other => Err(WledSyncError::action(format!("Unexpected reply {:?}", other))),
        }
    }

    /// Number of stored snapshots
    pub async fn snapshot_count(&self) -> Result<usize> {
        match self.call(CastRequest::Snapshots).await? {
            ActionReply::Snapshots(count) => Ok(count),
            other => Err(WledSyncError::action(format!("Unexpected reply {:?}", other))),
        }
    }

    /// Write snapshot `index` to `path`, format from the extension
    pub async fn save_snapshot(&self, index: usize, path: impl Into<PathBuf>) -> Result<()> {
        self.call(CastRequest::SaveSnapshot {
            index,
            path: path.into(),
        })
        .await
        .map(|_| ())
    }

    /// Whether the cast dropped its end of the channel
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_names_and_suffix() {
        assert_eq!(CastAction::parse("stop", "").unwrap(), CastAction::Stop);
        assert_eq!(CastAction::parse("shot_2", "").unwrap(), CastAction::Shot);
        assert_eq!(
            CastAction::parse("info", "image").unwrap(),
            CastAction::Info { with_image: true }
        );
        assert_eq!(
            CastAction::parse("host", "192.168.1.20").unwrap(),
            CastAction::Host(Ipv4Addr::new(192, 168, 1, 20))
        );
        assert!(CastAction::parse("host", "nope").is_err());
        assert!(CastAction::parse("explode", "").is_err());
    }

    #[test]
    fn test_multicast_commands() {
        assert_eq!(
            "stop".parse::<MulticastCommand>().unwrap(),
            MulticastCommand::Stop
        );
        assert_eq!(
            "circular,500".parse::<MulticastCommand>().unwrap(),
            MulticastCommand::Start {
                effect: SwapEffect::Circular,
                delay: Duration::from_millis(500)
            }
        );
        assert_eq!(
            "rotate_sections,100,3,1".parse::<MulticastCommand>().unwrap(),
            MulticastCommand::Start {
                effect: SwapEffect::RotateSections { size: 3, by: 1 },
                delay: Duration::from_millis(100)
            }
        );
        assert!("reverse_sections,100".parse::<MulticastCommand>().is_err());
        assert!("spin,100".parse::<MulticastCommand>().is_err());
        assert!("circular,fast".parse::<MulticastCommand>().is_err());
    }

    #[test]
    fn test_request_clamps_cast_image() {
        let request = ActionRequest::from_json(&json!({
            "action": {"type": "cast_image", "param": {
                "image_number": 1, "device_number": -1,
                "fps_number": 500, "retry_number": 99
            }}
        }))
        .unwrap();

        match request.action {
            CastAction::CastImage(params) => {
                assert_eq!(params.fps_number, 60);
                assert_eq!(params.retry_number, 10);
                assert_eq!(params.duration_number, 1000);
                assert_eq!(params.buffer_name, ImageBuffer::Buffer);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_request_clamps_negative_counts() {
        let request = ActionRequest::from_json(&json!({
            "action": {"type": "cast_image", "param": {
                "image_number": 0, "device_number": 2,
                "fps_number": -5, "retry_number": -2, "buffer_name": "multicast"
            }}
        }))
        .unwrap();

        match request.action {
            CastAction::CastImage(params) => {
                assert_eq!((params.fps_number, params.retry_number), (0, 0));
                assert_eq!(params.device_number, 2);
                assert_eq!(params.buffer_name, ImageBuffer::Multicast);
            }
            other => panic!("unexpected {:?}", other),
        }

        // Short aliases go through the same bounds
        let request = ActionRequest::from_json(&json!({
            "action": {"type": "cast_image", "param": {
                "image_number": 0, "device_number": -1, "fps": 61, "retry": 3
            }}
        }))
        .unwrap();
        match request.action {
            CastAction::CastImage(params) => {
                assert_eq!((params.fps_number, params.retry_number), (60, 3));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_request_rejects_malformed() {
        assert!(ActionRequest::from_json(&json!({"type": "stop"})).is_err());
        assert!(ActionRequest::from_json(&json!({"action": {"type": 3, "param": {}}})).is_err());
        assert!(ActionRequest::from_json(&json!({"action": {"type": "stop"}})).is_err());
        assert!(
            ActionRequest::from_json(&json!({"action": {"type": "format_disk", "param": {}}}))
                .is_err()
        );
        assert!(ActionRequest::from_json(&json!({
            "action": {"type": "cast_image", "param": {"image_number": 0}}
        }))
        .is_err());
    }

    #[test]
    fn test_request_named_action() {
        let request: ActionRequest =
            r#"{"action":{"type":"multicast","param":{"params":"random,250"}}}"#
                .parse()
                .unwrap();
        assert_eq!(request.kind, "multicast");
        assert!(matches!(
            request.action,
            CastAction::Multicast(MulticastCommand::Start {
                effect: SwapEffect::Random,
                ..
            })
        ));
    }

    #[test]
    fn test_png_base64() {
        let encoded = encode_png_base64(&Frame::solid(2, 2, [255, 0, 0])).unwrap();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
    }

    #[tokio::test]
    async fn test_sender_without_cast() {
        let (sender, rx) = ActionSender::channel();
        drop(rx);
        assert!(sender.is_closed());
        assert!(matches!(
            sender.send(CastAction::Stop).await,
            Err(WledSyncError::NoActiveCast)
        ));
    }
}
