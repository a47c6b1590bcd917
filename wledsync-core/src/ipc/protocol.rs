//! IPC protocol definitions
//!
//! Newline-delimited JSON messages between a running cast and CLI commands.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::action::CastInfo;
use crate::pipeline::PipelineStats;

/// Messages that can be sent to a running cast
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcMessage {
    /// Check if the cast process is alive
    Ping,
    /// Request current status
    Status,
    /// Request cast statistics
    Stats,
    /// Stop the cast gracefully
    Stop,
    /// Exit without waiting for the devices
    ForceStop,
    /// Run a named action, see `CastAction::parse`
    Action { action: String, params: String },
    /// Run a JSON action request
    Request { request: serde_json::Value },
    /// Number of stored snapshots
    Snapshots,
    /// Write a snapshot to an image file
    SaveSnapshot { index: usize, path: PathBuf },
}

/// Responses from the cast process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IpcResponse {
    /// Simple acknowledgment
    Ok,
    /// Pong response to ping
    Pong,
    Error { message: String },
    Status(CastStatus),
    Stats(Box<PipelineStats>),
    /// Shutdown acknowledgment
    Stopping,
    /// Answer to the `info` action
    Info(Box<CastInfo>),
    Snapshots { count: usize },
}

/// Current cast status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastStatus {
    pub running: bool,
    /// Current state name
    pub state: String,
    pub name: Option<String>,
    pub source: Option<String>,
    pub protocol: Option<String>,
    /// Processed frame size
    pub resolution: Option<(u32, u32)>,
    /// Target FPS
    pub fps: Option<u32>,
    pub pid: u32,
    /// Uptime in seconds
    pub uptime_seconds: f64,
}

impl IpcMessage {
    /// Serialize message to JSON bytes with newline terminator
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = serde_json::to_vec(self).unwrap_or_default();
        bytes.push(b'\n');
        bytes
    }

    /// Deserialize message from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl IpcResponse {
    /// Serialize response to JSON bytes with newline terminator
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = serde_json::to_vec(self).unwrap_or_default();
        bytes.push(b'\n');
        bytes
    }

    /// Deserialize response from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Create an error response
    pub fn error(message: impl Into<String>) -> Self {
        IpcResponse::Error {
            message: message.into(),
        }
    }
}
