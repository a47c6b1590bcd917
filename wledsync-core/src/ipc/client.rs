//! IPC client for CLI commands
//!
//! Connects to the running cast to send commands and receive responses.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tracing::debug;

use super::protocol::{CastStatus, IpcMessage, IpcResponse};
use super::socket_path;
use crate::action::CastInfo;
use crate::error::{Result, WledSyncError};
use crate::pipeline::PipelineStats;

/// Default connection timeout
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default read/write timeout
const IO_TIMEOUT: Duration = Duration::from_secs(10);

/// IPC client for communicating with a cast
pub struct IpcClient {
    stream: UnixStream,
}

impl IpcClient {
    /// Connect to the cast with default timeout
    pub async fn connect() -> Result<Self> {
        Self::connect_to(&socket_path(), CONNECT_TIMEOUT).await
    }

    /// Connect to a socket with custom timeout
    pub async fn connect_to(path: &Path, timeout: Duration) -> Result<Self> {
        if !path.exists() {
            return Err(WledSyncError::NoActiveCast);
        }

        let stream = tokio::time::timeout(timeout, UnixStream::connect(path))
            .await
            .map_err(|_| WledSyncError::ipc("Connection timed out"))?
            .map_err(|e| WledSyncError::ipc(format!("Failed to connect to cast: {}", e)))?;

        debug!("Connected to cast at {:?}", path);

        Ok(Self { stream })
    }

    async fn send(&mut self, msg: IpcMessage) -> Result<IpcResponse> {
        let (reader, mut writer) = self.stream.split();

        tokio::time::timeout(IO_TIMEOUT, writer.write_all(&msg.to_bytes()))
            .await
            .map_err(|_| WledSyncError::ipc("Write timed out"))?
            .map_err(|e| WledSyncError::ipc(format!("Failed to send message: {}", e)))?;

        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        tokio::time::timeout(IO_TIMEOUT, reader.read_line(&mut line))
            .await
            .map_err(|_| WledSyncError::ipc("Read timed out"))?
            .map_err(|e| WledSyncError::ipc(format!("Failed to read response: {}", e)))?;

        match IpcResponse::from_bytes(line.trim().as_bytes()) {
            Ok(IpcResponse::Error { message }) => Err(WledSyncError::ipc(message)),
            Ok(response) => Ok(response),
            Err(e) => Err(WledSyncError::ipc(format!("Invalid response: {}", e))),
        }
    }

    fn unexpected(response: IpcResponse) -> WledSyncError {
        WledSyncError::ipc(format!("Unexpected response: {:?}", response))
    }

    /// Ping the cast to check if it's alive
    pub async fn ping(&mut self) -> Result<bool> {
        Ok(matches!(self.send(IpcMessage::Ping).await, Ok(IpcResponse::Pong)))
    }

    pub async fn status(&mut self) -> Result<CastStatus> {
        match self.send(IpcMessage::Status).await? {
            IpcResponse::Status(status) => Ok(status),
            other => Err(Self::unexpected(other)),
        }
    }

    pub async fn stats(&mut self) -> Result<PipelineStats> {
        match self.send(IpcMessage::Stats).await? {
            IpcResponse::Stats(stats) => Ok(*stats),
            other => Err(Self::unexpected(other)),
        }
    }

    /// Request the cast to stop
    pub async fn stop(&mut self) -> Result<()> {
        match self.send(IpcMessage::Stop).await? {
            IpcResponse::Stopping => Ok(()),
            other => Err(Self::unexpected(other)),
        }
    }

    /// Request the process to exit at once
    pub async fn force_stop(&mut self) -> Result<()> {
        match self.send(IpcMessage::ForceStop).await? {
            IpcResponse::Stopping => Ok(()),
            other => Err(Self::unexpected(other)),
        }
    }

    /// Run a named action
    ///
    /// Returns the cast info for `info`, `None` for every other action.
    pub async fn action(&mut self, action: &str, params: &str) -> Result<Option<CastInfo>> {
        let msg = IpcMessage::Action {
            action: action.to_string(),
            params: params.to_string(),
        };
        Self::action_reply(self.send(msg).await?)
    }

    /// Run a JSON action request
    pub async fn request(&mut self, request: serde_json::Value) -> Result<Option<CastInfo>> {
        Self::action_reply(self.send(IpcMessage::Request { request }).await?)
    }

    fn action_reply(response: IpcResponse) -> Result<Option<CastInfo>> {
        match response {
            IpcResponse::Info(info) => Ok(Some(*info)),
            IpcResponse::Ok | IpcResponse::Stopping => Ok(None),
            other => Err(Self::unexpected(other)),
        }
    }

    pub async fn snapshots(&mut self) -> Result<usize> {
        match self.send(IpcMessage::Snapshots).await? {
            IpcResponse::Snapshots { count } => Ok(count),
            other => Err(Self::unexpected(other)),
        }
    }

    /// Ask the cast to write snapshot `index` to `path`
    pub async fn save_snapshot(&mut self, index: usize, path: PathBuf) -> Result<()> {
        match self.send(IpcMessage::SaveSnapshot { index, path }).await? {
            IpcResponse::Ok => Ok(()),
            other => Err(Self::unexpected(other)),
        }
    }
}
