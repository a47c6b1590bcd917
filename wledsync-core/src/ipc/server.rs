//! IPC server for a running cast
//!
//! Listens on a Unix socket and forwards commands from CLI clients to the
//! cast through its action channel.

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::protocol::{CastStatus, IpcMessage, IpcResponse};
use super::socket_path;
use crate::action::{ActionReply, ActionRequest, ActionSender, CastAction};
use crate::error::{Result, WledSyncError};

/// How long `accept_one` waits before giving the caller a chance to stop
const ACCEPT_TIMEOUT: Duration = Duration::from_millis(100);

/// IPC server that handles client connections
pub struct IpcServer {
    socket_path: PathBuf,
    listener: Option<UnixListener>,
    /// Channel into the cast loop
    actions: ActionSender,
    shutdown_tx: broadcast::Sender<()>,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl IpcServer {
    pub fn new(actions: ActionSender) -> Self {
        Self::with_path(actions, socket_path())
    }

    /// Server bound to a custom socket path
    pub fn with_path(actions: ActionSender, path: impl Into<PathBuf>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            socket_path: path.into(),
            listener: None,
            actions,
            shutdown_tx,
            start_time: Instant::now(),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.socket_path
    }

    /// Start listening for connections
    pub async fn start(&mut self) -> Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)
                .map_err(|e| WledSyncError::ipc(format!("Failed to remove old socket: {}", e)))?;
        }

        if let Some(parent) = self.socket_path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    WledSyncError::ipc(format!("Failed to create socket directory: {}", e))
                })?;
            }
        }

        let listener = UnixListener::bind(&self.socket_path).map_err(|e| {
            WledSyncError::ipc(format!(
                "Failed to bind socket at {:?}: {}",
                self.socket_path, e
            ))
        })?;

        // Owner-only
        let permissions = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&self.socket_path, permissions).map_err(|e| {
            WledSyncError::ipc(format!("Failed to set socket permissions: {}", e))
        })?;

        info!("IPC server listening on {:?}", self.socket_path);
        self.listener = Some(listener);

        Ok(())
    }

    /// Get a receiver for forced shutdown signals
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Accept and handle one connection
    ///
    /// Returns true if the server should continue, false if it should shut down
    pub async fn accept_one(&self) -> Result<bool> {
        let listener = self
            .listener
            .as_ref()
            .ok_or_else(|| WledSyncError::ipc("Server not started"))?;

        let (stream, _addr) = match tokio::time::timeout(ACCEPT_TIMEOUT, listener.accept()).await
        {
            Ok(Ok(accepted)) => accepted,
            Ok(Err(e)) => {
                error!("Failed to accept connection: {}", e);
                return Ok(true);
            }
            Err(_) => return Ok(true),
        };

        debug!("IPC client connected");
        Ok(self.handle_connection(stream).await)
    }

    /// Serve connections until a client asks to stop
    pub async fn run(&self) -> Result<()> {
        while self.accept_one().await? {}
        Ok(())
    }

    async fn handle_connection(&self, stream: UnixStream) -> bool {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    debug!("IPC client disconnected");
                    return true;
                }
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    match IpcMessage::from_bytes(trimmed.as_bytes()) {
                        Ok(msg) => {
                            let (response, should_stop) = self.handle_message(msg).await;

                            if let Err(e) = writer.write_all(&response.to_bytes()).await {
                                error!("Failed to send IPC response: {}", e);
                                return true;
                            }

                            if should_stop {
                                let _ = self.shutdown_tx.send(());
                                return false;
                            }
                        }
                        Err(e) => {
                            warn!("Invalid IPC message: {}", e);
                            let response = IpcResponse::error(format!("Invalid message: {}", e));
                            let _ = writer.write_all(&response.to_bytes()).await;
                        }
                    }
                }
                Err(e) => {
                    error!("Error reading from IPC client: {}", e);
                    return true;
                }
            }
        }
    }

    /// Returns (response, should_stop)
    ///
    /// A graceful stop goes through the cast loop, only a forced stop shuts
    /// the server down.
    async fn handle_message(&self, msg: IpcMessage) -> (IpcResponse, bool) {
        match msg {
            IpcMessage::Ping => (IpcResponse::Pong, false),
            IpcMessage::Status => (IpcResponse::Status(self.status().await), false),
            IpcMessage::Stats => match self.actions.stats().await {
                Ok(stats) => (IpcResponse::Stats(Box::new(stats)), false),
                Err(e) => (IpcResponse::error(e.to_string()), false),
            },
            IpcMessage::Stop => {
                info!("Received stop command via IPC");
                if let Err(e) = self.actions.send(CastAction::Stop).await {
                    debug!("Cast already gone: {}", e);
                }
                (IpcResponse::Stopping, false)
            }
            IpcMessage::ForceStop => {
                info!("Received force stop command via IPC");
                (IpcResponse::Stopping, true)
            }
            IpcMessage::Action { action, params } => {
                match CastAction::parse(&action, &params) {
                    Ok(action) => self.run_action(action).await,
                    Err(e) => (IpcResponse::error(e.to_string()), false),
                }
            }
            IpcMessage::Request { request } => match ActionRequest::from_json(&request) {
                Ok(request) => {
                    debug!("IPC request '{}'", request.kind);
                    self.run_action(request.action).await
                }
                Err(e) => (IpcResponse::error(e.to_string()), false),
            },
            IpcMessage::Snapshots => match self.actions.snapshot_count().await {
                Ok(count) => (IpcResponse::Snapshots { count }, false),
                Err(e) => (IpcResponse::error(e.to_string()), false),
            },
            IpcMessage::SaveSnapshot { index, path } => {
                match self.actions.save_snapshot(index, path).await {
                    Ok(()) => (IpcResponse::Ok, false),
                    Err(e) => (IpcResponse::error(e.to_string()), false),
                }
            }
        }
    }

    async fn run_action(&self, action: CastAction) -> (IpcResponse, bool) {
        let stop = action == CastAction::Stop;
        match self.actions.request(action).await {
            Ok(ActionReply::Info(info)) => (IpcResponse::Info(info), false),
            Ok(ActionReply::Ignored(reason)) => (IpcResponse::error(reason), false),
            Ok(_) if stop => (IpcResponse::Stopping, false),
            Ok(_) => (IpcResponse::Ok, false),
            Err(e) => (IpcResponse::error(e.to_string()), false),
        }
    }

    async fn status(&self) -> CastStatus {
        let uptime_seconds = self.start_time.elapsed().as_secs_f64();
        match self.actions.stats().await {
            Ok(stats) => CastStatus {
                running: stats.state.is_active(),
                state: stats.state.to_string(),
                name: Some(stats.name),
                source: Some(stats.source),
                protocol: Some(stats.protocol.to_string()),
                resolution: Some(stats.resolution),
                fps: Some(stats.fps),
                pid: std::process::id(),
                uptime_seconds,
            },
            Err(_) => CastStatus {
                running: false,
                state: "Stopped".to_string(),
                name: None,
                source: None,
                protocol: None,
                resolution: None,
                fps: None,
                pid: std::process::id(),
                uptime_seconds,
            },
        }
    }

    /// Clean up the socket file
    pub fn cleanup(&self) {
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!("Failed to remove socket file: {}", e);
            } else {
                debug!("Removed socket file {:?}", self.socket_path);
            }
        }
    }
}

impl Drop for IpcServer {
    fn drop(&mut self) {
        self.cleanup();
    }
}
