//! Mobile camera streaming server
//!
//! A phone browser captures its camera and sends each frame over a
//! WebSocket, either as a `data:image/...;base64,` URL in a text message or
//! as raw encoded bytes in a binary one. Frames are decoded and pushed into
//! a [`FrameQueues`] queue that a `queue:<name>` cast reads.
//!
//! ## Routes
//!
//! - `GET /mobile` - WebSocket upgrade, optional `?queue=<name>`
//! - `GET /health` - liveness and queue names as JSON

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use base64::Engine;
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::capture::{FrameQueues, QueueSettings};
use crate::config::MobileSection;
use crate::error::{Result, WledSyncError};
use crate::types::Frame;

/// Decode a `data:image/<fmt>;base64,<payload>` URL
pub fn decode_data_url(url: &str) -> Result<Frame> {
    let (header, payload) = url
        .split_once(',')
        .ok_or_else(|| WledSyncError::capture("Data URL without payload"))?;
    if !header.starts_with("data:image/") || !header.ends_with(";base64") {
        return Err(WledSyncError::capture(format!(
            "Unsupported data URL header: {}",
            header
        )));
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| WledSyncError::capture(format!("Invalid base64 payload: {}", e)))?;
    decode_image(&bytes)
}

/// Decode an encoded image (JPEG, PNG, WebP...)
pub fn decode_image(bytes: &[u8]) -> Result<Frame> {
    let image = image::load_from_memory(bytes)?;
    Ok(Frame::new(image.to_rgb8(), 0))
}

/// Queue behaviour from the `[mobile]` section, loading the default image
pub fn queue_settings(settings: &MobileSection) -> Result<QueueSettings> {
    let default_image = match &settings.default_image {
        Some(path) => {
            let image = image::open(path).map_err(|e| {
                WledSyncError::config(format!("Default image {}: {}", path.display(), e))
            })?;
            Some(Arc::new(Frame::new(image.to_rgb8(), 0)))
        }
        None => None,
    };

    Ok(QueueSettings {
        default_image,
        stale_after: Duration::from_secs_f64(settings.stale_secs.max(0.0)),
    })
}

struct MobileState {
    queues: FrameQueues,
    default_queue: String,
    received: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct StreamParams {
    queue: Option<String>,
}

/// Router serving the mobile endpoints
pub fn router(queues: FrameQueues, default_queue: impl Into<String>) -> Router {
    let state = Arc::new(MobileState {
        queues,
        default_queue: default_queue.into(),
        received: AtomicU64::new(0),
    });

    Router::new()
        .route("/mobile", get(mobile_stream))
        .route("/health", get(health))
        .with_state(state)
}

/// Bound mobile server, ready to serve
pub struct MobileServer {
    listener: TcpListener,
    router: Router,
}

impl MobileServer {
    /// Bind to `[mobile] host:port`
    pub async fn bind(settings: &MobileSection, queues: FrameQueues) -> Result<Self> {
        let addr = format!("{}:{}", settings.host, settings.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| WledSyncError::config(format!("Failed to bind mobile server on {}: {}", addr, e)))?;

        Ok(Self {
            listener,
            router: router(queues, settings.queue.clone()),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until `shutdown` resolves
    pub async fn serve<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        info!("Mobile server listening on ws://{}/mobile", addr);

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| WledSyncError::capture(format!("Mobile server error: {}", e)))?;

        info!("Mobile server stopped");
        Ok(())
    }
}

async fn health(State(state): State<Arc<MobileState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "queues": state.queues.names(),
        "frames": state.received.load(Ordering::Relaxed),
    }))
}

async fn mobile_stream(
    ws: WebSocketUpgrade,
    Query(params): Query<StreamParams>,
    State(state): State<Arc<MobileState>>,
) -> impl IntoResponse {
    let queue = params
        .queue
        .filter(|q| !q.is_empty())
        .unwrap_or_else(|| state.default_queue.clone());
    ws.on_upgrade(move |socket| handle_socket(socket, state, queue))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<MobileState>, queue: String) {
    info!("Mobile client connected, queue '{}'", queue);

    while let Some(message) = socket.recv().await {
        let decoded = match message {
            Ok(Message::Text(text)) => decode_data_url(&text),
            Ok(Message::Binary(bytes)) => decode_image(&bytes),
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("Mobile socket error: {}", e);
                break;
            }
        };

        match decoded {
            Ok(frame) => {
                state.queues.push(&queue, frame);
                state.received.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => warn!("Ignoring mobile frame: {}", e),
        }
    }

    info!("Mobile client disconnected from queue '{}'", queue);
}
