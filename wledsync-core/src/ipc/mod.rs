//! Control socket for a running cast
//!
//! Provides Unix socket-based communication between a running
//! `wledvideosync cast` and CLI commands like `stop`, `status` and `action`.

mod client;
mod protocol;
mod server;

pub use client::IpcClient;
pub use protocol::{CastStatus, IpcMessage, IpcResponse};
pub use server::IpcServer;

use std::path::PathBuf;

/// Get the IPC socket path
///
/// Uses XDG_RUNTIME_DIR if available, otherwise /tmp
pub fn socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir).join("wledvideosync.sock")
    } else {
        // SAFETY: getuid has no preconditions and cannot fail.
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/tmp/wledvideosync-{}.sock", uid))
    }
}

/// Check whether a cast answers on the socket
pub async fn cast_running() -> bool {
    if !socket_path().exists() {
        return false;
    }

    match IpcClient::connect().await {
        Ok(mut client) => matches!(client.ping().await, Ok(true)),
        Err(_) => false,
    }
}
