//! WLED JSON API client
//!
//! Only the calls a cast needs: reading `/json/info` for the matrix layout
//! and switching live mode through `/json/state`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::error::{Result, WledSyncError};

/// Default HTTP port of WLED
pub const HTTP_PORT: u16 = 80;

/// Default timeout for WLED requests
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Subset of `/json/info`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WledInfo {
    pub name: String,
    #[serde(rename = "ver")]
    pub version: String,
    pub leds: WledLeds,
    #[serde(rename = "udpport")]
    pub udp_port: u16,
    pub mac: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WledLeds {
    pub count: u32,
    /// Present only on 2D builds
    pub matrix: Option<WledMatrix>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WledMatrix {
    pub w: u32,
    pub h: u32,
}

impl WledInfo {
    /// Matrix size, `None` for strips
    pub fn matrix_dimensions(&self) -> Option<(u32, u32)> {
        match self.leds.matrix {
            Some(WledMatrix { w, h }) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        }
    }
}

impl std::fmt::Display for WledInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (WLED {}) {} LEDs", self.name, self.version, self.leds.count)?;
        if let Some(m) = self.leds.matrix {
            write!(f, ", matrix {}x{}", m.w, m.h)?;
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct LiveState {
    on: bool,
    live: bool,
}

/// HTTP client bound to one WLED device
#[derive(Debug, Clone)]
pub struct WledClient {
    http: reqwest::Client,
    host: String,
    port: u16,
}

impl WledClient {
    /// Client for `host` on the default port
    pub fn new(host: impl Into<String>) -> Result<Self> {
        Self::with_port(host, HTTP_PORT)
    }

    pub fn with_port(host: impl Into<String>, port: u16) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| WledSyncError::wled(format!("Cannot build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            host: host.into(),
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}:{}{}", self.host, self.port, path)
    }

    fn http_error(&self, path: &str, e: reqwest::Error) -> WledSyncError {
        if e.is_timeout() {
            WledSyncError::wled(format!("{}: request {} timed out", self.host, path))
        } else if let Some(status) = e.status() {
            WledSyncError::wled(format!("{}: {} returned HTTP {}", self.host, path, status))
        } else {
            WledSyncError::wled(format!("{}: {}: {}", self.host, path, e))
        }
    }

    /// Read `/json/info`
    pub async fn info(&self) -> Result<WledInfo> {
        let path = "/json/info";
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| self.http_error(path, e))?;
        debug!("WLED GET {}{} -> {}", self.host, path, response.status());

        let body = response.bytes().await.map_err(|e| self.http_error(path, e))?;
        serde_json::from_slice(&body)
            .map_err(|e| WledSyncError::wled(format!("{}: invalid /json/info: {}", self.host, e)))
    }

    /// Matrix size, `None` when the device drives a strip
    pub async fn matrix_dimensions(&self) -> Result<Option<(u32, u32)>> {
        let dims = self.info().await?.matrix_dimensions();
        match dims {
            Some((w, h)) => debug!("WLED {} matrix {}x{}", self.host, w, h),
            None => debug!("WLED {} has no matrix", self.host),
        }
        Ok(dims)
    }

    /// Set the `on` and `live` state
    ///
    /// Live mode keeps WLED from running its own effects over the cast.
    pub async fn set_live_mode(&self, on: bool, live: bool) -> Result<()> {
        let path = "/json/state";
        self.http
            .post(self.url(path))
            .json(&LiveState { on, live })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| self.http_error(path, e))?;
        debug!("WLED {} on={} live={}", self.host, on, live);
        Ok(())
    }

    /// Whether the HTTP port accepts connections
    pub async fn is_alive(&self) -> bool {
        check_ip_alive(&self.host, self.port, REQUEST_TIMEOUT).await
    }
}

/// TCP connect check
pub async fn check_ip_alive(host: &str, port: u16, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_)) => true,
        Ok(Err(e)) => {
            warn!("{}:{} not reachable: {}", host, port, e);
            false
        }
        Err(_) => {
            warn!("{}:{} did not answer within {:?}", host, port, timeout);
            false
        }
    }
}
