//! Error types for WLEDVideoSync

use thiserror::Error;

/// Result type alias using WledSyncError
pub type Result<T> = std::result::Result<T, WledSyncError>;

/// Main error type for casting operations
#[derive(Debug, Error)]
pub enum WledSyncError {
    /// Frame capture error
    #[error("Capture error: {0}")]
    Capture(String),

    /// Image processing error
    #[error("Processing error: {0}")]
    Process(String),

    /// Packet encoding error
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Network device error
    #[error("Device error: {0}")]
    Device(String),

    /// WLED HTTP API error
    #[error("WLED error: {0}")]
    Wled(String),

    /// Control socket error
    #[error("IPC error: {0}")]
    Ipc(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid cast action
    #[error("Invalid action: {0}")]
    Action(String),

    /// Source not found
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    /// Cast not active
    #[error("No active cast")]
    NoActiveCast,

    /// Cast already running
    #[error("Cast already running")]
    CastAlreadyRunning,

    /// Unsupported operation
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<WledSyncError>,
    },
}

impl WledSyncError {
    /// Create a capture error
    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture(msg.into())
    }

    /// Create a processing error
    pub fn process(msg: impl Into<String>) -> Self {
        Self::Process(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a device error
    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }

    /// Create a WLED API error
    pub fn wled(msg: impl Into<String>) -> Self {
        Self::Wled(msg.into())
    }

    /// Create an IPC error
    pub fn ipc(msg: impl Into<String>) -> Self {
        Self::Ipc(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an action error
    pub fn action(msg: impl Into<String>) -> Self {
        Self::Action(msg.into())
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping context wrappers
    pub fn root(&self) -> &WledSyncError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// A short remediation hint for errors a user can fix
    pub fn user_hint(&self) -> Option<&'static str> {
        match self.root() {
            Self::Device(_) => {
                Some("Check that the device is powered on and reachable on the network")
            }
            Self::Wled(_) => Some("Check the WLED host address and that its HTTP API is enabled"),
            Self::Config(_) => {
                Some("Check your config.toml or command line flags (wledvideosync config show)")
            }
            Self::SourceNotFound(_) => {
                Some("Run 'wledvideosync list-sources' to see available sources")
            }
            Self::CastAlreadyRunning => Some("Stop the running cast with 'wledvideosync stop'"),
            Self::NoActiveCast => Some("Start a cast with 'wledvideosync cast'"),
            Self::Ipc(_) => Some("Is a cast running? Start one with 'wledvideosync cast'"),
            Self::Unsupported(_) => {
                Some("This source may require a build with the desktop, webcam or video feature")
            }
            _ => None,
        }
    }

    /// Whether the user can recover without code changes
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self.root(),
            Self::Device(_)
                | Self::Wled(_)
                | Self::Config(_)
                | Self::Action(_)
                | Self::SourceNotFound(_)
                | Self::NoActiveCast
                | Self::CastAlreadyRunning
        )
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

// Conversions from external error types

impl From<image::ImageError> for WledSyncError {
    fn from(err: image::ImageError) -> Self {
        Self::Process(err.to_string())
    }
}

impl From<serde_json::Error> for WledSyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Ipc(format!("JSON error: {}", err))
    }
}

impl From<toml::de::Error> for WledSyncError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("Failed to parse config: {}", err))
    }
}

impl From<toml::ser::Error> for WledSyncError {
    fn from(err: toml::ser::Error) -> Self {
        Self::Config(format!("Failed to serialize config: {}", err))
    }
}

#[cfg(feature = "video")]
impl From<ffmpeg_next::Error> for WledSyncError {
    fn from(err: ffmpeg_next::Error) -> Self {
        Self::Capture(err.to_string())
    }
}
