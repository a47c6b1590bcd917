//! WLEDVideoSync Core Library
//!
//! Casts desktop, media and mobile video to LED matrices.
//!
//! This library provides:
//! - Frame sources: image, GIF and video files, screens, cameras and a mobile WebSocket feed
//! - Per-frame processing: scaling, gamma, auto brightness and color filters
//! - Virtual device matrices split across several controllers
//! - DDP, e1.31 (sACN) and Art-Net output over UDP
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐    ┌──────────────┐    ┌──────────────┐    ┌─────────────────┐
//! │ FrameSource  │───▶│ Processor    │───▶│ Matrix split │───▶│ Device workers  │
//! │ (blocking)   │    │ (effects)    │    │ (multicast)  │    │ (DDP/sACN/ArtN) │
//! └──────────────┘    └──────────────┘    └──────────────┘    └─────────────────┘
//! ```
//!
//! A [`Pipeline`] owns one cast. Other tasks reach it through an
//! [`ActionSender`]: the control socket in [`ipc`] and the [`scheduler`].

pub mod action;
pub mod capture;
pub mod config;
pub mod error;
pub mod ipc;
pub mod matrix;
pub mod mobile;
pub mod output;
pub mod performance;
pub mod pipeline;
pub mod process;
pub mod protocol;
pub mod scheduler;
pub mod types;

pub use action::{ActionReply, ActionRequest, ActionSender, CastAction, CastInfo};
pub use config::{CastConfig, ColorConfig, ConfigFile, MulticastConfig, Protocol};
pub use error::{Result, ResultExt, WledSyncError};
pub use pipeline::{Pipeline, PipelineState, PipelineStats};
pub use scheduler::Scheduler;
pub use types::{CastSource, Frame, Handle, SourceInfo, SourceKind};
