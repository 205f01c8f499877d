//! Capture trait definitions
//!
//! Platform-agnostic contract for the capture device collaborator. Device
//! selection UI and the actual encoder live outside this crate; a session only
//! acquires handles, drives segment emission and releases tracks.

use crate::relay::RelayError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

/// Information about a live device track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    /// Unique track ID
    pub id: String,

    /// Video or audio
    pub kind: TrackKind,

    /// Human readable label (e.g. "Screen 1", "Built-in Microphone")
    pub label: String,
}

/// What is being acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceKind {
    /// Screen share with optional system audio
    Display,
    /// Secondary microphone input
    Microphone,
}

/// Constraints passed to the device collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureConstraints {
    pub kind: DeviceKind,

    /// Request a video track
    pub video: bool,

    /// Request an audio track
    pub audio: bool,

    /// Whether the pointer is drawn into captured frames
    pub show_pointer: bool,
}

impl CaptureConstraints {
    /// Screen + system audio
    pub fn display(show_pointer: bool) -> Self {
        Self {
            kind: DeviceKind::Display,
            video: true,
            audio: true,
            show_pointer,
        }
    }

    /// Audio-only microphone
    pub fn microphone() -> Self {
        Self {
            kind: DeviceKind::Microphone,
            video: false,
            audio: true,
            show_pointer: false,
        }
    }
}

/// Capture errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Capture device acquisition failed: {0}")]
    AcquisitionFailed(String),

    #[error("Recording produced no data")]
    NoData,

    #[error("Capture device error: {0}")]
    Device(String),

    #[error("Failed to hand off recording: {0}")]
    Relay(#[from] RelayError),
}

pub type CaptureResult<T> = Result<T, CaptureError>;

/// A granted capture device
///
/// The device owns its encoder. Once emission starts it pushes one buffer per
/// elapsed timeslice into the segment sender, in order.
#[async_trait]
pub trait CaptureDevice: Send {
    /// Device identifier
    fn id(&self) -> &str;

    /// Tracks currently held by this device
    fn tracks(&self) -> Vec<TrackInfo>;

    /// Media type the encoder declares for its output, if it reports one
    fn declared_type(&self) -> Option<String> {
        None
    }

    /// Flips to `true` when the user revokes the device outside the session
    fn on_revoked(&self) -> watch::Receiver<bool>;

    /// Mix extra tracks (e.g. a microphone) into this device's output
    async fn attach_tracks(&mut self, tracks: Vec<TrackInfo>) -> CaptureResult<()> {
        let _ = tracks;
        Ok(())
    }

    /// Begin emitting encoded data every `timeslice`
    async fn start_emitting(
        &mut self,
        timeslice: Duration,
        segments: mpsc::UnboundedSender<Vec<u8>>,
    ) -> CaptureResult<()>;

    /// Stop the encoder. Any partially filled slice is emitted before this returns.
    async fn stop_emitting(&mut self) -> CaptureResult<()>;

    /// Stop every track and give the device back
    async fn release(&mut self);
}

/// Capture device collaborator
#[async_trait]
pub trait DeviceProvider: Send + Sync {
    /// Ask the user/OS for a device matching the constraints
    async fn acquire(&self, constraints: &CaptureConstraints) -> CaptureResult<Box<dyn CaptureDevice>>;
}
