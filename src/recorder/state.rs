//! Recording state management
//!
//! Defines the session state machine and the values it reports.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current state of the capture session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No device held
    #[default]
    Idle,
    /// Waiting for the user/OS to grant a device
    Requesting,
    /// Device granted, segments flowing
    Active,
    /// Flushing, releasing and assembling
    Stopping,
}

/// Options accepted by `start`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CaptureOptions {
    /// Draw the pointer into captured frames
    pub show_pointer: bool,

    /// Mix a microphone into the recording
    pub include_microphone: bool,
}

/// Snapshot returned by the status command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub active: bool,
    pub elapsed_seconds: u64,
}

/// Why a session is being stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Explicit stop command
    Requested,
    /// The user revoked the device outside the session
    Revoked,
    /// A new start arrived while this session was running
    Restart,
}

/// Events emitted over a session's lifetime
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Device granted, segments flowing
    Started { session_id: Uuid },
    /// The device was revoked; the stop path is running
    Revoked { session_id: Uuid },
    /// Artifact assembled and released
    Stopped { session_id: Uuid, byte_length: usize },
    /// The session ended without an artifact
    Error { session_id: Option<Uuid>, message: String },
}
