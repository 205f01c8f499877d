//! Error types and handling
//!
//! Aggregates the per-module errors into the shape handed back to callers.

use crate::capture::CaptureError;
use crate::export::ExportError;
use crate::playback::PlaybackError;
use crate::relay::RelayError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("Configuration error: {0:#}")]
    Config(#[from] anyhow::Error),
}

impl AppError {
    /// Stable code reported to callers
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Capture(e) => match e {
                CaptureError::AcquisitionFailed(_) => "ACQUISITION_FAILED",
                CaptureError::NoData => "NO_DATA",
                CaptureError::Device(_) => "DEVICE_ERROR",
                CaptureError::Relay(e) => relay_code(e),
            },
            AppError::Relay(e) => relay_code(e),
            AppError::Playback(e) => match e {
                PlaybackError::NoPlayableFormat { .. } => "NO_PLAYABLE_FORMAT",
                PlaybackError::Cancelled => "CANCELLED",
                PlaybackError::Sink(_) => "PLAYBACK_ERROR",
            },
            AppError::Export(e) => match e {
                ExportError::UploadFailed(_) => "UPLOAD_FAILED",
                ExportError::DownloadFailed(_) => "DOWNLOAD_FAILED",
                ExportError::Io(_) => "IO_ERROR",
            },
            AppError::Config(_) => "CONFIG_ERROR",
        }
    }
}

fn relay_code(error: &RelayError) -> &'static str {
    match error {
        RelayError::Corruption(_) => "RELAY_CORRUPTION",
        RelayError::NoArtifact => "NO_ARTIFACT",
        RelayError::InvalidMessage(_) => "INVALID_MESSAGE",
        RelayError::Encoding(_) => "SERIALIZATION_ERROR",
        RelayError::Disconnected => "RELAY_DISCONNECTED",
    }
}

/// Error response for frontend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        ErrorResponse {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
