//! Export collaborator contracts
//!
//! Upload and download targets are external. The core hands them a finished
//! artifact and a suggested filename and does not look at how they deliver it.

use crate::artifact::Artifact;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result reported by an upload collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub success: bool,
    /// Shareable location of the uploaded file
    pub location_url: Option<String>,
}

/// Upload collaborator (cloud storage, drive, ...)
///
/// Token refresh, credential retries and sharing permissions are the
/// implementor's business.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, artifact: &Artifact, filename: &str) -> ExportResult<UploadReceipt>;
}

/// Download collaborator that saves locally
#[async_trait]
pub trait Downloader: Send + Sync {
    async fn save(&self, artifact: Artifact, filename: String) -> ExportResult<()>;
}

/// Export errors
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),
}

pub type ExportResult<T> = Result<T, ExportError>;
