//! Export hand-off
//!
//! Names finished recordings and passes them to the upload and download
//! collaborators.

use super::types::{Downloader, ExportError, ExportResult, UploadReceipt, Uploader};
use crate::artifact::Artifact;
use chrono::{DateTime, SecondsFormat, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Default filename prefix
pub const DEFAULT_FILENAME_PREFIX: &str = "screen-recording";

/// Hands artifacts to export collaborators
#[derive(Debug, Clone)]
pub struct ExportService {
    filename_prefix: String,
}

impl ExportService {
    pub fn new(filename_prefix: impl Into<String>) -> Self {
        Self {
            filename_prefix: filename_prefix.into(),
        }
    }

    /// Suggested filename for an artifact recorded now
    pub fn suggested_filename(&self, artifact: &Artifact) -> String {
        self.filename_at(artifact, Utc::now())
    }

    /// `<prefix>-<UTC timestamp>.<ext>`, with `:` swapped out so the name is portable
    pub fn filename_at(&self, artifact: &Artifact, at: DateTime<Utc>) -> String {
        let stamp = at
            .to_rfc3339_opts(SecondsFormat::Millis, true)
            .replace(':', "-");
        format!("{}-{}.{}", self.filename_prefix, stamp, artifact.extension())
    }

    /// Upload an artifact and require a successful receipt
    pub async fn upload(&self, uploader: &dyn Uploader, artifact: &Artifact) -> ExportResult<UploadReceipt> {
        let filename = self.suggested_filename(artifact);
        tracing::info!("Uploading {} ({} bytes)", filename, artifact.len());

        let receipt = uploader.upload(artifact, &filename).await.map_err(|e| {
            tracing::error!("Upload of {} failed: {}", filename, e);
            e
        })?;

        if !receipt.success {
            return Err(ExportError::UploadFailed(format!(
                "collaborator rejected {}",
                filename
            )));
        }

        tracing::info!("Uploaded {} to {:?}", filename, receipt.location_url);
        Ok(receipt)
    }

    /// Trigger a local save without waiting for it.
    ///
    /// Returns the filename used and the background task, which only logs failures.
    pub fn download(&self, downloader: Arc<dyn Downloader>, artifact: Artifact) -> (String, JoinHandle<()>) {
        let filename = self.suggested_filename(&artifact);
        let name = filename.clone();

        let handle = tokio::spawn(async move {
            if let Err(e) = downloader.save(artifact, name.clone()).await {
                tracing::error!("Download of {} failed: {}", name, e);
            }
        });

        (filename, handle)
    }
}

impl Default for ExportService {
    fn default() -> Self {
        Self::new(DEFAULT_FILENAME_PREFIX)
    }
}
