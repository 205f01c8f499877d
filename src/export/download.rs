//! Local file download target

use super::types::{Downloader, ExportError, ExportResult};
use crate::artifact::Artifact;
use crate::config::ExportConfig;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Writes artifacts into a directory
#[derive(Debug, Clone)]
pub struct FileDownloader {
    dir: PathBuf,
}

impl FileDownloader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Target the configured directory, or the working directory when none is set
    pub fn from_config(config: &ExportConfig) -> Self {
        Self::new(config.download_dir.clone().unwrap_or_else(|| PathBuf::from(".")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Keep the name inside the target directory
    fn target_for(&self, filename: &str) -> ExportResult<PathBuf> {
        let name = Path::new(filename)
            .file_name()
            .ok_or_else(|| ExportError::DownloadFailed(format!("invalid filename: {:?}", filename)))?;
        Ok(self.dir.join(name))
    }
}

#[async_trait]
impl Downloader for FileDownloader {
    async fn save(&self, artifact: Artifact, filename: String) -> ExportResult<()> {
        let target = self.target_for(&filename)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&target, artifact.bytes()).await?;

        tracing::info!("Saved {} bytes to {:?}", artifact.len(), target);
        Ok(())
    }
}
