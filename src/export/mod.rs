//! Export module
//!
//! Hands finished recordings to the upload and download collaborators.

pub mod download;
pub mod service;
pub mod types;

pub use download::FileDownloader;
pub use service::{ExportService, DEFAULT_FILENAME_PREFIX};
pub use types::{Downloader, ExportError, ExportResult, UploadReceipt, Uploader};
