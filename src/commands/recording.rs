//! Recording commands
//!
//! The controller owns the session, the relay client and the playback and
//! export services, and answers every command with exactly one response.

use crate::artifact::Artifact;
use crate::capture::DeviceProvider;
use crate::config::CoreConfig;
use crate::export::{Downloader, ExportService, UploadReceipt, Uploader};
use crate::playback::{DecodeProbe, DecodeSink, PlaybackError, PlaybackNegotiator};
use crate::recorder::{CaptureOptions, CaptureSession, SessionSettings, SessionStatus};
use crate::relay::{RelayAck, RelayChannel, RelayHost, RelayMessage};
use crate::utils::error::{AppError, AppResult, ErrorResponse};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Commands accepted from the UI contexts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    StartRecording {
        #[serde(default)]
        options: CaptureOptions,
    },
    StopRecording,
    GetRecordingStatus,
    StoreRecordedBlob {
        message: RelayMessage,
    },
    GetRecordedBlob,
    ClearRecording,
}

/// One response per command
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum CommandResponse {
    Started,
    /// `byte_length` is absent when nothing was recording
    #[serde(rename_all = "camelCase")]
    Stopped { byte_length: Option<usize> },
    Status(SessionStatus),
    Stored(RelayAck),
    Blob(RelayMessage),
    Cleared,
    Error(ErrorResponse),
}

impl CommandResponse {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// Raw artifact and the declaration it was found playable under
struct Negotiated {
    raw: Artifact,
    playable: Artifact,
}

/// Command dispatcher for one recording context
pub struct Controller {
    session: CaptureSession,
    relay: RelayChannel,
    negotiator: PlaybackNegotiator,
    export: ExportService,
    negotiated: Mutex<Option<Negotiated>>,
}

impl Controller {
    pub fn new(
        session: CaptureSession,
        relay: RelayChannel,
        negotiator: PlaybackNegotiator,
        export: ExportService,
    ) -> Self {
        Self {
            session,
            relay,
            negotiator,
            export,
            negotiated: Mutex::new(None),
        }
    }

    /// Wire everything up from configuration.
    ///
    /// Returns the controller and the relay host task.
    pub fn from_config(
        config: &CoreConfig,
        provider: Arc<dyn DeviceProvider>,
        decoder: Arc<dyn DecodeSink>,
    ) -> (Self, JoinHandle<()>) {
        let (relay, host) = RelayHost::spawn(config.relay.encoding, config.relay.queue_depth);
        let session = CaptureSession::with_relay(provider, SessionSettings::from(config), relay.clone());

        let probe = DecodeProbe::new(
            decoder,
            config.initial_probe_timeout(),
            config.stall_probe_timeout(),
        );
        let negotiator = PlaybackNegotiator::new(probe, config.format_candidates.clone());
        let export = ExportService::new(config.export.filename_prefix.clone());

        tracing::info!(
            "Controller ready (slice {}ms, relay {:?})",
            config.slice_interval_ms,
            config.relay.encoding
        );

        (Self::new(session, relay, negotiator, export), host)
    }

    pub fn session(&self) -> &CaptureSession {
        &self.session
    }

    /// Dispatch a command
    pub async fn handle(&self, command: Command) -> CommandResponse {
        tracing::debug!("Handling {:?}", command);

        match self.dispatch(command).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Command failed: {}", e);
                CommandResponse::Error(e.into())
            }
        }
    }

    async fn dispatch(&self, command: Command) -> AppResult<CommandResponse> {
        match command {
            Command::StartRecording { options } => {
                self.session.start(options).await?;
                Ok(CommandResponse::Started)
            }
            Command::StopRecording => {
                let artifact = self.session.stop().await?;
                Ok(CommandResponse::Stopped {
                    byte_length: artifact.map(|a| a.len()),
                })
            }
            Command::GetRecordingStatus => Ok(CommandResponse::Status(self.session.status())),
            Command::StoreRecordedBlob { message } => {
                let ack = self.relay.store_message(message).await?;
                Ok(CommandResponse::Stored(ack))
            }
            Command::GetRecordedBlob => {
                // Responses leave this context as JSON
                let message = self.relay.receive_message().await?.into_serializable();
                Ok(CommandResponse::Blob(message))
            }
            Command::ClearRecording => {
                self.relay.clear().await?;
                self.negotiated.lock().take();
                Ok(CommandResponse::Cleared)
            }
        }
    }

    /// Fetch the stored recording and find a declaration it plays under
    pub async fn preview(&self) -> AppResult<Artifact> {
        self.preview_with_cancel(CancellationToken::new()).await
    }

    /// Same as [`preview`](Self::preview), abandoning negotiation when `cancel` fires
    pub async fn preview_with_cancel(&self, cancel: CancellationToken) -> AppResult<Artifact> {
        let raw = self.relay.receive().await?;

        if let Some(cached) = self.cached_playable(&raw) {
            tracing::debug!("Reusing negotiated format {}", cached.declared_type());
            return Ok(cached);
        }

        let playable = self.negotiator.resolve_with_cancel(raw.clone(), cancel).await?;
        *self.negotiated.lock() = Some(Negotiated {
            raw,
            playable: playable.clone(),
        });
        Ok(playable)
    }

    /// Upload the stored recording
    pub async fn upload(&self, uploader: &dyn Uploader) -> AppResult<UploadReceipt> {
        let artifact = self.export_artifact().await?;
        Ok(self.export.upload(uploader, &artifact).await?)
    }

    /// Save the stored recording locally, returning the filename used.
    ///
    /// Bytes no candidate could decode are still saved under their declared type.
    pub async fn download(&self, downloader: Arc<dyn Downloader>) -> AppResult<String> {
        let artifact = match self.preview().await {
            Ok(playable) => playable,
            Err(AppError::Playback(PlaybackError::NoPlayableFormat { tried })) => {
                tracing::warn!(
                    "Saving undecodable recording as-is after {} probes",
                    tried.len()
                );
                self.relay.receive().await?
            }
            Err(e) => return Err(e),
        };

        let (filename, _save) = self.export.download(downloader, artifact);
        Ok(filename)
    }

    /// The negotiated artifact if there is one for the stored bytes, else the raw one
    async fn export_artifact(&self) -> AppResult<Artifact> {
        let raw = self.relay.receive().await?;
        Ok(self.cached_playable(&raw).unwrap_or(raw))
    }

    fn cached_playable(&self, raw: &Artifact) -> Option<Artifact> {
        self.negotiated
            .lock()
            .as_ref()
            .filter(|n| n.raw == *raw)
            .map(|n| n.playable.clone())
    }
}
