//! Relay host and client handles
//!
//! The host runs in its own task and owns a single artifact slot. Clients talk
//! to it only through packed frames, one reply per request.

use super::message::{RelayAction, RelayEncoding, RelayError, RelayFrame, RelayMessage, RelayResult};
use crate::artifact::Artifact;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Acknowledgement for a stored artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayAck {
    pub byte_length: usize,
    pub declared_type: String,
    /// Whether an unconsumed artifact was overwritten
    pub replaced: bool,
}

enum RelayReply {
    Stored(RelayAck),
    Fetched(RelayFrame),
    Cleared,
}

struct RelayRequest {
    frame: RelayFrame,
    reply: oneshot::Sender<RelayResult<RelayReply>>,
}

/// Receiving side of the relay: a single-slot artifact register
pub struct RelayHost {
    slot: Option<Artifact>,
    encoding: RelayEncoding,
    requests: mpsc::Receiver<RelayRequest>,
}

impl RelayHost {
    /// Start a host task and return a client connected to it
    pub fn spawn(encoding: RelayEncoding, queue_depth: usize) -> (RelayChannel, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let host = Self {
            slot: None,
            encoding,
            requests: rx,
        };

        let handle = tokio::spawn(host.run());
        (RelayChannel { requests: tx, encoding }, handle)
    }

    async fn run(mut self) {
        tracing::debug!("Relay host started ({:?})", self.encoding);

        while let Some(request) = self.requests.recv().await {
            let result = self.handle(request.frame);
            if request.reply.send(result).is_err() {
                tracing::warn!("Relay client went away before reading its reply");
            }
        }

        tracing::debug!("Relay host stopped");
    }

    fn handle(&mut self, frame: RelayFrame) -> RelayResult<RelayReply> {
        let message = frame.unpack()?;

        match message.action {
            RelayAction::Store => {
                if let Some(payload) = &message.payload {
                    tracing::debug!(
                        "Store request carries {} bytes ({:?})",
                        payload.declared_len(),
                        payload.encoding()
                    );
                }

                let artifact = message.into_artifact().map_err(|e| {
                    tracing::error!("Rejected relay store: {}", e);
                    e
                })?;

                let replaced = self.slot.is_some();
                if replaced {
                    tracing::warn!("Replacing unconsumed recording in relay slot");
                }

                tracing::info!(
                    "Stored recording: {} bytes, type {}",
                    artifact.len(),
                    artifact.declared_type()
                );

                let ack = RelayAck {
                    byte_length: artifact.len(),
                    declared_type: artifact.declared_type().to_string(),
                    replaced,
                };
                self.slot = Some(artifact);
                Ok(RelayReply::Stored(ack))
            }
            RelayAction::Fetch => {
                let artifact = self.slot.as_ref().ok_or(RelayError::NoArtifact)?;

                tracing::info!(
                    "Retrieving recording: {} bytes, type {}",
                    artifact.len(),
                    artifact.declared_type()
                );

                let frame = RelayFrame::pack(RelayMessage::fetched(artifact, self.encoding))?;
                Ok(RelayReply::Fetched(frame))
            }
            RelayAction::Clear => {
                self.slot = None;
                tracing::info!("Cleared recording data");
                Ok(RelayReply::Cleared)
            }
        }
    }
}

/// Sending/receiving handle onto a relay host
#[derive(Clone)]
pub struct RelayChannel {
    requests: mpsc::Sender<RelayRequest>,
    encoding: RelayEncoding,
}

impl RelayChannel {
    /// Hand an artifact to the host. The local reference is dropped once acknowledged.
    pub async fn send(&self, artifact: Artifact) -> RelayResult<RelayAck> {
        let message = RelayMessage::store(&artifact, self.encoding);
        drop(artifact);
        self.store_message(message).await
    }

    /// Forward an envelope that was encoded elsewhere
    pub async fn store_message(&self, message: RelayMessage) -> RelayResult<RelayAck> {
        if message.action != RelayAction::Store {
            return Err(RelayError::InvalidMessage(format!(
                "expected a store message, got {:?}",
                message.action
            )));
        }

        match self.request(message).await? {
            RelayReply::Stored(ack) => Ok(ack),
            _ => Err(RelayError::InvalidMessage("unexpected reply to store".to_string())),
        }
    }

    /// Fetch the stored artifact without consuming it
    pub async fn receive(&self) -> RelayResult<Artifact> {
        self.receive_message().await?.into_artifact()
    }

    /// Fetch the stored artifact as a transport envelope
    pub async fn receive_message(&self) -> RelayResult<RelayMessage> {
        match self.request(RelayMessage::fetch()).await? {
            RelayReply::Fetched(frame) => frame.unpack(),
            _ => Err(RelayError::InvalidMessage("unexpected reply to fetch".to_string())),
        }
    }

    /// Empty the slot
    pub async fn clear(&self) -> RelayResult<()> {
        match self.request(RelayMessage::clear()).await? {
            RelayReply::Cleared => Ok(()),
            _ => Err(RelayError::InvalidMessage("unexpected reply to clear".to_string())),
        }
    }

    async fn request(&self, message: RelayMessage) -> RelayResult<RelayReply> {
        let frame = RelayFrame::pack(message)?;
        let (reply_tx, reply_rx) = oneshot::channel();

        self.requests
            .send(RelayRequest {
                frame,
                reply: reply_tx,
            })
            .await
            .map_err(|_| RelayError::Disconnected)?;

        reply_rx.await.map_err(|_| RelayError::Disconnected)?
    }
}
