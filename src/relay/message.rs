//! Relay envelopes and payload encoding
//!
//! Contexts on either side of the relay share no memory. An artifact crosses
//! either as a transferred binary reference or, where the boundary cannot carry
//! one, as a plain numeric array that is re-validated on the far side.

use crate::artifact::Artifact;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// How payloads cross the boundary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelayEncoding {
    /// Hand over the buffer itself
    #[default]
    Transfer,
    /// Serialize every byte as a number
    NumericArray,
}

impl std::str::FromStr for RelayEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "transfer" => Ok(Self::Transfer),
            "numericarray" | "numeric-array" | "numeric_array" => Ok(Self::NumericArray),
            other => Err(format!("unknown relay encoding: {}", other)),
        }
    }
}

/// Action discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayAction {
    Store,
    Fetch,
    Clear,
}

/// Payload carried by a relay message
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "encoding", rename_all = "camelCase")]
pub enum RelayPayload {
    /// Buffer handed across without copying; never serialized
    #[serde(skip)]
    Transfer(Arc<[u8]>),

    /// One number per byte plus the element count the sender wrote
    #[serde(rename_all = "camelCase")]
    NumericArray { length: usize, data: Vec<u32> },
}

impl RelayPayload {
    /// Encode a buffer for the given boundary
    pub fn encode(bytes: &Arc<[u8]>, encoding: RelayEncoding) -> Self {
        match encoding {
            RelayEncoding::Transfer => Self::Transfer(Arc::clone(bytes)),
            RelayEncoding::NumericArray => Self::NumericArray {
                length: bytes.len(),
                data: bytes.iter().map(|&b| u32::from(b)).collect(),
            },
        }
    }

    /// Rebuild the buffer, rejecting anything that is not a lossless copy
    pub fn decode(self) -> RelayResult<Arc<[u8]>> {
        match self {
            Self::Transfer(bytes) => Ok(bytes),
            Self::NumericArray { length, data } => {
                let transferred = data.len();
                let bytes = data
                    .into_iter()
                    .enumerate()
                    .map(|(index, value)| {
                        u8::try_from(value).map_err(|_| RelayError::Corruption(format!(
                            "element {} is {}, not a byte",
                            index, value
                        )))
                    })
                    .collect::<RelayResult<Vec<u8>>>()?;

                if bytes.len() != transferred || bytes.len() != length {
                    return Err(RelayError::Corruption(format!(
                        "expected {} bytes, reconstructed {} from {} elements",
                        length,
                        bytes.len(),
                        transferred
                    )));
                }

                Ok(bytes.into())
            }
        }
    }

    /// Byte count the payload claims to carry
    pub fn declared_len(&self) -> usize {
        match self {
            Self::Transfer(bytes) => bytes.len(),
            Self::NumericArray { length, .. } => *length,
        }
    }

    pub fn encoding(&self) -> RelayEncoding {
        match self {
            Self::Transfer(_) => RelayEncoding::Transfer,
            Self::NumericArray { .. } => RelayEncoding::NumericArray,
        }
    }
}

impl std::fmt::Debug for RelayPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transfer(bytes) => f.debug_tuple("Transfer").field(&bytes.len()).finish(),
            Self::NumericArray { length, data } => f
                .debug_struct("NumericArray")
                .field("length", length)
                .field("elements", &data.len())
                .finish(),
        }
    }
}

/// Transport envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayMessage {
    pub action: RelayAction,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<RelayPayload>,

    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub declared_type: Option<String>,
}

impl RelayMessage {
    /// Envelope asking the host to keep `artifact`
    pub fn store(artifact: &Artifact, encoding: RelayEncoding) -> Self {
        Self::carrying(RelayAction::Store, artifact, encoding)
    }

    /// Envelope answering a fetch with `artifact`
    pub fn fetched(artifact: &Artifact, encoding: RelayEncoding) -> Self {
        Self::carrying(RelayAction::Fetch, artifact, encoding)
    }

    pub fn fetch() -> Self {
        Self {
            action: RelayAction::Fetch,
            payload: None,
            declared_type: None,
        }
    }

    pub fn clear() -> Self {
        Self {
            action: RelayAction::Clear,
            payload: None,
            declared_type: None,
        }
    }

    fn carrying(action: RelayAction, artifact: &Artifact, encoding: RelayEncoding) -> Self {
        Self {
            action,
            payload: Some(RelayPayload::encode(&artifact.shared_bytes(), encoding)),
            declared_type: Some(artifact.declared_type().to_string()),
        }
    }

    /// Same envelope with a payload that survives serialization.
    ///
    /// Transferred buffers become numeric arrays; everything else is unchanged.
    pub fn into_serializable(mut self) -> Self {
        if let Some(RelayPayload::Transfer(bytes)) = &self.payload {
            self.payload = Some(RelayPayload::encode(bytes, RelayEncoding::NumericArray));
        }
        self
    }

    /// Reconstruct the carried artifact
    pub fn into_artifact(self) -> RelayResult<Artifact> {
        let payload = self
            .payload
            .ok_or_else(|| RelayError::InvalidMessage("missing payload".to_string()))?;
        let declared_type = self
            .declared_type
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| RelayError::InvalidMessage("missing media type".to_string()))?;

        let bytes = payload.decode()?;
        if bytes.is_empty() {
            return Err(RelayError::InvalidMessage("empty payload".to_string()));
        }

        Ok(Artifact::new(bytes, declared_type))
    }
}

/// What actually crosses the context boundary
#[derive(Debug)]
pub enum RelayFrame {
    /// Envelope moved as-is, binary reference included
    Transferred(RelayMessage),
    /// Envelope flattened to structured text
    Structured(String),
}

impl RelayFrame {
    /// Prepare a message for crossing. Transfer payloads move, everything else is serialized.
    pub fn pack(message: RelayMessage) -> RelayResult<Self> {
        match message.payload {
            Some(RelayPayload::Transfer(_)) => Ok(Self::Transferred(message)),
            _ => Ok(Self::Structured(serde_json::to_string(&message)?)),
        }
    }

    pub fn unpack(self) -> RelayResult<RelayMessage> {
        match self {
            Self::Transferred(message) => Ok(message),
            Self::Structured(text) => Ok(serde_json::from_str(&text)?),
        }
    }
}

/// Relay errors
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Relay corruption: {0}")]
    Corruption(String),

    #[error("No recording available")]
    NoArtifact,

    #[error("Invalid relay message: {0}")]
    InvalidMessage(String),

    #[error("Relay encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Relay host is not running")]
    Disconnected,
}

pub type RelayResult<T> = Result<T, RelayError>;
