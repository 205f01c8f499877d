//! Playback format negotiation
//!
//! Capture encoders often declare a generic container type that the local
//! decoder refuses, while the same bytes decode fine under a more specific
//! declaration. The negotiator always probes the declared type first, then
//! walks an ordered candidate list over the unchanged bytes.

use super::probe::{DecodeProbe, ProbeOutcome};
use super::{PlaybackError, PlaybackResult};
use crate::artifact::Artifact;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Ordered media type declarations, most specific first
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormatCandidates(Vec<String>);

impl FormatCandidates {
    pub fn new(candidates: Vec<String>) -> Self {
        Self(candidates)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for FormatCandidates {
    fn default() -> Self {
        Self(
            [
                "video/webm;codecs=vp8,opus",
                "video/webm;codecs=vp9,opus",
                "video/webm;codecs=h264,opus",
                "video/webm",
                "video/mp4;codecs=h264",
                "video/mp4",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        )
    }
}

/// Finds a declaration under which an artifact actually decodes
#[derive(Clone)]
pub struct PlaybackNegotiator {
    probe: DecodeProbe,
    candidates: FormatCandidates,
}

impl PlaybackNegotiator {
    pub fn new(probe: DecodeProbe, candidates: FormatCandidates) -> Self {
        Self { probe, candidates }
    }

    /// Resolve a playable declaration for `artifact`
    pub async fn resolve(&self, artifact: Artifact) -> PlaybackResult<Artifact> {
        self.resolve_with_cancel(artifact, CancellationToken::new()).await
    }

    /// Same as [`resolve`](Self::resolve), abandoning the search when `cancel` fires
    pub async fn resolve_with_cancel(
        &self,
        artifact: Artifact,
        cancel: CancellationToken,
    ) -> PlaybackResult<Artifact> {
        // Fixed for the whole search
        let candidates = self.candidates.clone();
        let mut tried: Vec<String> = Vec::with_capacity(candidates.as_slice().len() + 1);

        let declared = artifact.declared_type().to_string();
        tracing::info!("Testing original format: {}", declared);

        let attempts = std::iter::once(declared).chain(candidates.as_slice().iter().cloned());
        for declaration in attempts {
            if tried.iter().any(|t| t.eq_ignore_ascii_case(&declaration)) {
                continue;
            }

            let candidate = artifact.redeclare(declaration.clone());
            let outcome = self.probe.probe(&candidate, &cancel).await;
            tried.push(declaration.clone());

            match outcome {
                ProbeOutcome::Decoded => {
                    tracing::info!("Format works: {}", declaration);
                    return Ok(candidate);
                }
                ProbeOutcome::Cancelled => {
                    tracing::info!("Format negotiation cancelled after {} probes", tried.len());
                    return Err(PlaybackError::Cancelled);
                }
                other => {
                    tracing::debug!("Format {} not playable: {:?}", declaration, other);
                }
            }
        }

        tracing::warn!("No supported video format found after {} probes", tried.len());
        Err(PlaybackError::NoPlayableFormat { tried })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedDecoder;
    use std::sync::Arc;
    use std::time::Duration;

    fn negotiator(decoder: Arc<ScriptedDecoder>) -> PlaybackNegotiator {
        let probe = DecodeProbe::new(decoder, Duration::from_secs(5), Duration::from_secs(10));
        PlaybackNegotiator::new(probe, FormatCandidates::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_declared_type_is_always_probed() {
        let decoder = Arc::new(ScriptedDecoder::new().playable("video/webm"));
        let negotiator = negotiator(decoder.clone());

        let artifact = Artifact::new(vec![1u8, 2, 3], "video/webm");
        let playable = negotiator.resolve(artifact.clone()).await.unwrap();

        assert_eq!(playable, artifact);
        assert_eq!(decoder.probed(), vec!["video/webm".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_generic_webm_falls_back_to_vp8() {
        let decoder = Arc::new(ScriptedDecoder::new().playable("video/webm;codecs=vp8,opus"));
        let negotiator = negotiator(decoder.clone());

        let artifact = Artifact::new(vec![0x1a, 0x45, 0xdf, 0xa3, 0x01], "video/webm");
        let playable = negotiator.resolve(artifact.clone()).await.unwrap();

        assert_eq!(playable.declared_type(), "video/webm;codecs=vp8,opus");
        assert_eq!(playable.bytes(), artifact.bytes());
        assert_eq!(
            decoder.probed(),
            vec!["video/webm".to_string(), "video/webm;codecs=vp8,opus".to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_move_on_to_next_candidate() {
        let decoder = Arc::new(
            ScriptedDecoder::new()
                .silent("video/webm")
                .stalling("video/webm;codecs=vp8,opus")
                .playable("video/webm;codecs=vp9,opus"),
        );
        let negotiator = negotiator(decoder.clone());

        let playable = negotiator
            .resolve(Artifact::new(vec![7u8; 16], "video/webm"))
            .await
            .unwrap();
        assert_eq!(playable.declared_type(), "video/webm;codecs=vp9,opus");
        assert_eq!(decoder.probed().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_candidates() {
        let decoder = Arc::new(ScriptedDecoder::new());
        let negotiator = negotiator(decoder.clone());

        let err = negotiator
            .resolve(Artifact::new(vec![1u8], "video/x-unknown"))
            .await
            .unwrap_err();

        match err {
            PlaybackError::NoPlayableFormat { tried } => {
                // declared type plus six candidates, none repeated
                assert_eq!(tried.len(), 7);
                assert_eq!(tried[0], "video/x-unknown");
                assert_eq!(tried[1], "video/webm;codecs=vp8,opus");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_declaration_is_probed_once() {
        let decoder = Arc::new(ScriptedDecoder::new());
        let negotiator = negotiator(decoder.clone());

        let _ = negotiator.resolve(Artifact::new(vec![1u8], "video/webm")).await;
        let probed = decoder.probed();
        assert_eq!(probed.iter().filter(|t| *t == "video/webm").count(), 1);
        assert_eq!(probed.len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_search() {
        let decoder = Arc::new(ScriptedDecoder::new().silent("video/webm"));
        let negotiator = negotiator(decoder.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = negotiator
            .resolve_with_cancel(Artifact::new(vec![1u8], "video/webm"), cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, PlaybackError::Cancelled));
        assert_eq!(decoder.probed().len(), 1);
    }
}
