//! Decode probes
//!
//! A probe loads an artifact into a passive decode sink and waits for the first
//! decoded frame. Two deadlines bound the wait: a short one while the sink has
//! shown no progress at all, and a longer one that restarts on every progress
//! signal.

use super::PlaybackResult;
use crate::artifact::Artifact;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Signals a decode sink reports while loading
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeSignal {
    /// Some data was read or parsed
    Progress,
    /// A frame was decoded
    FirstFrame,
    /// The sink gave up
    Error(String),
}

/// Passive decode sink collaborator
#[async_trait]
pub trait DecodeSink: Send + Sync {
    /// Start loading `artifact` under its declared type.
    ///
    /// Returns once loading has been kicked off; outcomes arrive on `signals`.
    async fn load(
        &self,
        artifact: Artifact,
        signals: mpsc::UnboundedSender<DecodeSignal>,
    ) -> PlaybackResult<()>;
}

/// Result of a single probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// First frame decoded
    Decoded,
    /// The sink reported an error
    Rejected(String),
    /// Nothing happened before the initial deadline
    NoProgress,
    /// Progress began, then stopped for longer than the stall deadline
    Stalled,
    /// The caller cancelled the probe
    Cancelled,
}

/// Timeout-bound probe over a decode sink
#[derive(Clone)]
pub struct DecodeProbe {
    sink: Arc<dyn DecodeSink>,
    initial_timeout: Duration,
    stall_timeout: Duration,
}

impl DecodeProbe {
    pub fn new(sink: Arc<dyn DecodeSink>, initial_timeout: Duration, stall_timeout: Duration) -> Self {
        Self {
            sink,
            initial_timeout,
            stall_timeout,
        }
    }

    /// Probe `artifact` under its declared type
    pub async fn probe(&self, artifact: &Artifact, cancel: &CancellationToken) -> ProbeOutcome {
        let (tx, mut rx) = mpsc::unbounded_channel();

        if let Err(e) = self.sink.load(artifact.clone(), tx).await {
            return ProbeOutcome::Rejected(e.to_string());
        }

        let mut progressed = false;
        let deadline = tokio::time::sleep(self.initial_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return ProbeOutcome::Cancelled,
                _ = &mut deadline => {
                    return if progressed {
                        ProbeOutcome::Stalled
                    } else {
                        ProbeOutcome::NoProgress
                    };
                }
                signal = rx.recv() => match signal {
                    Some(DecodeSignal::FirstFrame) => return ProbeOutcome::Decoded,
                    Some(DecodeSignal::Error(message)) => return ProbeOutcome::Rejected(message),
                    Some(DecodeSignal::Progress) => {
                        if !progressed {
                            tracing::debug!("Decode started for {}", artifact.declared_type());
                        }
                        progressed = true;
                        deadline.as_mut().reset(Instant::now() + self.stall_timeout);
                    }
                    None => {
                        return ProbeOutcome::Rejected(
                            "decode sink finished without a frame".to_string(),
                        );
                    }
                },
            }
        }
    }
}
