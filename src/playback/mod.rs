//! Playback negotiation
//!
//! Decides which media type declaration lets the local decoder play an
//! artifact. Bytes are never modified, only re-declared.

pub mod ffprobe;
pub mod negotiator;
pub mod probe;

pub use ffprobe::FfprobeDecodeSink;
pub use negotiator::{FormatCandidates, PlaybackNegotiator};
pub use probe::{DecodeProbe, DecodeSignal, DecodeSink, ProbeOutcome};

use thiserror::Error;

/// Playback errors
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("No supported video format found (tried {})", .tried.join(", "))]
    NoPlayableFormat { tried: Vec<String> },

    #[error("Format negotiation cancelled")]
    Cancelled,

    #[error("Decode sink error: {0}")]
    Sink(String),
}

pub type PlaybackResult<T> = Result<T, PlaybackError>;
