//! Screen Relay - capture, relay and replay browser-style screen recordings.
//!
//! This is the core library crate. It provides the capture session state
//! machine, the cross-context artifact relay, playback format negotiation and
//! the export hand-off. Platform capture, decoding and storage are supplied by
//! collaborators implementing the traits in [`capture`], [`playback`] and
//! [`export`].

pub mod artifact;
pub mod capture;
pub mod commands;
pub mod config;
pub mod export;
pub mod playback;
pub mod recorder;
pub mod relay;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use artifact::{Artifact, MediaType};
pub use commands::{Command, CommandResponse, Controller};
pub use config::CoreConfig;
pub use recorder::{CaptureOptions, CaptureSession, SessionEvent, SessionState, SessionStatus};
pub use relay::{RelayChannel, RelayEncoding, RelayHost};
pub use utils::error::{AppError, AppResult, ErrorResponse};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// Honors `RUST_LOG`, defaulting to debug output for this crate. Calling it
/// again once a subscriber is installed does nothing.
pub fn init_tracing() {
    let installed = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "screen_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("Starting Screen Relay v{}", env!("CARGO_PKG_VERSION"));
    }
}
