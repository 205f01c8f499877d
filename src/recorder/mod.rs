//! Recording session module
//!
//! - `state`: session states, options and events
//! - `session`: the capture session state machine

pub mod session;
pub mod state;

pub use session::{CaptureSession, SessionSettings};
pub use state::{CaptureOptions, SessionEvent, SessionState, SessionStatus, StopReason};
