//! Cross-context artifact relay
//!
//! - `message`: envelopes, payload encodings and frames that cross the boundary
//! - `channel`: the single-slot host task and its client handle

pub mod channel;
pub mod message;

pub use channel::{RelayAck, RelayChannel, RelayHost};
pub use message::{
    RelayAction, RelayEncoding, RelayError, RelayFrame, RelayMessage, RelayPayload, RelayResult,
};
