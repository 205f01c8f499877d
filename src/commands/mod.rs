//! Command handlers
//!
//! Entry points the UI contexts call into. Every command gets exactly one
//! response.

pub mod recording;

pub use recording::{Command, CommandResponse, Controller};
