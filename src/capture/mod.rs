//! Capture collaborators and segment buffering
//!
//! This module defines the device contract a session drives and the sink that
//! collects its time-sliced output.

pub mod sink;
pub mod traits;

pub use sink::{Segment, SegmentSink};
pub use traits::{
    CaptureConstraints, CaptureDevice, CaptureError, CaptureResult, DeviceKind, DeviceProvider,
    TrackInfo, TrackKind,
};
