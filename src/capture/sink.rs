//! Segment sink
//!
//! Buffers time-sliced capture output in arrival order until the session
//! assembles it into one artifact.

use super::traits::{CaptureError, CaptureResult};
use crate::artifact::Artifact;

/// One time-sliced fragment of capture output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    index: u64,
    bytes: Vec<u8>,
}

impl Segment {
    /// Arrival order, starting at 0
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Accumulates segments for a single session
#[derive(Debug, Default)]
pub struct SegmentSink {
    segments: Vec<Segment>,
    next_index: u64,
    total_bytes: usize,
}

impl SegmentSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a segment. Empty emissions are dropped and get no index.
    pub fn push(&mut self, bytes: Vec<u8>) -> Option<u64> {
        if bytes.is_empty() {
            return None;
        }

        let index = self.next_index;
        self.next_index += 1;
        self.total_bytes += bytes.len();
        self.segments.push(Segment { index, bytes });
        Some(index)
    }

    /// Number of buffered segments
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Concatenate every segment in arrival order and empty the sink.
    ///
    /// The sink is cleared even when there is nothing to assemble.
    pub fn assemble(&mut self, declared_type: &str) -> CaptureResult<Artifact> {
        let segments = std::mem::take(&mut self.segments);
        let total = std::mem::take(&mut self.total_bytes);
        self.next_index = 0;

        if total == 0 {
            return Err(CaptureError::NoData);
        }

        let mut bytes = Vec::with_capacity(total);
        for segment in segments {
            bytes.extend_from_slice(&segment.bytes);
        }

        tracing::debug!("Assembled {} bytes as {}", bytes.len(), declared_type);
        Ok(Artifact::new(bytes, declared_type))
    }

    /// Drop everything without assembling
    pub fn clear(&mut self) {
        self.segments.clear();
        self.total_bytes = 0;
        self.next_index = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assemble_preserves_arrival_order() {
        let mut sink = SegmentSink::new();
        let fragments: Vec<Vec<u8>> = vec![vec![1, 2, 3], vec![4], vec![5, 6], vec![7, 8, 9, 10]];
        for fragment in &fragments {
            sink.push(fragment.clone());
        }

        assert_eq!(sink.len(), 4);
        assert_eq!(sink.total_bytes(), 10);

        let artifact = sink.assemble("video/webm").unwrap();
        assert_eq!(artifact.bytes(), fragments.concat().as_slice());
        assert_eq!(artifact.declared_type(), "video/webm");
        assert!(sink.is_empty());
        assert_eq!(sink.total_bytes(), 0);
    }

    #[test]
    fn test_segments_are_indexed_by_arrival() {
        let mut sink = SegmentSink::new();
        assert_eq!(sink.push(vec![9]), Some(0));
        assert_eq!(sink.push(Vec::new()), None);
        assert_eq!(sink.push(vec![8, 7]), Some(1));

        let indexes: Vec<u64> = sink.segments().iter().map(Segment::index).collect();
        assert_eq!(indexes, vec![0, 1]);
        assert_eq!(sink.segments()[1].len(), 2);
    }

    #[test]
    fn test_empty_sink_is_no_data() {
        let mut sink = SegmentSink::new();
        sink.push(Vec::new());
        assert!(matches!(sink.assemble("video/webm"), Err(CaptureError::NoData)));
    }

    #[test]
    fn test_assembly_does_not_leak_into_next_session() {
        let mut sink = SegmentSink::new();
        sink.push(vec![1, 1]);
        sink.assemble("video/webm").unwrap();

        sink.push(vec![2]);
        assert_eq!(sink.segments()[0].index(), 0);
        let second = sink.assemble("video/webm").unwrap();
        assert_eq!(second.bytes(), &[2]);
    }
}
