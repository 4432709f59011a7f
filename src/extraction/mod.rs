//! Bit extraction from camera frames.
//!
//! The session only depends on the [`Extractor`] contract: how many bytes
//! are currently buffered. [`FrameExtractor`] is the reference
//! implementation used by the capture pipeline.

mod difference;
mod packing;

pub use difference::FrameDifferencer;
pub use packing::{mix, pack_lsb};

use crate::capture::Frame;
use std::collections::VecDeque;

/// Observable state of a bit extractor.
pub trait Extractor {
    /// Bytes currently buffered and not yet collected into a block.
    fn pos(&self) -> usize;
}

/// What happened to one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameOutcome {
    /// First frame after start or reset; nothing to diff against.
    Priming,
    /// Mean brightness too high (camera movement or light leak).
    Rejected { mean: f64 },
    /// Bits extracted and buffered.
    Accepted {
        bytes: usize,
        saturated_percent: f64,
    },
}

const MIX_STRIDE: usize = 7;

/// Differencing, LSB packing and spatial mixing into a bounded byte buffer.
///
/// Once `max_buffered` bytes are waiting, newly extracted bytes are
/// discarded until the collector takes some.
#[derive(Debug)]
pub struct FrameExtractor {
    differencer: FrameDifferencer,
    buffer: VecDeque<u8>,
    max_buffered: usize,
    discarded: u64,
    max_frame_mean: f64,
    saturation_level: u8,
}

impl FrameExtractor {
    pub fn new(max_frame_mean: f64, saturation_level: u8, max_buffered: usize) -> Self {
        Self {
            differencer: FrameDifferencer::new(),
            buffer: VecDeque::with_capacity(max_buffered),
            max_buffered,
            discarded: 0,
            max_frame_mean,
            saturation_level,
        }
    }

    /// Extracted bytes thrown away because the buffer was full.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Processes a frame, appending any extracted bytes to the buffer.
    pub fn process(&mut self, frame: &Frame) -> FrameOutcome {
        let mean = frame.mean();
        if mean > self.max_frame_mean {
            // A moved camera invalidates the reference frame too.
            self.differencer.reset();
            tracing::trace!(sequence = frame.sequence(), mean, "Frame rejected");
            return FrameOutcome::Rejected { mean };
        }

        let saturated_percent = frame.saturated_percent(self.saturation_level);
        let Some(diffs) = self.differencer.difference(frame) else {
            return FrameOutcome::Priming;
        };

        let level = self.saturation_level;
        let pixels = frame.pixels();
        let packed = pack_lsb(&diffs, |i| pixels[i] < level);
        let mixed = mix(&packed, MIX_STRIDE);

        let bytes = mixed.len();
        let room = self.max_buffered.saturating_sub(self.buffer.len());
        let kept = bytes.min(room);
        self.buffer.extend(&mixed[..kept]);
        if kept < bytes {
            self.discarded += (bytes - kept) as u64;
            tracing::trace!(
                sequence = frame.sequence(),
                dropped = bytes - kept,
                limit = self.max_buffered,
                "Extractor buffer full"
            );
        }
        FrameOutcome::Accepted {
            bytes,
            saturated_percent,
        }
    }

    /// Removes up to `n` bytes from the front of the buffer.
    pub fn take(&mut self, n: usize) -> Vec<u8> {
        let n = n.min(self.buffer.len());
        self.buffer.drain(..n).collect()
    }

    /// Clears the buffer and the differencing reference.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.differencer.reset();
    }
}

impl Extractor for FrameExtractor {
    fn pos(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(value: u8, seq: u64) -> Frame {
        Frame::new(vec![value; 64], 8, 8, seq)
    }

    #[test]
    fn test_extractor_needs_two_frames() {
        let mut extractor = FrameExtractor::new(200.0, 255, 1024);

        assert_eq!(extractor.process(&frame(100, 1)), FrameOutcome::Priming);
        assert!(matches!(
            extractor.process(&frame(101, 2)),
            FrameOutcome::Accepted { bytes: 8, .. }
        ));
        assert_eq!(extractor.pos(), 8);
    }

    #[test]
    fn test_bright_frame_rejected_and_reprimes() {
        let mut extractor = FrameExtractor::new(200.0, 255, 1024);
        extractor.process(&frame(100, 1));

        assert!(matches!(
            extractor.process(&frame(230, 2)),
            FrameOutcome::Rejected { .. }
        ));
        assert_eq!(extractor.process(&frame(100, 3)), FrameOutcome::Priming);
        assert_eq!(extractor.pos(), 0);
    }

    #[test]
    fn test_take_drains_front() {
        let mut extractor = FrameExtractor::new(200.0, 255, 1024);
        extractor.process(&frame(10, 1));
        extractor.process(&frame(11, 2));

        let taken = extractor.take(5);
        assert_eq!(taken.len(), 5);
        assert_eq!(extractor.pos(), 3);
        assert_eq!(extractor.take(100).len(), 3);
        assert_eq!(extractor.pos(), 0);
    }

    #[test]
    fn test_saturated_pixels_reported() {
        let mut extractor = FrameExtractor::new(255.0, 250, 1024);
        extractor.process(&frame(100, 1));
        let outcome = extractor.process(&Frame::new(
            [vec![252u8; 16], vec![101u8; 48]].concat(),
            8,
            8,
            2,
        ));

        match outcome {
            FrameOutcome::Accepted {
                bytes,
                saturated_percent,
            } => {
                assert_eq!(bytes, 6);
                assert!((saturated_percent - 25.0).abs() < 1e-9);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_buffer_stops_at_limit() {
        let mut extractor = FrameExtractor::new(200.0, 255, 20);
        extractor.process(&frame(10, 1));
        for seq in 2..10 {
            extractor.process(&frame(10 + seq as u8, seq));
            assert!(extractor.pos() <= 20);
        }
        assert_eq!(extractor.pos(), 20);
        assert_eq!(extractor.discarded(), 8 * 8 - 20);

        // Space freed by a take is filled again from the next frame.
        assert_eq!(extractor.take(12).len(), 12);
        extractor.process(&frame(50, 10));
        assert_eq!(extractor.pos(), 16);
    }
}
