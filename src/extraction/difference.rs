//! Temporal differencing between consecutive frames.
//!
//! Static structure (fixed-pattern noise, dead pixels, the scene itself)
//! cancels out; what remains is frame-to-frame sensor noise.

use crate::capture::Frame;

/// Holds the previous accepted frame and diffs the next one against it.
#[derive(Debug, Default)]
pub struct FrameDifferencer {
    previous: Option<Frame>,
}

impl FrameDifferencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absolute per-pixel difference with the previous frame.
    ///
    /// Returns `None` on the first frame, and whenever the frame dimensions
    /// change, since there is nothing compatible to compare against.
    pub fn difference(&mut self, current: &Frame) -> Option<Vec<u8>> {
        let result = self
            .previous
            .as_ref()
            .filter(|prev| prev.dimensions() == current.dimensions())
            .map(|prev| {
                current
                    .pixels()
                    .iter()
                    .zip(prev.pixels())
                    .map(|(&c, &p)| c.abs_diff(p))
                    .collect()
            });

        self.previous = Some(current.clone());
        result
    }

    /// Forgets the previous frame, e.g. after the camera moved.
    pub fn reset(&mut self) {
        self.previous = None;
    }

    pub fn is_primed(&self) -> bool {
        self.previous.is_some()
    }
}
