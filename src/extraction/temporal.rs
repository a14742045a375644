//! Temporal difference between consecutive reduced frames.
//!
//! Static structure (fixed-pattern noise, a still background) cancels
//! out; only changes between frames remain.

use super::grayscale::GrayImage;

/// Keeps the previous reduced frame and diffs against it.
///
/// Owned by a single extractor; not shared across threads.
#[derive(Debug, Default)]
pub struct TemporalDifferencer {
    previous: Option<GrayImage>,
}

impl TemporalDifferencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absolute per-pixel difference with the previous image.
    ///
    /// Returns `None` on the first image or when the resolution changed.
    /// The current image always becomes the new reference.
    pub fn difference(&mut self, current: &GrayImage) -> Option<Vec<u8>> {
        let result = self
            .previous
            .as_ref()
            .filter(|prev| prev.data().len() == current.data().len())
            .map(|prev| {
                current
                    .data()
                    .iter()
                    .zip(prev.data())
                    .map(|(&c, &p)| c.abs_diff(p))
                    .collect()
            });

        self.previous = Some(current.clone());
        result
    }

    pub fn reset(&mut self) {
        self.previous = None;
    }

    /// Returns true once a reference image is held.
    pub fn is_primed(&self) -> bool {
        self.previous.is_some()
    }
}
