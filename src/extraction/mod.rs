//! Feature extraction.
//!
//! This module turns one frame into a [`RawSample`]: a byte string made of
//! the reduced grayscale image, its Laplacian edge magnitudes and,
//! optionally, the absolute difference with the previous frame. The
//! result is not uniform and makes no entropy claim; conditioning takes
//! care of that.

mod edges;
mod grayscale;
mod sample;
mod spatial;
mod temporal;

pub use grayscale::GrayImage;
pub use sample::RawSample;
pub use spatial::SpatialMixer;
pub use temporal::TemporalDifferencer;

use crate::capture::Frame;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while extracting features from a frame.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("frame {sequence} is malformed: {pixels} bytes for {width}x{height}")]
    InvalidFrame {
        sequence: u64,
        width: u32,
        height: u32,
        pixels: usize,
    },
}

/// Feature extraction settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Side of the square the frame is reduced to (0 keeps native size).
    pub resize: u32,
    /// Append the temporal difference with the previous frame.
    pub use_diff: bool,
    /// Low-order bits kept from each gray value (1..=8).
    pub lsb_bits: u8,
    /// XOR fold stride applied to the concatenated features (0 disables).
    pub mix_stride: usize,
    /// Process one of every `stride` frames.
    pub stride: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            resize: 64,
            use_diff: true,
            lsb_bits: 8,
            mix_stride: 0,
            stride: 1,
        }
    }
}

/// Converts frames into raw samples.
///
/// Holds the previous reduced frame for temporal differencing, so one
/// extractor belongs to one frame stream.
pub struct FeatureExtractor {
    config: ExtractorConfig,
    temporal: TemporalDifferencer,
    mixer: Option<SpatialMixer>,
}

impl FeatureExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        let mixer = (config.mix_stride > 0).then(|| SpatialMixer::with_stride(config.mix_stride));
        Self {
            config,
            temporal: TemporalDifferencer::new(),
            mixer,
        }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extracts a raw sample from `frame`.
    ///
    /// The first frame after construction or [`reset`](Self::reset) has no
    /// temporal component even when differencing is enabled.
    pub fn extract(&mut self, frame: &Frame) -> Result<RawSample, ExtractionError> {
        if !frame.is_valid() {
            return Err(ExtractionError::InvalidFrame {
                sequence: frame.sequence(),
                width: frame.width(),
                height: frame.height(),
                pixels: frame.pixels().len(),
            });
        }

        let gray = grayscale::reduce(frame, self.config.resize, self.config.lsb_bits);
        let edges = edges::laplacian_magnitude(&gray);

        let mut features = Vec::with_capacity(gray.data().len() * 3);
        features.extend_from_slice(gray.data());
        features.extend_from_slice(&edges);

        if self.config.use_diff {
            if let Some(diff) = self.temporal.difference(&gray) {
                features.extend_from_slice(&diff);
            }
        }

        if let Some(mixer) = &self.mixer {
            mixer.mix_in_place(&mut features);
        }

        tracing::trace!(
            frame = frame.sequence(),
            bytes = features.len(),
            "Extracted features"
        );

        Ok(RawSample::from_bytes(features, frame.sequence()))
    }

    /// Drops the temporal reference (e.g. after a source rewind).
    pub fn reset(&mut self) {
        self.temporal.reset();
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config(use_diff: bool) -> ExtractorConfig {
        ExtractorConfig {
            resize: 8,
            use_diff,
            ..Default::default()
        }
    }

    #[test]
    fn test_first_frame_has_no_diff() {
        let mut extractor = FeatureExtractor::new(small_config(true));

        let first = extractor.extract(&Frame::filled(100, 32, 32, 1)).unwrap();
        assert_eq!(first.len(), 64 * 2);

        let second = extractor.extract(&Frame::filled(150, 32, 32, 2)).unwrap();
        assert_eq!(second.len(), 64 * 3);
        // Difference section is |150 - 100|
        assert!(second.data()[128..].iter().all(|&v| v == 50));
    }

    #[test]
    fn test_length_follows_resolution_not_content() {
        let mut extractor = FeatureExtractor::new(small_config(false));
        let flat = extractor.extract(&Frame::filled(0, 16, 16, 1)).unwrap();
        let noisy = extractor
            .extract(&Frame::new((0..=255).collect(), 16, 16, 2))
            .unwrap();
        assert_eq!(flat.len(), noisy.len());
    }

    #[test]
    fn test_invalid_frame_rejected() {
        let mut extractor = FeatureExtractor::default();
        let result = extractor.extract(&Frame::new(vec![0u8; 10], 8, 8, 4));
        assert!(matches!(
            result,
            Err(ExtractionError::InvalidFrame { sequence: 4, .. })
        ));
    }

    #[test]
    fn test_reset_drops_temporal_reference() {
        let mut extractor = FeatureExtractor::new(small_config(true));
        extractor.extract(&Frame::filled(1, 8, 8, 1)).unwrap();
        extractor.reset();
        let sample = extractor.extract(&Frame::filled(2, 8, 8, 2)).unwrap();
        assert_eq!(sample.len(), 64 * 2);
    }

    #[test]
    fn test_mixing_changes_bytes_not_length() {
        let plain = FeatureExtractor::new(small_config(false))
            .extract(&Frame::new((0..64).collect(), 8, 8, 1))
            .unwrap();
        let mixed = FeatureExtractor::new(ExtractorConfig {
            mix_stride: 7,
            ..small_config(false)
        })
        .extract(&Frame::new((0..64).collect(), 8, 8, 1))
        .unwrap();

        assert_eq!(plain.len(), mixed.len());
        assert_ne!(plain.data(), mixed.data());
    }
}
