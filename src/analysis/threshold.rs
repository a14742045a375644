//! Quality thresholds for raw samples.

use super::statistics::SampleStatistics;
use serde::{Deserialize, Serialize};

/// Limits a raw sample must stay within to count as healthy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QualityThresholds {
    /// Maximum absolute bit bias.
    pub max_bit_bias: f64,
    /// Minimum byte variance.
    pub min_variance: f64,
    /// Maximum absolute lag-1 autocorrelation.
    pub max_autocorrelation: f64,
    /// Minimum Shannon entropy in bits per byte.
    pub min_shannon_entropy: f64,
}

impl Default for QualityThresholds {
    // Frame features (gray levels, edges, diffs) are far from uniform, so
    // the defaults only reject flat or frozen input.
    fn default() -> Self {
        Self {
            max_bit_bias: 0.35,
            min_variance: 1.0,
            max_autocorrelation: 0.999,
            min_shannon_entropy: 1.0,
        }
    }
}

impl QualityThresholds {
    /// Tighter limits for already-whitened input.
    pub fn strict() -> Self {
        Self {
            max_bit_bias: 0.05,
            min_variance: 500.0,
            max_autocorrelation: 0.3,
            min_shannon_entropy: 7.0,
        }
    }

    pub fn check(&self, stats: &SampleStatistics) -> Result<(), ThresholdViolation> {
        if stats.bit_bias.abs() > self.max_bit_bias {
            return Err(ThresholdViolation::BitBias {
                observed: stats.bit_bias,
                threshold: self.max_bit_bias,
            });
        }
        if stats.variance < self.min_variance {
            return Err(ThresholdViolation::LowVariance {
                observed: stats.variance,
                threshold: self.min_variance,
            });
        }
        if stats.autocorrelation.abs() > self.max_autocorrelation {
            return Err(ThresholdViolation::HighAutocorrelation {
                observed: stats.autocorrelation,
                threshold: self.max_autocorrelation,
            });
        }
        if stats.shannon_entropy < self.min_shannon_entropy {
            return Err(ThresholdViolation::LowShannonEntropy {
                observed: stats.shannon_entropy,
                threshold: self.min_shannon_entropy,
            });
        }
        Ok(())
    }
}

/// Which limit a sample broke.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ThresholdViolation {
    #[error("bit bias {observed:.4} exceeds threshold {threshold:.4}")]
    BitBias { observed: f64, threshold: f64 },

    #[error("variance {observed:.2} below threshold {threshold:.2}")]
    LowVariance { observed: f64, threshold: f64 },

    #[error("autocorrelation {observed:.4} exceeds threshold {threshold:.4}")]
    HighAutocorrelation { observed: f64, threshold: f64 },

    #[error("shannon entropy {observed:.3} bits/byte below threshold {threshold:.3}")]
    LowShannonEntropy { observed: f64, threshold: f64 },
}
