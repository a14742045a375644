//! Descriptive statistics over raw samples.
//!
//! Sanity checks that catch a dead or saturated source. Passing them says
//! nothing about min-entropy.

use crate::extraction::RawSample;

/// Statistics of one raw sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleStatistics {
    /// Fraction of set bits minus 0.5.
    pub bit_bias: f64,
    /// Population variance of byte values.
    pub variance: f64,
    /// Lag-1 autocorrelation of byte values.
    pub autocorrelation: f64,
    /// Shannon entropy of the byte histogram, in bits per byte.
    pub shannon_entropy: f64,
    pub sample_size: usize,
}

impl SampleStatistics {
    pub fn analyze(sample: &RawSample) -> Self {
        let data = sample.data();
        let mean = mean(data);
        let sum_sq = data
            .iter()
            .map(|&b| (b as f64 - mean).powi(2))
            .sum::<f64>();

        Self {
            bit_bias: sample.bit_bias(),
            variance: if data.is_empty() {
                0.0
            } else {
                sum_sq / data.len() as f64
            },
            autocorrelation: autocorrelation(data, mean, sum_sq),
            shannon_entropy: shannon_entropy(data),
            sample_size: data.len(),
        }
    }
}

fn mean(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().map(|&b| b as f64).sum::<f64>() / data.len() as f64
}

fn autocorrelation(data: &[u8], mean: f64, sum_sq: f64) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    if sum_sq == 0.0 {
        // Constant input is perfectly predictable.
        return 1.0;
    }
    let covariance: f64 = data
        .windows(2)
        .map(|w| (w[0] as f64 - mean) * (w[1] as f64 - mean))
        .sum();
    covariance / sum_sq
}

/// Shannon entropy of the byte histogram in bits per byte (0..=8).
pub fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mut counts = [0u64; 256];
    for &b in data {
        counts[b as usize] += 1;
    }
    let n = data.len() as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / n;
            -p * p.log2()
        })
        .sum()
}
