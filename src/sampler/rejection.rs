use super::{ByteSource, SamplerError};
use std::sync::atomic::{AtomicU64, Ordering};

/// Pockets on a single-zero roulette wheel (0..=36).
pub const ROULETTE_POCKETS: i64 = 37;

/// Bias-free bounded integers.
///
/// For a range of size `m`, candidates are `ceil(log2 m)` bits wide,
/// drawn from the fewest whole bytes that hold them. Candidates `>= m`
/// are rejected and redrawn, so each value is hit with probability
/// exactly `1/m`. Fewer than two draws are needed on average.
pub struct RejectionSampler<S> {
    source: S,
    draws: AtomicU64,
    rejections: AtomicU64,
}

impl<S: ByteSource> RejectionSampler<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            draws: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Uniform integer in `[low, high]`, both inclusive.
    pub fn uniform_int(&self, low: i64, high: i64) -> Result<i64, SamplerError> {
        if low > high {
            return Err(SamplerError::InvalidRange { low, high });
        }
        // Largest offset from `low`; covers the full i64 range without overflow.
        let span = (high as i128 - low as i128) as u64;
        if span == 0 {
            return Ok(low);
        }

        let bits = 64 - span.leading_zeros();
        let width = bits.div_ceil(8) as usize;
        let mask = if bits == 64 { u64::MAX } else { (1u64 << bits) - 1 };

        let mut buf = [0u8; 8];
        loop {
            self.source.fill(&mut buf[..width])?;
            self.draws.fetch_add(1, Ordering::Relaxed);
            let candidate = u64::from_le_bytes(buf) & mask;
            if candidate <= span {
                return Ok((low as i128 + candidate as i128) as i64);
            }
            self.rejections.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Roll of an `n`-sided die, `1..=sides`.
    pub fn dice(&self, sides: u32) -> Result<i64, SamplerError> {
        if sides == 0 {
            return Err(SamplerError::InvalidSides);
        }
        self.uniform_int(1, i64::from(sides))
    }

    /// Single-zero roulette pocket, `0..=36`.
    pub fn roulette(&self) -> Result<i64, SamplerError> {
        self.uniform_int(0, ROULETTE_POCKETS - 1)
    }

    pub fn uniform_many(&self, low: i64, high: i64, count: usize) -> Result<Vec<i64>, SamplerError> {
        if low > high {
            return Err(SamplerError::InvalidRange { low, high });
        }
        (0..count).map(|_| self.uniform_int(low, high)).collect()
    }

    pub fn bytes(&self, n: usize) -> Result<Vec<u8>, SamplerError> {
        let mut out = vec![0u8; n];
        self.source.fill(&mut out)?;
        Ok(out)
    }

    /// Candidate draws so far, accepted or not.
    pub fn draws(&self) -> u64 {
        self.draws.load(Ordering::Relaxed)
    }

    pub fn rejections(&self) -> u64 {
        self.rejections.load(Ordering::Relaxed)
    }
}

impl<S: std::fmt::Debug> std::fmt::Debug for RejectionSampler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RejectionSampler")
            .field("source", &self.source)
            .field("draws", &self.draws.load(Ordering::Relaxed))
            .field("rejections", &self.rejections.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand_chacha::ChaCha20Rng;
    use rand_core::{RngCore, SeedableRng};
    use std::sync::Mutex;

    struct Seeded(Mutex<ChaCha20Rng>);

    impl Seeded {
        fn new(seed: u64) -> Self {
            Self(Mutex::new(ChaCha20Rng::seed_from_u64(seed)))
        }
    }

    impl ByteSource for Seeded {
        fn fill(&self, dest: &mut [u8]) -> Result<(), SamplerError> {
            self.0.lock().unwrap().fill_bytes(dest);
            Ok(())
        }
    }

    /// Emits 0, 1, ..., 255, 0, 1, ...
    struct Cycling(Mutex<u8>);

    impl ByteSource for Cycling {
        fn fill(&self, dest: &mut [u8]) -> Result<(), SamplerError> {
            let mut next = self.0.lock().unwrap();
            for b in dest {
                *b = *next;
                *next = next.wrapping_add(1);
            }
            Ok(())
        }
    }

    fn chi_square(counts: &[u64]) -> f64 {
        let total: u64 = counts.iter().sum();
        let expected = total as f64 / counts.len() as f64;
        counts
            .iter()
            .map(|&c| (c as f64 - expected).powi(2) / expected)
            .sum()
    }

    #[test]
    fn test_dice_frequencies_uniform() {
        let sampler = RejectionSampler::new(Seeded::new(1));
        let mut counts = [0u64; 6];
        for _ in 0..60_000 {
            let roll = sampler.dice(6).unwrap();
            assert!((1..=6).contains(&roll));
            counts[(roll - 1) as usize] += 1;
        }
        for &c in &counts {
            assert!((9_400..=10_600).contains(&c), "{:?}", counts);
        }
        // df = 5; 20.5 is the 0.999 quantile.
        assert!(chi_square(&counts) < 20.5, "{:?}", counts);
    }

    #[test]
    fn test_no_modulo_bias_on_decimal_range() {
        let sampler = RejectionSampler::new(Seeded::new(2));
        let mut counts = [0u64; 10];
        for _ in 0..100_000 {
            counts[sampler.uniform_int(0, 9).unwrap() as usize] += 1;
        }
        // df = 9; 27.9 is the 0.999 quantile.
        assert!(chi_square(&counts) < 27.9, "{:?}", counts);
    }

    #[test]
    fn test_exact_uniformity_over_full_byte_cycle() {
        // 0..=9 needs 4-bit candidates: each 256-byte cycle yields every
        // value exactly 16 times and rejects 96 candidates.
        let sampler = RejectionSampler::new(Cycling(Mutex::new(0)));
        let mut counts = [0u64; 10];
        for _ in 0..1_600 {
            counts[sampler.uniform_int(0, 9).unwrap() as usize] += 1;
        }
        assert!(counts.iter().all(|&c| c == 160), "{:?}", counts);
        assert_eq!(sampler.rejections(), 10 * 96 - 6);
    }

    #[test]
    fn test_degenerate_and_invalid_ranges() {
        let sampler = RejectionSampler::new(Seeded::new(3));
        assert_eq!(sampler.uniform_int(42, 42).unwrap(), 42);
        assert_eq!(sampler.draws(), 0);
        assert!(matches!(
            sampler.uniform_int(5, 4),
            Err(SamplerError::InvalidRange { low: 5, high: 4 })
        ));
        assert!(matches!(sampler.dice(0), Err(SamplerError::InvalidSides)));
    }

    #[test]
    fn test_full_i64_range() {
        let sampler = RejectionSampler::new(Seeded::new(4));
        for _ in 0..100 {
            sampler.uniform_int(i64::MIN, i64::MAX).unwrap();
        }
        assert_eq!(sampler.rejections(), 0);
    }

    #[test]
    fn test_power_of_two_range_never_rejects() {
        let sampler = RejectionSampler::new(Seeded::new(5));
        for _ in 0..1_000 {
            assert!((0..256).contains(&sampler.uniform_int(0, 255).unwrap()));
        }
        assert_eq!(sampler.rejections(), 0);
    }

    #[test]
    fn test_roulette_and_many() {
        let sampler = RejectionSampler::new(Seeded::new(6));
        let mut seen = [false; 37];
        for v in sampler.uniform_many(0, 36, 5_000).unwrap() {
            seen[v as usize] = true;
        }
        assert!(seen.iter().all(|&s| s));
        assert!((0..=36).contains(&sampler.roulette().unwrap()));
        assert_eq!(sampler.bytes(33).unwrap().len(), 33);
    }

    proptest! {
        #[test]
        fn prop_draw_stays_in_range(seed in any::<u64>(), low in any::<i64>(), width in 0u64..1_000_000) {
            let high = low.saturating_add(width as i64);
            let sampler = RejectionSampler::new(Seeded::new(seed));
            let v = sampler.uniform_int(low, high).unwrap();
            prop_assert!(v >= low && v <= high);
        }
    }
}
