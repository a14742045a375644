//! Online checks on generated output.
//!
//! A DRBG runs every registered [`OutputCheck`] over each output buffer
//! before returning it; a failure forces the engine into its fault state.
//! The two checks here follow the continuous health tests of
//! NIST SP 800-90B (repetition count and adaptive proportion) applied to
//! byte symbols. Neither is enabled by default.

use thiserror::Error;

/// A failed online check.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{check} failed: {detail}")]
pub struct CheckFailure {
    pub check: &'static str,
    pub detail: String,
}

/// Pluggable check over generated output.
pub trait OutputCheck: Send {
    fn name(&self) -> &'static str;

    /// Inspects one output buffer. State carries over between calls.
    fn check(&mut self, output: &[u8]) -> Result<(), CheckFailure>;

    /// Clears carried-over state (called when the engine is reseeded from scratch).
    fn reset(&mut self) {}
}

/// Repetition count test.
///
/// Fails when the same byte value appears `cutoff` times in a row.
#[derive(Debug, Clone)]
pub struct RepetitionCountTest {
    cutoff: u32,
    last: Option<u8>,
    run: u32,
}

impl RepetitionCountTest {
    /// Creates a test with an explicit cutoff (at least 2).
    pub fn new(cutoff: u32) -> Self {
        Self {
            cutoff: cutoff.max(2),
            last: None,
            run: 0,
        }
    }

    /// Cutoff `1 + ceil(alpha_exp / min_entropy)` for a false-positive rate
    /// of `2^-alpha_exp` given `min_entropy` bits per byte.
    pub fn for_entropy(min_entropy: f64, alpha_exp: u32) -> Self {
        let h = min_entropy.clamp(0.01, 8.0);
        Self::new(1 + (alpha_exp as f64 / h).ceil() as u32)
    }

    pub fn cutoff(&self) -> u32 {
        self.cutoff
    }
}

impl Default for RepetitionCountTest {
    fn default() -> Self {
        Self::for_entropy(8.0, 40)
    }
}

impl OutputCheck for RepetitionCountTest {
    fn name(&self) -> &'static str {
        "repetition-count"
    }

    fn check(&mut self, output: &[u8]) -> Result<(), CheckFailure> {
        for &byte in output {
            if self.last == Some(byte) {
                self.run += 1;
                if self.run >= self.cutoff {
                    return Err(CheckFailure {
                        check: self.name(),
                        detail: format!("byte {:#04x} repeated {} times", byte, self.run),
                    });
                }
            } else {
                self.last = Some(byte);
                self.run = 1;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.last = None;
        self.run = 0;
    }
}

/// Adaptive proportion test.
///
/// Takes the first byte of each window as reference and fails when it
/// occurs `cutoff` or more times within the window.
#[derive(Debug, Clone)]
pub struct AdaptiveProportionTest {
    window: usize,
    cutoff: usize,
    reference: Option<u8>,
    seen: usize,
    count: usize,
}

impl AdaptiveProportionTest {
    pub fn new(window: usize, cutoff: usize) -> Self {
        Self {
            window: window.max(2),
            cutoff: cutoff.max(2),
            reference: None,
            seen: 0,
            count: 0,
        }
    }

    /// Derives the cutoff from a binomial tail bound: the smallest `c`
    /// with `P(Bin(window - 1, 2^-min_entropy) >= c - 1) <= 2^-alpha_exp`.
    pub fn for_entropy(window: usize, min_entropy: f64, alpha_exp: u32) -> Self {
        let window = window.max(2);
        let p = 2f64.powf(-min_entropy.clamp(0.01, 8.0));
        let alpha = 2f64.powi(-(alpha_exp as i32));
        let trials = window - 1;

        let mut cutoff = window;
        for k in 0..=trials {
            if binomial_upper_tail(trials, p, k) <= alpha {
                cutoff = k + 1;
                break;
            }
        }
        Self::new(window, cutoff)
    }

    pub fn cutoff(&self) -> usize {
        self.cutoff
    }

    pub fn window(&self) -> usize {
        self.window
    }
}

impl Default for AdaptiveProportionTest {
    fn default() -> Self {
        Self::for_entropy(512, 8.0, 40)
    }
}

impl OutputCheck for AdaptiveProportionTest {
    fn name(&self) -> &'static str {
        "adaptive-proportion"
    }

    fn check(&mut self, output: &[u8]) -> Result<(), CheckFailure> {
        for &byte in output {
            match self.reference {
                None => {
                    self.reference = Some(byte);
                    self.seen = 1;
                    self.count = 1;
                }
                Some(reference) => {
                    self.seen += 1;
                    if byte == reference {
                        self.count += 1;
                        if self.count >= self.cutoff {
                            return Err(CheckFailure {
                                check: self.name(),
                                detail: format!(
                                    "byte {:#04x} seen {} times in a {}-byte window",
                                    reference, self.count, self.window
                                ),
                            });
                        }
                    }
                    if self.seen >= self.window {
                        self.reference = None;
                    }
                }
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.reference = None;
        self.seen = 0;
        self.count = 0;
    }
}

/// `P(X >= k)` for `X ~ Bin(n, p)`, summed in log space.
fn binomial_upper_tail(n: usize, p: f64, k: usize) -> f64 {
    if k == 0 {
        return 1.0;
    }
    let (ln_p, ln_q) = (p.ln(), (1.0 - p).ln());
    let mut ln_choose = (0..k).map(|i| ((n - i) as f64).ln() - ((i + 1) as f64).ln()).sum::<f64>();
    let mut total = 0.0;
    for i in k..=n {
        total += (ln_choose + i as f64 * ln_p + (n - i) as f64 * ln_q).exp();
        if i < n {
            ln_choose += ((n - i) as f64).ln() - ((i + 1) as f64).ln();
        }
    }
    total.min(1.0)
}
