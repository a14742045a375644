//! Seed and reseed material for DRBGs.
//!
//! The [`Feeder`] draws conditioned bytes from its own queue, so a block
//! it hands to one engine is gone from the stream and can never reach a
//! second one. It also owns the reseed policy: a reseed is due after
//! `reseed_bytes` of output or `reseed_period` of wall-clock time,
//! whichever comes first.

mod managed;
mod timer;

pub use managed::ManagedDrbg;
pub use timer::ReseedTimer;

use crate::drbg::{DrbgEngine, DrbgError, DrbgStatus, SeedMaterial, SeedOrigin, MIN_RESEED_LEN};
use crate::queue::{EntropyQueue, QueueError};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use zeroize::Zeroize;

#[derive(Debug, Error)]
pub enum FeederError {
    #[error("entropy stream unavailable: {0}")]
    Stream(#[from] QueueError),

    #[error(transparent)]
    Drbg(#[from] DrbgError),

    #[error("operating system entropy unavailable: {0}")]
    OsEntropy(String),
}

/// When and how much to (re)seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReseedPolicy {
    /// DRBG output bytes after which a reseed is due.
    pub reseed_bytes: u64,
    /// Seconds after which a reseed is due.
    pub reseed_period_secs: u64,
    /// Conditioned bytes mixed in per reseed.
    pub reseed_material_bytes: usize,
    /// Conditioned bytes consumed before the first seed.
    pub boot_bytes: usize,
    pub material_timeout_ms: u64,
    pub boot_timeout_ms: u64,
}

impl Default for ReseedPolicy {
    fn default() -> Self {
        Self {
            reseed_bytes: 1_000_000,
            reseed_period_secs: 10,
            reseed_material_bytes: 64,
            boot_bytes: 65_536,
            material_timeout_ms: 2_000,
            boot_timeout_ms: 120_000,
        }
    }
}

impl ReseedPolicy {
    pub fn reseed_period(&self) -> Duration {
        Duration::from_secs(self.reseed_period_secs)
    }

    pub fn material_timeout(&self) -> Duration {
        Duration::from_millis(self.material_timeout_ms)
    }

    pub fn boot_timeout(&self) -> Duration {
        Duration::from_millis(self.boot_timeout_ms)
    }

    /// True when either threshold has been reached.
    pub fn is_due(&self, bytes_since_reseed: u64, age: Option<Duration>) -> bool {
        bytes_since_reseed >= self.reseed_bytes
            || age.map_or(false, |age| age >= self.reseed_period())
    }
}

pub struct Feeder {
    queue: Arc<EntropyQueue>,
    policy: ReseedPolicy,
    allow_insecure_fallback: bool,
    stream_bytes: AtomicU64,
    fallback_uses: AtomicU64,
}

impl Feeder {
    pub fn new(queue: Arc<EntropyQueue>, policy: ReseedPolicy) -> Self {
        Self {
            queue,
            policy,
            allow_insecure_fallback: false,
            stream_bytes: AtomicU64::new(0),
            fallback_uses: AtomicU64::new(0),
        }
    }

    /// Lets OS entropy stand in when the stream cannot deliver in time.
    pub fn with_insecure_fallback(mut self, allow: bool) -> Self {
        if allow {
            tracing::warn!("insecure OS entropy fallback enabled for DRBG seeding");
        }
        self.allow_insecure_fallback = allow;
        self
    }

    pub fn policy(&self) -> &ReseedPolicy {
        &self.policy
    }

    pub fn queue(&self) -> &Arc<EntropyQueue> {
        &self.queue
    }

    pub fn allows_insecure_fallback(&self) -> bool {
        self.allow_insecure_fallback
    }

    pub fn fallback_uses(&self) -> u64 {
        self.fallback_uses.load(Ordering::Relaxed)
    }

    /// Conditioned bytes handed out so far.
    pub fn stream_bytes(&self) -> u64 {
        self.stream_bytes.load(Ordering::Relaxed)
    }

    /// Draws `n` bytes of seed material, waiting up to the material timeout.
    pub fn seed_material(&self, n: usize) -> Result<SeedMaterial, FeederError> {
        self.draw(n, self.policy.material_timeout())
    }

    /// Seeds `engine` from `boot_bytes` of conditioned entropy. Until this
    /// succeeds the engine stays UNSEEDED.
    pub fn boot(&self, engine: &DrbgEngine) -> Result<(), FeederError> {
        let n = self.policy.boot_bytes.max(engine.algorithm().seed_len());
        tracing::info!(boot_bytes = n, algorithm = %engine.algorithm(), "collecting boot entropy");
        let material = self.draw(n, self.policy.boot_timeout())?;
        engine.seed(material)?;
        Ok(())
    }

    /// Mixes fresh material into `engine`.
    pub fn reseed(&self, engine: &DrbgEngine) -> Result<(), FeederError> {
        let material = self.seed_material(self.policy.reseed_material_bytes.max(MIN_RESEED_LEN))?;
        engine.reseed(material)?;
        Ok(())
    }

    pub fn reseed_due(&self, engine: &DrbgEngine) -> bool {
        self.policy
            .is_due(engine.bytes_since_reseed(), engine.last_reseed_age())
    }

    /// Reseeds if the policy says so. Returns whether it did.
    ///
    /// An engine busy generating still gets reseeded; the reseed waits for
    /// the output call in flight.
    pub fn reseed_if_due(&self, engine: &DrbgEngine) -> Result<bool, FeederError> {
        let serving = matches!(engine.status(), DrbgStatus::Seeded | DrbgStatus::Generating);
        if !serving || !self.reseed_due(engine) {
            return Ok(false);
        }
        self.reseed(engine)?;
        Ok(true)
    }

    fn draw(&self, n: usize, timeout: Duration) -> Result<SeedMaterial, FeederError> {
        match self.queue.pull_bytes(n, timeout) {
            Ok(bytes) => {
                self.stream_bytes.fetch_add(n as u64, Ordering::Relaxed);
                Ok(SeedMaterial::new(bytes, SeedOrigin::Stream))
            }
            Err(e) if self.allow_insecure_fallback => {
                let uses = self.fallback_uses.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    error = %e,
                    bytes = n,
                    uses,
                    "entropy stream short, seeding from OS entropy (insecure fallback)"
                );
                let mut bytes = vec![0u8; n];
                if let Err(e) = OsRng.try_fill_bytes(&mut bytes) {
                    bytes.zeroize();
                    return Err(FeederError::OsEntropy(e.to_string()));
                }
                Ok(SeedMaterial::new(bytes, SeedOrigin::OsFallback))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for Feeder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Feeder")
            .field("policy", &self.policy)
            .field("allow_insecure_fallback", &self.allow_insecure_fallback)
            .finish_non_exhaustive()
    }
}
