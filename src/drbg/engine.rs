//! DRBG state machine.
//!
//! ```text
//! UNSEEDED --seed--> SEEDED <--> {GENERATING, RESEEDING}
//!                      |
//!                  check fails / poisoned lock
//!                      v
//!                    FAULT --seed--> SEEDED
//! ```
//!
//! All transitions happen under one mutex, so concurrent `generate` calls
//! on the same engine are serialized. The current status is mirrored in
//! an atomic for lock-free health reads.

use super::chacha::ChaChaCore;
use super::keyed::KeyedHashCore;
use super::{DrbgAlgorithm, DrbgConfig, DrbgError, SeedMaterial, MIN_RESEED_LEN};
use crate::analysis::OutputCheck;
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use zeroize::Zeroize;

/// Externally visible engine status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum DrbgStatus {
    Unseeded = 0,
    Seeded = 1,
    Generating = 2,
    Reseeding = 3,
    Fault = 4,
}

impl DrbgStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Unseeded,
            1 => Self::Seeded,
            2 => Self::Generating,
            3 => Self::Reseeding,
            _ => Self::Fault,
        }
    }
}

enum Core {
    ChaCha(ChaChaCore),
    Keyed(KeyedHashCore),
}

impl Core {
    fn instantiate(algorithm: DrbgAlgorithm, seed: &[u8]) -> Self {
        match algorithm {
            DrbgAlgorithm::ChaCha20 => Self::ChaCha(ChaChaCore::instantiate(seed)),
            DrbgAlgorithm::KeyedHash => Self::Keyed(KeyedHashCore::instantiate(seed)),
        }
    }

    fn reseed(&mut self, entropy: &[u8]) {
        match self {
            Self::ChaCha(core) => core.reseed(entropy),
            Self::Keyed(core) => core.reseed(entropy),
        }
    }

    fn generate(&mut self, dest: &mut [u8]) {
        match self {
            Self::ChaCha(core) => core.generate(dest),
            Self::Keyed(core) => core.generate(dest),
        }
    }
}

/// Internal state. Only ever touched with the engine lock held.
struct DrbgState {
    core: Option<Core>,
    bytes_since_reseed: u64,
    last_reseed: Option<Instant>,
    seed_count: u64,
    reseed_count: u64,
    total_generated: u64,
    fault: Option<String>,
    checks: Vec<Box<dyn OutputCheck>>,
}

/// Point-in-time view of an engine, for stats and health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct DrbgSnapshot {
    pub algorithm: DrbgAlgorithm,
    pub status: DrbgStatus,
    pub bytes_since_reseed: u64,
    pub max_bytes_per_seed: u64,
    pub seed_count: u64,
    pub reseed_count: u64,
    pub total_generated: u64,
    pub last_reseed_age_secs: Option<f64>,
    pub fault: Option<String>,
}

pub struct DrbgEngine {
    config: DrbgConfig,
    status: AtomicU8,
    state: Mutex<DrbgState>,
}

impl DrbgEngine {
    /// Creates an engine in the UNSEEDED state.
    pub fn new(config: DrbgConfig) -> Self {
        Self {
            config,
            status: AtomicU8::new(DrbgStatus::Unseeded as u8),
            state: Mutex::new(DrbgState {
                core: None,
                bytes_since_reseed: 0,
                last_reseed: None,
                seed_count: 0,
                reseed_count: 0,
                total_generated: 0,
                fault: None,
                checks: Vec::new(),
            }),
        }
    }

    pub fn algorithm(&self) -> DrbgAlgorithm {
        self.config.algorithm
    }

    pub fn max_bytes_per_seed(&self) -> u64 {
        self.config.max_bytes_per_seed
    }

    pub fn status(&self) -> DrbgStatus {
        DrbgStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Registers an online check run over every output buffer.
    pub fn add_check(&self, check: Box<dyn OutputCheck>) {
        tracing::debug!(check = check.name(), "output check registered");
        self.lock().checks.push(check);
    }

    /// Instantiates fresh state from `material`, replacing any existing
    /// state. Also the only way out of FAULT.
    pub fn seed(&self, material: SeedMaterial) -> Result<(), DrbgError> {
        let need = self.config.algorithm.seed_len();
        if material.len() < need {
            return Err(DrbgError::InsufficientSeedMaterial {
                got: material.len(),
                need,
            });
        }

        let mut state = self.lock();
        let recovering = state.fault.take();
        state.core = Some(Core::instantiate(self.config.algorithm, material.as_bytes()));
        state.bytes_since_reseed = 0;
        state.last_reseed = Some(Instant::now());
        state.seed_count += 1;
        for check in state.checks.iter_mut() {
            check.reset();
        }
        self.set_status(DrbgStatus::Seeded);

        match recovering {
            Some(reason) => tracing::info!(
                algorithm = %self.config.algorithm,
                origin = %material.origin(),
                previous_fault = %reason,
                "DRBG recovered from fault"
            ),
            None => tracing::info!(
                algorithm = %self.config.algorithm,
                origin = %material.origin(),
                seed_bytes = material.len(),
                seed_count = state.seed_count,
                "DRBG seeded"
            ),
        }
        Ok(())
    }

    /// Mixes `material` into the current state and resets the
    /// since-reseed counters.
    pub fn reseed(&self, material: SeedMaterial) -> Result<(), DrbgError> {
        if material.len() < MIN_RESEED_LEN {
            return Err(DrbgError::InsufficientSeedMaterial {
                got: material.len(),
                need: MIN_RESEED_LEN,
            });
        }

        let mut state = self.lock();
        ready(&state)?;
        self.set_status(DrbgStatus::Reseeding);

        let state = &mut *state;
        if let Some(core) = state.core.as_mut() {
            core.reseed(material.as_bytes());
        }
        state.bytes_since_reseed = 0;
        state.last_reseed = Some(Instant::now());
        state.reseed_count += 1;
        self.set_status(DrbgStatus::Seeded);

        tracing::debug!(
            algorithm = %self.config.algorithm,
            origin = %material.origin(),
            reseed_count = state.reseed_count,
            "DRBG reseeded"
        );
        Ok(())
    }

    /// Fills `dest` with output.
    ///
    /// Fails with [`DrbgError::ReseedRequired`] if the request would take
    /// the engine past its per-seed limit. On a failed output check
    /// `dest` is wiped and the engine faults.
    pub fn fill(&self, dest: &mut [u8]) -> Result<(), DrbgError> {
        let mut state = self.lock();
        ready(&state)?;

        let requested = dest.len() as u64;
        let limit = self.config.max_bytes_per_seed;
        if state.bytes_since_reseed.saturating_add(requested) > limit {
            return Err(DrbgError::ReseedRequired {
                generated: state.bytes_since_reseed,
                limit,
            });
        }

        self.set_status(DrbgStatus::Generating);
        let state = &mut *state;
        if let Some(core) = state.core.as_mut() {
            core.generate(dest);
        }

        for check in state.checks.iter_mut() {
            if let Err(failure) = check.check(dest) {
                dest.zeroize();
                let reason = failure.to_string();
                tracing::error!(check = failure.check, reason = %reason, "DRBG output check failed");
                state.fault = Some(reason.clone());
                self.set_status(DrbgStatus::Fault);
                return Err(DrbgError::EngineFaulted(reason));
            }
        }

        state.bytes_since_reseed += requested;
        state.total_generated += requested;
        self.set_status(DrbgStatus::Seeded);
        Ok(())
    }

    pub fn generate(&self, n_bytes: usize) -> Result<Vec<u8>, DrbgError> {
        let mut out = vec![0u8; n_bytes];
        self.fill(&mut out)?;
        Ok(out)
    }

    /// Forces the engine into FAULT.
    pub fn force_fault(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut state = self.lock();
        tracing::error!(reason = %reason, "DRBG forced into fault");
        state.fault = Some(reason);
        self.set_status(DrbgStatus::Fault);
    }

    pub fn bytes_since_reseed(&self) -> u64 {
        self.lock().bytes_since_reseed
    }

    /// Time since the last seed or reseed; `None` while unseeded.
    pub fn last_reseed_age(&self) -> Option<Duration> {
        self.lock().last_reseed.map(|at| at.elapsed())
    }

    pub fn snapshot(&self) -> DrbgSnapshot {
        let state = self.lock();
        DrbgSnapshot {
            algorithm: self.config.algorithm,
            status: self.status(),
            bytes_since_reseed: state.bytes_since_reseed,
            max_bytes_per_seed: self.config.max_bytes_per_seed,
            seed_count: state.seed_count,
            reseed_count: state.reseed_count,
            total_generated: state.total_generated,
            last_reseed_age_secs: state.last_reseed.map(|at| at.elapsed().as_secs_f64()),
            fault: state.fault.clone(),
        }
    }

    fn set_status(&self, status: DrbgStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    /// A panic while the lock was held leaves the state suspect, so a
    /// poisoned lock faults the engine until it is seeded again.
    fn lock(&self) -> MutexGuard<'_, DrbgState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            self.state.clear_poison();
            let mut state = poisoned.into_inner();
            tracing::error!("DRBG state lock poisoned");
            state.fault = Some("state lock poisoned".to_string());
            self.set_status(DrbgStatus::Fault);
            state
        })
    }
}

fn ready(state: &DrbgState) -> Result<(), DrbgError> {
    if let Some(reason) = &state.fault {
        return Err(DrbgError::EngineFaulted(reason.clone()));
    }
    if state.core.is_none() {
        return Err(DrbgError::Unseeded);
    }
    Ok(())
}

impl std::fmt::Debug for DrbgEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrbgEngine")
            .field("algorithm", &self.config.algorithm)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
