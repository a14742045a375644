use super::{Feeder, FeederError};
use crate::drbg::{DrbgEngine, DrbgError};
use std::sync::Arc;

/// A DRBG paired with the feeder that keeps it reseeded.
///
/// Every request checks the reseed policy first, and requests larger than
/// the reseed threshold are split so the engine never runs past it by more
/// than one piece.
#[derive(Debug, Clone)]
pub struct ManagedDrbg {
    engine: Arc<DrbgEngine>,
    feeder: Arc<Feeder>,
}

impl ManagedDrbg {
    pub fn new(engine: Arc<DrbgEngine>, feeder: Arc<Feeder>) -> Self {
        Self { engine, feeder }
    }

    pub fn engine(&self) -> &Arc<DrbgEngine> {
        &self.engine
    }

    pub fn feeder(&self) -> &Arc<Feeder> {
        &self.feeder
    }

    pub fn fill(&self, dest: &mut [u8]) -> Result<(), FeederError> {
        let piece = self
            .feeder
            .policy()
            .reseed_bytes
            .min(self.engine.max_bytes_per_seed())
            .max(1) as usize;

        for chunk in dest.chunks_mut(piece) {
            self.feeder.reseed_if_due(&self.engine)?;
            match self.engine.fill(chunk) {
                // Another caller used up the allowance between the check and
                // the fill.
                Err(DrbgError::ReseedRequired { .. }) => {
                    self.feeder.reseed(&self.engine)?;
                    self.engine.fill(chunk)?;
                }
                other => other?,
            }
        }
        Ok(())
    }

    pub fn generate(&self, n_bytes: usize) -> Result<Vec<u8>, FeederError> {
        let mut out = vec![0u8; n_bytes];
        self.fill(&mut out)?;
        Ok(out)
    }
}
