use super::Feeder;
use crate::drbg::DrbgEngine;
use crate::generator::ShutdownSignal;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Background thread that reseeds engines on the policy period.
///
/// Complements the inline check in [`ManagedDrbg`](super::ManagedDrbg):
/// an idle engine still gets fresh entropy mixed in.
pub struct ReseedTimer {
    thread: Option<JoinHandle<()>>,
    shutdown: ShutdownSignal,
}

impl ReseedTimer {
    pub fn spawn(
        feeder: Arc<Feeder>,
        engines: Vec<Arc<DrbgEngine>>,
        shutdown: ShutdownSignal,
    ) -> io::Result<Self> {
        let period = feeder.policy().reseed_period().max(Duration::from_millis(10));
        let signal = shutdown.clone();
        let thread = thread::Builder::new()
            .name("aleamaris-reseed".to_string())
            .spawn(move || {
                tracing::debug!(period_ms = period.as_millis() as u64, "reseed timer started");
                while !signal.wait(period) {
                    for engine in &engines {
                        match feeder.reseed_if_due(engine) {
                            Ok(true) => tracing::debug!(algorithm = %engine.algorithm(), "periodic reseed"),
                            Ok(false) => {}
                            Err(e) => tracing::warn!(error = %e, "periodic reseed failed"),
                        }
                    }
                }
                tracing::debug!("reseed timer stopped");
            })?;
        Ok(Self {
            thread: Some(thread),
            shutdown,
        })
    }

    pub fn stop(&mut self) {
        self.shutdown.trigger();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("reseed timer thread panicked");
            }
        }
    }
}

impl Drop for ReseedTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::filled_queue;
    use super::super::ReseedPolicy;
    use super::*;
    use crate::drbg::DrbgConfig;
    use std::time::Instant;

    #[test]
    fn test_idle_engine_reseeded_on_period() {
        let policy = ReseedPolicy {
            reseed_bytes: u64::MAX,
            reseed_period_secs: 0,
            reseed_material_bytes: 32,
            boot_bytes: 64,
            material_timeout_ms: 0,
            boot_timeout_ms: 0,
        };
        let feeder = Arc::new(Feeder::new(filled_queue(8), policy));
        let engine = Arc::new(DrbgEngine::new(DrbgConfig::default()));
        feeder.boot(&engine).unwrap();

        let mut timer =
            ReseedTimer::spawn(Arc::clone(&feeder), vec![Arc::clone(&engine)], ShutdownSignal::new())
                .unwrap();
        let started = Instant::now();
        while engine.snapshot().reseed_count == 0 && started.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(5));
        }
        timer.stop();
        assert!(engine.snapshot().reseed_count >= 1);
    }
}
