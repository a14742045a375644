//! Composition root.
//!
//! [`EntropyService`] wires one generator, two queues (raw bytes and DRBG
//! feed), one feeder and one DRBG together and exposes the operations a
//! front-end needs. Nothing here is global: each service owns its own
//! pipeline, so tests can run several side by side.

use crate::analysis::{AdaptiveProportionTest, RepetitionCountTest};
use crate::capture::{FrameSource, RawFileSource, SourceError, SyntheticSource};
use crate::conditioning::Conditioner;
use crate::config::{AleaConfig, DrawSourceKind, SourceConfig};
use crate::drbg::{DrbgEngine, DrbgError, DrbgSnapshot, DrbgStatus, SeedMaterial, SeedOrigin};
use crate::error::{Error, Result};
use crate::feeder::{Feeder, ManagedDrbg, ReseedPolicy, ReseedTimer};
use crate::generator::{Generator, GeneratorHandle, GeneratorState, ShutdownSignal, SourceReport, SourceStatus};
use crate::health::{HealthReport, HealthStatus};
use crate::queue::{EnqueueError, EntropyQueue, QueueError, QueueStats};
use crate::sampler::{DrawSource, RawStream, RejectionSampler};
use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Counters behind the stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStats {
    pub drbg: DrbgSnapshot,
    pub reseed_policy: ReseedPolicy,
    pub raw_queue: QueueStats,
    pub feeder_queue: QueueStats,
    pub source: SourceReport,
    pub allow_insecure_fallback: bool,
    pub fallback_uses: u64,
    pub feeder_stream_bytes: u64,
    pub sampler_draws: u64,
    pub sampler_rejections: u64,
}

/// Outcome of [`EntropyService::ingest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Bytes handed in.
    pub received: usize,
    /// Conditioned blocks queued.
    pub blocks: usize,
    /// Bytes not turned into a queued block.
    pub dropped: usize,
    /// Conditioned bytes now readable from the raw queue.
    pub available: usize,
}

pub struct EntropyService {
    config: AleaConfig,
    raw_queue: Arc<EntropyQueue>,
    conditioner: Conditioner,
    feeder: Arc<Feeder>,
    engine: Arc<DrbgEngine>,
    managed: ManagedDrbg,
    sampler: RejectionSampler<DrawSource>,
    source_status: Arc<SourceStatus>,
    shutdown: ShutdownSignal,
    generator: Mutex<Option<GeneratorHandle>>,
    timer: Mutex<Option<ReseedTimer>>,
}

impl EntropyService {
    /// Opens the configured frame source and starts the service.
    pub fn start(config: AleaConfig) -> Result<Self> {
        let source = open_source(&config.source)?;
        Self::start_with_source(config, source)
    }

    /// Starts the pipeline on `source` and blocks until the DRBG has
    /// consumed its boot entropy.
    pub fn start_with_source<S: FrameSource + 'static>(config: AleaConfig, source: S) -> Result<Self> {
        config.validate()?;
        let conditioner = Conditioner::new(config.conditioning)?;

        let raw_queue = Arc::new(EntropyQueue::from_config(&config.queue));
        // Under `block` the generator stalls once neither queue has room.
        let feeder_queue = Arc::new(EntropyQueue::from_config(&config.queue));

        let shutdown = ShutdownSignal::new();
        let generator = Generator::new(
            source,
            config.extraction.clone(),
            conditioner.clone(),
            config.generator.clone(),
            vec![Arc::clone(&raw_queue), Arc::clone(&feeder_queue)],
        )
        .with_shutdown(shutdown.clone());
        let source_status = generator.status();
        let handle = generator.spawn()?;

        let feeder = Arc::new(
            Feeder::new(feeder_queue, config.reseed)
                .with_insecure_fallback(config.security.allow_insecure_fallback),
        );
        let engine = Arc::new(DrbgEngine::new(config.drbg));
        if config.security.output_checks {
            engine.add_check(Box::new(RepetitionCountTest::default()));
            engine.add_check(Box::new(AdaptiveProportionTest::default()));
        }

        // Dropping the handle on failure stops the generator again.
        feeder.boot(&engine)?;
        let timer = ReseedTimer::spawn(Arc::clone(&feeder), vec![Arc::clone(&engine)], shutdown.clone())?;

        let managed = ManagedDrbg::new(Arc::clone(&engine), Arc::clone(&feeder));
        let draw_source = match config.sampler.source {
            DrawSourceKind::Drbg => DrawSource::Drbg(managed.clone()),
            DrawSourceKind::Raw => DrawSource::Raw(RawStream::new(
                Arc::clone(&raw_queue),
                config.queue.dequeue_timeout(),
            )),
        };

        info!(
            conditioner = %config.conditioning.algorithm,
            drbg = %config.drbg.algorithm,
            draws_from = ?config.sampler.source,
            "entropy service started"
        );

        Ok(Self {
            raw_queue,
            conditioner,
            feeder,
            engine,
            managed,
            sampler: RejectionSampler::new(draw_source),
            source_status,
            shutdown,
            generator: Mutex::new(Some(handle)),
            timer: Mutex::new(Some(timer)),
            config,
        })
    }

    pub fn config(&self) -> &AleaConfig {
        &self.config
    }

    /// `count` conditioned bytes straight from the stream.
    pub fn pull_bytes(&self, count: usize) -> Result<Vec<u8>> {
        check_limit("raw byte count", count, self.config.limits.max_raw_bytes)?;
        Ok(self
            .raw_queue
            .pull_bytes(count, self.config.queue.dequeue_timeout())?)
    }

    /// `count` bytes of DRBG output.
    pub fn drbg_bytes(&self, count: usize) -> Result<Vec<u8>> {
        check_limit("DRBG byte count", count, self.config.limits.max_drbg_bytes)?;
        Ok(self.managed.generate(count)?)
    }

    pub fn draw_uniform(&self, low: i64, high: i64) -> Result<i64> {
        Ok(self.sampler.uniform_int(low, high)?)
    }

    pub fn draw_many(&self, low: i64, high: i64, count: usize) -> Result<Vec<i64>> {
        check_limit("draw count", count, self.config.limits.max_draws)?;
        Ok(self.sampler.uniform_many(low, high, count)?)
    }

    pub fn draw_dice(&self, sides: u32) -> Result<i64> {
        Ok(self.sampler.dice(sides)?)
    }

    pub fn roulette(&self) -> Result<i64> {
        Ok(self.sampler.roulette()?)
    }

    pub fn health(&self) -> HealthReport {
        let queue = self.raw_queue.stats();
        HealthReport::assess(
            self.source_status.report(),
            self.engine.status(),
            self.engine.last_reseed_age().map(|age| age.as_secs_f64()),
            queue.depth,
            self.feeder.fallback_uses(),
        )
    }

    /// Health report that fails when the service is not serving. A faulted
    /// DRBG is reported as such even when the generator has failed too.
    pub fn check_health(&self) -> Result<HealthReport> {
        let report = self.health();
        if report.status != HealthStatus::Fault {
            return Ok(report);
        }
        if report.drbg_status == DrbgStatus::Fault {
            let reason = self
                .engine
                .snapshot()
                .fault
                .unwrap_or_else(|| "unknown".to_string());
            return Err(DrbgError::EngineFaulted(reason).into());
        }
        Err(Error::GeneratorFailed(report.reasons.join("; ")))
    }

    /// Conditions externally supplied noise into the raw queue.
    ///
    /// `data` is cut into chunks of the conditioner's minimum input size and
    /// each chunk becomes one block. A trailing chunk below the minimum and
    /// chunks that find the queue full are dropped, never waited on.
    /// Callers are expected to have passed [`authorize`](Self::authorize).
    pub fn ingest(&self, data: &[u8]) -> Result<IngestReport> {
        check_limit("ingest size", data.len(), self.config.limits.max_ingest_bytes)?;
        let chunk = self.conditioner.config().min_input_bytes.max(1);

        let mut blocks = 0;
        let mut dropped = data.len() % chunk;
        for input in data.chunks_exact(chunk) {
            let block = self.conditioner.condition_bytes(input)?;
            match self.raw_queue.enqueue(block, Duration::ZERO) {
                Ok(_) => blocks += 1,
                Err(EnqueueError::Full(_)) => dropped += input.len(),
                Err(EnqueueError::Closed(_)) => return Err(QueueError::Closed.into()),
            }
        }

        let report = IngestReport {
            received: data.len(),
            blocks,
            dropped,
            available: self.raw_queue.available_bytes(),
        };
        debug!(received = report.received, blocks, dropped, "ingested external noise");
        Ok(report)
    }

    /// Administrative reseed.
    ///
    /// With `material` the caller's bytes are mixed in (at least the reseed
    /// minimum); without, fresh bytes are drawn from the stream. A faulted
    /// engine is re-instantiated instead, which needs a full seed.
    pub fn force_reseed(&self, material: Option<Vec<u8>>) -> Result<()> {
        let faulted = self.engine.status() == DrbgStatus::Fault;
        let material = match material {
            Some(bytes) => SeedMaterial::new(bytes, SeedOrigin::External),
            None if faulted => self
                .feeder
                .seed_material(self.engine.algorithm().seed_len().max(self.config.reseed.reseed_material_bytes))?,
            None => {
                self.feeder.reseed(&self.engine)?;
                info!("forced reseed from stream");
                return Ok(());
            }
        };

        let origin = material.origin();
        if faulted {
            self.engine.seed(material)?;
        } else {
            self.engine.reseed(material)?;
        }
        info!(%origin, recovered = faulted, "forced reseed");
        Ok(())
    }

    pub fn stats(&self) -> ServiceStats {
        ServiceStats {
            drbg: self.engine.snapshot(),
            reseed_policy: *self.feeder.policy(),
            raw_queue: self.raw_queue.stats(),
            feeder_queue: self.feeder.queue().stats(),
            source: self.source_status.report(),
            allow_insecure_fallback: self.feeder.allows_insecure_fallback(),
            fallback_uses: self.feeder.fallback_uses(),
            feeder_stream_bytes: self.feeder.stream_bytes(),
            sampler_draws: self.sampler.draws(),
            sampler_rejections: self.sampler.rejections(),
        }
    }

    /// Checks a presented API key. Without a configured key every caller
    /// is accepted.
    pub fn authorize(&self, presented: Option<&str>) -> bool {
        match (&self.config.security.api_key, presented) {
            (None, _) => true,
            // blake3::Hash compares in constant time.
            (Some(expected), Some(given)) => {
                blake3::hash(expected.as_bytes()) == blake3::hash(given.as_bytes())
            }
            (Some(_), None) => false,
        }
    }

    /// Fails fast when the generator has given up.
    pub fn ensure_running(&self) -> Result<()> {
        let report = self.source_status.report();
        if report.state == GeneratorState::Failed {
            return Err(Error::GeneratorFailed(
                report.last_error.unwrap_or_else(|| "unknown".to_string()),
            ));
        }
        Ok(())
    }

    pub fn engine(&self) -> &Arc<DrbgEngine> {
        &self.engine
    }

    pub fn shutdown_signal(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Stops the generator and the reseed timer. Blocks already queued
    /// stay readable.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
        if let Some(mut timer) = self.timer.lock().unwrap_or_else(PoisonError::into_inner).take() {
            timer.stop();
        }
        if let Some(mut handle) = self
            .generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.stop();
            info!("entropy service stopped");
        }
    }
}

impl Drop for EntropyService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn check_limit(what: &str, count: usize, max: usize) -> Result<()> {
    if count > max {
        return Err(Error::InvalidArgument(format!(
            "{} {} exceeds the limit of {}",
            what, count, max
        )));
    }
    Ok(())
}

/// Picks the frame source described by `config`.
pub fn open_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    if let Some(path) = &config.video {
        return Ok(Box::new(RawFileSource::open(path, config.width, config.height)?));
    }
    if let Some(index) = config.camera {
        return Err(SourceError::Unavailable(format!(
            "camera {} requested but device capture is not built in; pipe frames through a raw video file",
            index
        ))
        .into());
    }
    warn!(
        seed = config.synthetic_seed,
        "no frame source configured, using synthetic frames (NOT physically sourced)"
    );
    Ok(Box::new(SyntheticSource::new(
        config.width,
        config.height,
        config.synthetic_seed,
    )))
}
