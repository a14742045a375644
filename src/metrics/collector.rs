//! Metrics collection and registry.

use crate::health::{HealthReport, HealthStatus};
use crate::service::ServiceStats;
use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Service state flattened for export.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub health: HealthStatus,
    pub queue_depth: usize,
    pub queue_dropped: u64,
    pub frames: u64,
    pub blocks: u64,
    pub source_failures: u64,
    pub rejected_frames: u64,
    pub seed_count: u64,
    pub reseed_count: u64,
    pub bytes_since_reseed: u64,
    pub drbg_bytes_total: u64,
    pub last_reseed_age_secs: Option<f64>,
    pub fallback_uses: u64,
    pub sampler_rejections: u64,
}

impl Default for MetricsSnapshot {
    fn default() -> Self {
        Self {
            health: HealthStatus::Ok,
            queue_depth: 0,
            queue_dropped: 0,
            frames: 0,
            blocks: 0,
            source_failures: 0,
            rejected_frames: 0,
            seed_count: 0,
            reseed_count: 0,
            bytes_since_reseed: 0,
            drbg_bytes_total: 0,
            last_reseed_age_secs: None,
            fallback_uses: 0,
            sampler_rejections: 0,
        }
    }
}

impl MetricsSnapshot {
    pub fn from_service(stats: &ServiceStats, health: &HealthReport) -> Self {
        Self {
            health: health.status,
            queue_depth: stats.raw_queue.depth,
            queue_dropped: stats.raw_queue.dropped + stats.feeder_queue.dropped,
            frames: stats.source.frames,
            blocks: stats.source.blocks,
            source_failures: stats.source.failures,
            rejected_frames: stats.source.rejected_frames,
            seed_count: stats.drbg.seed_count,
            reseed_count: stats.drbg.reseed_count,
            bytes_since_reseed: stats.drbg.bytes_since_reseed,
            drbg_bytes_total: stats.drbg.total_generated,
            last_reseed_age_secs: stats.drbg.last_reseed_age_secs,
            fallback_uses: stats.fallback_uses,
            sampler_rejections: stats.sampler_rejections,
        }
    }
}

/// Prometheus registry for the `aleamaris_*` metrics.
pub struct MetricsRegistry {
    registry: Registry,

    health_status: IntGauge,
    queue_depth: IntGauge,
    queue_dropped_total: IntCounter,

    frames_total: IntCounter,
    blocks_total: IntCounter,
    source_failures_total: IntCounter,
    rejected_frames_total: IntCounter,

    seed_total: IntCounter,
    reseed_total: IntCounter,
    bytes_since_reseed: IntGauge,
    drbg_bytes_total: IntCounter,
    last_reseed_age: Gauge,

    fallback_total: IntCounter,
    sampler_rejections_total: IntCounter,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let health_status = IntGauge::new(
            "aleamaris_health_status",
            "Overall health (0=OK, 1=DEGRADED, 2=FAULT)",
        )?;
        let queue_depth = IntGauge::new(
            "aleamaris_queue_depth",
            "Conditioned blocks waiting in the raw stream",
        )?;
        let queue_dropped_total = IntCounter::new(
            "aleamaris_queue_dropped_total",
            "Blocks discarded by queue overflow policies",
        )?;

        let frames_total = IntCounter::new("aleamaris_frames_total", "Frames pulled from the source")?;
        let blocks_total = IntCounter::new(
            "aleamaris_blocks_total",
            "Conditioned blocks published by the generator",
        )?;
        let source_failures_total = IntCounter::new(
            "aleamaris_source_failures_total",
            "Frame source errors observed by the generator",
        )?;
        let rejected_frames_total = IntCounter::new(
            "aleamaris_rejected_frames_total",
            "Malformed frames skipped",
        )?;

        let seed_total = IntCounter::new("aleamaris_drbg_seed_total", "Full DRBG instantiations")?;
        let reseed_total = IntCounter::new("aleamaris_drbg_reseed_total", "DRBG reseeds performed")?;
        let bytes_since_reseed = IntGauge::new(
            "aleamaris_drbg_bytes_since_reseed",
            "DRBG output since the last seed or reseed",
        )?;
        let drbg_bytes_total = IntCounter::new(
            "aleamaris_drbg_bytes_total",
            "DRBG output bytes since start",
        )?;
        let last_reseed_age = Gauge::new(
            "aleamaris_drbg_last_reseed_age_seconds",
            "Seconds since the last seed or reseed (-1 when never seeded)",
        )?;

        let fallback_total = IntCounter::new(
            "aleamaris_os_fallback_total",
            "Seed draws served from OS entropy",
        )?;
        let sampler_rejections_total = IntCounter::new(
            "aleamaris_sampler_rejections_total",
            "Candidates rejected by the bounded-integer sampler",
        )?;

        registry.register(Box::new(health_status.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(queue_dropped_total.clone()))?;
        registry.register(Box::new(frames_total.clone()))?;
        registry.register(Box::new(blocks_total.clone()))?;
        registry.register(Box::new(source_failures_total.clone()))?;
        registry.register(Box::new(rejected_frames_total.clone()))?;
        registry.register(Box::new(seed_total.clone()))?;
        registry.register(Box::new(reseed_total.clone()))?;
        registry.register(Box::new(bytes_since_reseed.clone()))?;
        registry.register(Box::new(drbg_bytes_total.clone()))?;
        registry.register(Box::new(last_reseed_age.clone()))?;
        registry.register(Box::new(fallback_total.clone()))?;
        registry.register(Box::new(sampler_rejections_total.clone()))?;

        Ok(Self {
            registry,
            health_status,
            queue_depth,
            queue_dropped_total,
            frames_total,
            blocks_total,
            source_failures_total,
            rejected_frames_total,
            seed_total,
            reseed_total,
            bytes_since_reseed,
            drbg_bytes_total,
            last_reseed_age,
            fallback_total,
            sampler_rejections_total,
        })
    }

    /// Updates all metrics from a snapshot of service state.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        self.health_status.set(snapshot.health.as_gauge());
        self.queue_depth.set(snapshot.queue_depth as i64);
        self.bytes_since_reseed.set(snapshot.bytes_since_reseed as i64);
        self.last_reseed_age
            .set(snapshot.last_reseed_age_secs.unwrap_or(-1.0));

        // Counters only move forward; feed them the difference.
        advance(&self.queue_dropped_total, snapshot.queue_dropped);
        advance(&self.frames_total, snapshot.frames);
        advance(&self.blocks_total, snapshot.blocks);
        advance(&self.source_failures_total, snapshot.source_failures);
        advance(&self.rejected_frames_total, snapshot.rejected_frames);
        advance(&self.seed_total, snapshot.seed_count);
        advance(&self.reseed_total, snapshot.reseed_count);
        advance(&self.drbg_bytes_total, snapshot.drbg_bytes_total);
        advance(&self.fallback_total, snapshot.fallback_uses);
        advance(&self.sampler_rejections_total, snapshot.sampler_rejections);
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn advance(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}
