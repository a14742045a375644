//! Prometheus metrics for the entropy service.
//!
//! The registry is always available; the HTTP exporter needs the
//! `metrics` feature.
//!
//! # Metrics Exposed
//!
//! - `aleamaris_health_status` - 0 OK, 1 DEGRADED, 2 FAULT
//! - `aleamaris_queue_depth`, `aleamaris_queue_dropped_total`
//! - `aleamaris_frames_total`, `aleamaris_blocks_total`,
//!   `aleamaris_source_failures_total`, `aleamaris_rejected_frames_total`
//! - `aleamaris_drbg_seed_total`, `aleamaris_drbg_reseed_total`,
//!   `aleamaris_drbg_bytes_since_reseed`, `aleamaris_drbg_bytes_total`,
//!   `aleamaris_drbg_last_reseed_age_seconds`
//! - `aleamaris_os_fallback_total`, `aleamaris_sampler_rejections_total`
//!
//! # Example
//!
//! ```no_run
//! use aleamaris::metrics::{MetricsRegistry, MetricsSnapshot};
//! use aleamaris::{AleaConfig, EntropyService};
//!
//! let service = EntropyService::start(AleaConfig::default()).expect("service");
//! let registry = MetricsRegistry::new().expect("registry");
//! registry.update(&MetricsSnapshot::from_service(&service.stats(), &service.health()));
//! println!("{}", registry.encode().expect("encode"));
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, ServerError, API_KEY_HEADER};
