//! Service configuration.
//!
//! Loaded from an optional TOML file, then overlaid with `ALEAMARIS_*`
//! environment variables. Every section has defaults, so an empty file
//! (or none at all) is a valid configuration.

use crate::conditioning::{ConditionerConfig, ConditioningAlgorithm};
use crate::drbg::{DrbgAlgorithm, DrbgConfig};
use crate::extraction::ExtractorConfig;
use crate::feeder::ReseedPolicy;
use crate::generator::GeneratorConfig;
use crate::queue::QueueConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ENV_PREFIX: &str = "ALEAMARIS_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value {value:?} for {var}")]
    Env { var: String, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Where frames come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Raw 8-bit grayscale frame file. Takes precedence over `camera`.
    pub video: Option<PathBuf>,
    /// Camera index. Device capture lives outside the crate; recorded so a
    /// front-end can pick the right device.
    pub camera: Option<u32>,
    pub width: u32,
    pub height: u32,
    /// Seed for the synthetic source used when no video is configured.
    pub synthetic_seed: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            video: None,
            camera: None,
            width: 640,
            height: 480,
            synthetic_seed: 0,
        }
    }
}

/// Which stream feeds numeric draws.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrawSourceKind {
    #[default]
    Drbg,
    Raw,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    pub source: DrawSourceKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Key the front-end requires for administrative calls.
    pub api_key: Option<String>,
    /// Seed DRBGs from OS entropy when the stream runs dry.
    pub allow_insecure_fallback: bool,
    /// Run repetition-count and adaptive-proportion checks on DRBG output.
    pub output_checks: bool,
}

/// Per-request ceilings. Requests above them are refused, not truncated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Raw conditioned bytes per request.
    pub max_raw_bytes: usize,
    /// DRBG bytes per request.
    pub max_drbg_bytes: usize,
    /// Integers per batch draw.
    pub max_draws: usize,
    /// Bytes per ingest call.
    pub max_ingest_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_raw_bytes: 4096,
            max_drbg_bytes: 1 << 20,
            max_draws: 100_000,
            max_ingest_bytes: 1 << 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Listen address of the exporter (`metrics` feature).
    pub listen: String,
    pub refresh_ms: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:9090".to_string(),
            refresh_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AleaConfig {
    pub source: SourceConfig,
    pub extraction: ExtractorConfig,
    pub conditioning: ConditionerConfig,
    pub queue: QueueConfig,
    pub generator: GeneratorConfig,
    pub reseed: ReseedPolicy,
    pub drbg: DrbgConfig,
    pub sampler: SamplerConfig,
    pub security: SecurityConfig,
    pub limits: LimitsConfig,
    pub metrics: MetricsConfig,
}

impl AleaConfig {
    /// Reads `path` if given, applies the process environment and validates.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Overlays `ALEAMARIS_*` variables. Unknown variables are ignored.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (var, value) in vars {
            let Some(key) = var.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let invalid = || ConfigError::Env {
                var: var.clone(),
                value: value.clone(),
            };
            match key {
                "VIDEO" => self.source.video = Some(PathBuf::from(&value)),
                "CAM" => self.source.camera = Some(value.trim().parse().map_err(|_| invalid())?),
                "API_KEY" => self.security.api_key = Some(value.clone()).filter(|k| !k.is_empty()),
                "ALLOW_URANDOM" => self.security.allow_insecure_fallback = parse_flag(&value),
                "RESEED_PERIOD" => {
                    self.reseed.reseed_period_secs = value.trim().parse().map_err(|_| invalid())?
                }
                "RESEED_BYTES" => {
                    self.reseed.reseed_bytes = value.trim().parse().map_err(|_| invalid())?
                }
                "BOOT_BYTES" => {
                    self.reseed.boot_bytes = value.trim().parse().map_err(|_| invalid())?
                }
                "RAW_CAP" => {
                    let bytes: usize = value.trim().parse().map_err(|_| invalid())?;
                    let block = self.conditioning.block_size.max(1);
                    self.queue.capacity = bytes.div_ceil(block).max(1);
                }
                "CONDITIONER" => {
                    self.conditioning.algorithm =
                        value.parse::<ConditioningAlgorithm>().map_err(|_| invalid())?
                }
                "DRBG" => {
                    self.drbg.algorithm = value.parse::<DrbgAlgorithm>().map_err(|_| invalid())?
                }
                other => tracing::debug!(var = other, "ignoring unknown environment setting"),
            }
        }
        Ok(())
    }

    /// Rejects settings the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.width == 0 || self.source.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "frame dimensions {}x{} must be non-zero",
                self.source.width, self.source.height
            )));
        }
        if !(1..=8).contains(&self.extraction.lsb_bits) {
            return Err(ConfigError::Invalid(format!(
                "extraction.lsb_bits {} must be within 1..=8",
                self.extraction.lsb_bits
            )));
        }
        self.conditioning
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.queue.capacity == 0 {
            return Err(ConfigError::Invalid("queue.capacity must be at least 1".into()));
        }
        if self.reseed.reseed_bytes == 0 || self.reseed.reseed_period_secs == 0 {
            return Err(ConfigError::Invalid(
                "reseed thresholds must be non-zero".into(),
            ));
        }
        if self.reseed.boot_bytes < self.drbg.algorithm.seed_len() {
            return Err(ConfigError::Invalid(format!(
                "reseed.boot_bytes {} is below the {} seed length of {}",
                self.reseed.boot_bytes,
                self.drbg.algorithm,
                self.drbg.algorithm.seed_len()
            )));
        }
        if self.drbg.max_bytes_per_seed == 0 {
            return Err(ConfigError::Invalid("drbg.max_bytes_per_seed must be non-zero".into()));
        }
        let limits = &self.limits;
        if limits.max_raw_bytes == 0
            || limits.max_drbg_bytes == 0
            || limits.max_draws == 0
            || limits.max_ingest_bytes == 0
        {
            return Err(ConfigError::Invalid("request limits must be non-zero".into()));
        }
        let backoff = &self.generator.backoff;
        if backoff.base_ms > backoff.max_ms || backoff.max_failures == 0 {
            return Err(ConfigError::Invalid(format!(
                "generator backoff {}ms..{}ms with {} failures is not usable",
                backoff.base_ms, backoff.max_ms, backoff.max_failures
            )));
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
