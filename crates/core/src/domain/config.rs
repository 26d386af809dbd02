//! Engine configuration
//!
//! This module provides:
//! - `EngineConfig`, the single coherent parameter snapshot the engine runs on
//! - Parameter bounds and clamping (invalid values never reach coefficient math)
//! - `ParameterChange`, the setter-style entry point for a host parameter binding
//! - TOML loading and saving for the command line host

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

use crate::domain::filter_bank::MAX_ORDER;

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while loading or saving configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Parameter constraints
///
/// Every field is clamped to these ranges before it is used, which keeps the
/// coefficient derivation away from divisions by zero and NaN results.
pub mod params {
    /// Attack/Release time ranges in milliseconds
    pub const TIME_MS_MIN: f32 = 0.1;
    pub const TIME_MS_MAX: f32 = 5000.0;

    /// Bandpass quality factor range
    pub const Q_MIN: f32 = 0.1;
    pub const Q_MAX: f32 = 24.0;

    /// Largest peak gain of one band's cascade (dB), limits Q at high orders
    pub const CASCADE_GAIN_DB_MAX: f32 = 60.0;

    /// Output gain range in dB, the minimum mutes the output
    pub const GAIN_DB_MIN: f32 = -60.0;
    pub const GAIN_DB_MAX: f32 = 24.0;

    /// Supported sample rates (Hz)
    pub const SAMPLE_RATE_MIN: f32 = 8000.0;
    pub const SAMPLE_RATE_MAX: f32 = 384000.0;

    /// Lowest allowed band center (Hz)
    pub const FREQ_MIN: f32 = 10.0;
    /// Highest allowed band center as a fraction of the sample rate
    pub const FREQ_MAX_RATIO: f32 = 0.45;

    /// Largest number of bands an engine can be built with
    pub const MAX_BANDS: usize = 64;
    pub const DEFAULT_NUM_BANDS: usize = 12;
}

/// Complete set of engine parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Envelope attack time constant (ms)
    pub attack_ms: f32,
    /// Envelope release time constant (ms)
    pub release_ms: f32,
    /// Bandpass quality factor, also the per-stage peak gain
    pub quality_factor: f32,
    /// Number of cascaded stages per band
    pub order: usize,
    /// Gain applied to the summed bands (dB)
    pub output_gain_db: f32,
    pub sample_rate: f32,
    /// Center frequency of the lowest band (Hz)
    pub min_center_hz: f32,
    /// Center frequency of the highest band (Hz)
    pub max_center_hz: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            attack_ms: 20.0,
            release_ms: 100.0,
            quality_factor: std::f32::consts::FRAC_1_SQRT_2,
            order: 2,
            output_gain_db: 0.0,
            sample_rate: 48000.0,
            min_center_hz: 80.0,
            max_center_hz: 7800.0,
        }
    }
}

fn clamp_field(name: &str, value: f32, default: f32, min: f32, max: f32) -> f32 {
    let sane = if value.is_finite() {
        value
    } else {
        warn!(field = name, value, "Non-finite parameter replaced by default");
        default
    };
    let clamped = sane.clamp(min, max);
    if clamped != sane {
        warn!(field = name, value = sane, clamped, "Parameter out of range, clamped");
    }
    clamped
}

/// Highest quality factor whose `order`-stage cascade stays within
/// [`params::CASCADE_GAIN_DB_MAX`]
pub fn max_quality_factor(order: usize) -> f32 {
    let limit = 10.0_f32.powf(params::CASCADE_GAIN_DB_MAX / (20.0 * order.max(1) as f32));
    limit.min(params::Q_MAX)
}

impl EngineConfig {
    /// Copy of this configuration with every field forced into its valid range
    ///
    /// Non-finite values fall back to the default first. An empty frequency
    /// range (low >= high after clamping) falls back to the default range.
    /// The quality factor is further limited by the order, see
    /// [`max_quality_factor`].
    #[must_use]
    pub fn validated(&self) -> Self {
        let defaults = Self::default();

        let sample_rate = clamp_field(
            "sample_rate",
            self.sample_rate,
            defaults.sample_rate,
            params::SAMPLE_RATE_MIN,
            params::SAMPLE_RATE_MAX,
        );
        let freq_max = sample_rate * params::FREQ_MAX_RATIO;

        let order = self.order.clamp(1, MAX_ORDER);
        if order != self.order {
            warn!(field = "order", value = self.order, clamped = order, "Parameter out of range, clamped");
        }

        // Each stage peaks at Q, so the cascade peaks at Q^order
        let mut quality_factor = clamp_field(
            "quality_factor",
            self.quality_factor,
            defaults.quality_factor,
            params::Q_MIN,
            params::Q_MAX,
        );
        let q_limit = max_quality_factor(order);
        if quality_factor > q_limit {
            warn!(
                quality_factor,
                order,
                clamped = q_limit,
                "Cascade gain too high, quality factor clamped"
            );
            quality_factor = q_limit;
        }

        let mut min_center_hz = clamp_field(
            "min_center_hz",
            self.min_center_hz,
            defaults.min_center_hz,
            params::FREQ_MIN,
            freq_max,
        );
        let mut max_center_hz = clamp_field(
            "max_center_hz",
            self.max_center_hz,
            defaults.max_center_hz,
            params::FREQ_MIN,
            freq_max,
        );
        if min_center_hz >= max_center_hz {
            warn!(
                min_center_hz,
                max_center_hz, "Empty frequency range, using the default range"
            );
            min_center_hz = defaults.min_center_hz.clamp(params::FREQ_MIN, freq_max);
            max_center_hz = defaults.max_center_hz.clamp(params::FREQ_MIN, freq_max);
        }

        Self {
            attack_ms: clamp_field(
                "attack_ms",
                self.attack_ms,
                defaults.attack_ms,
                params::TIME_MS_MIN,
                params::TIME_MS_MAX,
            ),
            release_ms: clamp_field(
                "release_ms",
                self.release_ms,
                defaults.release_ms,
                params::TIME_MS_MIN,
                params::TIME_MS_MAX,
            ),
            quality_factor,
            order,
            output_gain_db: clamp_field(
                "output_gain_db",
                self.output_gain_db,
                defaults.output_gain_db,
                params::GAIN_DB_MIN,
                params::GAIN_DB_MAX,
            ),
            sample_rate,
            min_center_hz,
            max_center_hz,
        }
    }

    /// Linear factor for `output_gain_db`
    pub fn output_gain(&self) -> f32 {
        if self.output_gain_db <= params::GAIN_DB_MIN {
            0.0
        } else {
            10.0_f32.powf(self.output_gain_db / 20.0)
        }
    }

    /// Whether switching from `self` to `other` needs new filter state
    pub fn requires_rebuild(&self, other: &Self) -> bool {
        self.order != other.order
            || self.sample_rate != other.sample_rate
            || self.min_center_hz != other.min_center_hz
            || self.max_center_hz != other.max_center_hz
    }

    /// Apply one parameter change in place (unvalidated)
    pub fn apply(&mut self, change: ParameterChange) {
        match change {
            ParameterChange::Attack(ms) => self.attack_ms = ms,
            ParameterChange::Release(ms) => self.release_ms = ms,
            ParameterChange::QualityFactor(q) => self.quality_factor = q,
            ParameterChange::Order(order) => self.order = order,
            ParameterChange::OutputGain(db) => self.output_gain_db = db,
            ParameterChange::SampleRate(hz) => self.sample_rate = hz,
            ParameterChange::FrequencyRange { low_hz, high_hz } => {
                self.min_center_hz = low_hz;
                self.max_center_hz = high_hz;
            }
        }
    }

    /// Parse a configuration from TOML text; missing fields take defaults
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }
}

/// One engine field update, as delivered by a host parameter binding
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterChange {
    Attack(f32),
    Release(f32),
    QualityFactor(f32),
    Order(usize),
    OutputGain(f32),
    SampleRate(f32),
    FrequencyRange { low_hz: f32, high_hz: f32 },
}

/// Configuration file for the command line host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocoderConfig {
    /// Number of bands, fixed for the lifetime of an engine
    #[serde(default = "default_num_bands")]
    pub num_bands: usize,

    /// Processing block size in frames
    #[serde(default = "default_block_size")]
    pub block_size: usize,

    #[serde(default)]
    pub engine: EngineConfig,
}

fn default_num_bands() -> usize {
    params::DEFAULT_NUM_BANDS
}

fn default_block_size() -> usize {
    512
}

impl Default for VocoderConfig {
    fn default() -> Self {
        Self {
            num_bands: default_num_bands(),
            block_size: default_block_size(),
            engine: EngineConfig::default(),
        }
    }
}

impl VocoderConfig {
    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config = Self::from_toml_str(&contents)?;

        debug!(?config, "Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    /// Parse and structurally check a configuration
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self = toml::from_str(contents)?;

        if config.num_bands == 0 || config.num_bands > params::MAX_BANDS {
            return Err(ConfigError::Invalid(format!(
                "num_bands must be between 1 and {}, got {}",
                params::MAX_BANDS,
                config.num_bands
            )));
        }
        if config.block_size == 0 {
            return Err(ConfigError::Invalid("block_size must be positive".to_string()));
        }

        Ok(config)
    }
}
