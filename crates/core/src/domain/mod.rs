//! Domain entities and signal processing

pub mod audio;
pub mod config;
pub mod denormal;
pub mod engine;
pub mod envelope;
pub mod filter;
pub mod filter_bank;
pub mod meter;

// Re-export specific items to avoid ambiguous glob imports
pub use audio::{ChannelLayout, Result, ShapeError, VocoderError, MAX_CHANNELS};
pub use config::{
    max_quality_factor, params, ConfigError, EngineConfig, ParameterChange, VocoderConfig,
};
pub use denormal::ScopedNoDenormals;
pub use engine::VocoderEngine;
pub use envelope::{time_to_coeff, EnvelopeDetector};
pub use filter::{BandpassCoeffs, BandpassFilter, FilterState};
pub use filter_bank::{center_frequency, Bank, FilterBank, MAX_ORDER};
pub use meter::EnvelopeMeter;
