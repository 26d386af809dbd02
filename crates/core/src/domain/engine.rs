//! Vocoder engine
//!
//! Orchestrates the per-sample signal path:
//!
//! ```text
//! sidechain ─ bandpass[b] ─ envelope[b] ─┐
//!                                        × ─ Σ bands ─ gain ─ main (in place)
//! main ────── bandpass[b] ───────────────┘
//! ```
//!
//! All state is allocated by `new` / `prepare`. `process_block` never
//! allocates, locks or logs; configuration changes take `&mut self`, so they
//! can only happen between blocks.

use crate::domain::audio::{ChannelLayout, Result, ShapeError, VocoderError};
use crate::domain::config::{params, EngineConfig, ParameterChange};
use crate::domain::denormal::ScopedNoDenormals;
use crate::domain::envelope::{time_to_coeff, EnvelopeDetector};
use crate::domain::filter_bank::{Bank, FilterBank};
use crate::domain::meter::EnvelopeMeter;
use tracing::{debug, info, instrument};

/// Multiband sidechain vocoder
#[derive(Debug)]
pub struct VocoderEngine {
    layout: ChannelLayout,
    num_bands: usize,
    // Always validated
    config: EngineConfig,
    output_gain: f32,
    max_block_size: usize,
    prepared: bool,
    // Quality factor changed, coefficients are rebuilt at the next block
    coeffs_dirty: bool,
    filters: FilterBank,
    envelopes: EnvelopeDetector,
    meter: EnvelopeMeter,
}

impl VocoderEngine {
    /// Create an engine for a fixed channel layout and band count
    pub fn new(layout: ChannelLayout, num_bands: usize) -> Result<Self> {
        if num_bands == 0 || num_bands > params::MAX_BANDS {
            return Err(VocoderError::InvalidLayout {
                bands: num_bands,
                max: params::MAX_BANDS,
            });
        }

        Ok(Self::with_layout(layout, num_bands))
    }

    fn with_layout(layout: ChannelLayout, num_bands: usize) -> Self {
        let channels = layout.count();
        let config = EngineConfig::default();

        Self {
            layout,
            num_bands,
            config,
            output_gain: config.output_gain(),
            max_block_size: 0,
            prepared: false,
            coeffs_dirty: false,
            filters: FilterBank::new(channels, num_bands),
            envelopes: EnvelopeDetector::new(channels, num_bands),
            meter: EnvelopeMeter::new(channels, num_bands),
        }
    }

    /// Configure the engine for playback and zero all state
    ///
    /// Must not overlap with `process_block`; the host stops processing while
    /// it prepares. Out-of-range fields are clamped.
    #[instrument(skip(self, config))]
    pub fn prepare(&mut self, config: EngineConfig, max_block_size: usize) {
        self.config = config.validated();
        self.output_gain = self.config.output_gain();
        self.max_block_size = max_block_size;
        self.update_envelope_coeffs();
        self.rebuild();
        self.prepared = true;

        info!(
            channels = self.layout.count(),
            bands = self.num_bands,
            max_block_size,
            sample_rate = self.config.sample_rate,
            order = self.config.order,
            "Vocoder engine prepared"
        );
    }

    fn rebuild(&mut self) {
        let c = &self.config;
        self.filters.prepare(
            c.sample_rate,
            c.min_center_hz,
            c.max_center_hz,
            c.order,
            c.quality_factor,
        );
        self.envelopes.reset();
        self.meter.clear();
        self.coeffs_dirty = false;
    }

    fn update_envelope_coeffs(&mut self) {
        let attack = time_to_coeff(self.config.attack_ms, self.config.sample_rate);
        let release = time_to_coeff(self.config.release_ms, self.config.sample_rate);
        self.envelopes.configure(attack, release);
    }

    /// Replace the whole configuration between two blocks
    ///
    /// Only order, sample rate and frequency range changes rebuild (and zero)
    /// the filter state; everything else is applied without reallocation.
    pub fn set_config(&mut self, config: EngineConfig) {
        let old = self.config;
        let new = config.validated();
        if old == new {
            return;
        }
        self.config = new;
        self.output_gain = new.output_gain();

        if !self.prepared {
            // `prepare` derives everything from the stored config
            return;
        }

        if old.attack_ms != new.attack_ms
            || old.release_ms != new.release_ms
            || old.sample_rate != new.sample_rate
        {
            self.update_envelope_coeffs();
        }

        if old.requires_rebuild(&new) {
            debug!(
                order = new.order,
                sample_rate = new.sample_rate,
                "Rebuilding filter banks"
            );
            self.rebuild();
        } else if old.quality_factor != new.quality_factor {
            self.coeffs_dirty = true;
        }

        debug!(?new, "Engine configuration updated");
    }

    /// Apply a single parameter change
    pub fn apply(&mut self, change: ParameterChange) {
        let mut config = self.config;
        config.apply(change);
        self.set_config(config);
    }

    pub fn set_attack_ms(&mut self, attack_ms: f32) {
        self.apply(ParameterChange::Attack(attack_ms));
    }

    pub fn set_release_ms(&mut self, release_ms: f32) {
        self.apply(ParameterChange::Release(release_ms));
    }

    pub fn set_quality_factor(&mut self, q: f32) {
        self.apply(ParameterChange::QualityFactor(q));
    }

    pub fn set_order(&mut self, order: usize) {
        self.apply(ParameterChange::Order(order));
    }

    pub fn set_output_gain_db(&mut self, gain_db: f32) {
        self.apply(ParameterChange::OutputGain(gain_db));
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.apply(ParameterChange::SampleRate(sample_rate));
    }

    pub fn set_frequency_range(&mut self, low_hz: f32, high_hz: f32) {
        self.apply(ParameterChange::FrequencyRange { low_hz, high_hz });
    }

    /// Process one block of planar audio
    ///
    /// `main` is overwritten with the vocoded signal, `sidechain` is only read.
    /// Both must have the same channel count (at most the prepared layout) and
    /// every channel the same length (at most `max_block_size`). A violated
    /// precondition is reported before any sample is touched.
    pub fn process_block(&mut self, main: &mut [&mut [f32]], sidechain: &[&[f32]]) -> Result<()> {
        let num_samples = self.check_planar(main, sidechain)?;
        if num_samples == 0 {
            return Ok(());
        }

        let _no_denormals = ScopedNoDenormals::new();
        self.refresh_coefficients();

        for (channel, (out, side)) in main.iter_mut().zip(sidechain).enumerate() {
            for (sample, &side_sample) in out.iter_mut().zip(side.iter()) {
                *sample = self.process_frame(channel, *sample, side_sample);
            }
            self.publish(channel);
        }

        Ok(())
    }

    /// Process one block of interleaved audio laid out as the engine's layout
    pub fn process_interleaved(&mut self, main: &mut [f32], sidechain: &[f32]) -> Result<()> {
        if !self.prepared {
            return Err(VocoderError::NotPrepared);
        }

        let channels = self.layout.count();
        if main.len() != sidechain.len() {
            return Err(ShapeError::LengthMismatch {
                main: main.len(),
                sidechain: sidechain.len(),
            }
            .into());
        }
        if main.len() % channels != 0 {
            return Err(ShapeError::PartialFrame {
                len: main.len(),
                channels,
            }
            .into());
        }
        let frames = main.len() / channels;
        if frames > self.max_block_size {
            return Err(ShapeError::BlockTooLarge {
                got: frames,
                max: self.max_block_size,
            }
            .into());
        }
        if frames == 0 {
            return Ok(());
        }

        let _no_denormals = ScopedNoDenormals::new();
        self.refresh_coefficients();

        for channel in 0..channels {
            let outs = main.iter_mut().skip(channel).step_by(channels);
            let sides = sidechain.iter().skip(channel).step_by(channels);
            for (sample, &side_sample) in outs.zip(sides) {
                *sample = self.process_frame(channel, *sample, side_sample);
            }
            self.publish(channel);
        }

        Ok(())
    }

    fn check_planar(&self, main: &[&mut [f32]], sidechain: &[&[f32]]) -> Result<usize> {
        if !self.prepared {
            return Err(VocoderError::NotPrepared);
        }
        if main.len() != sidechain.len() {
            return Err(ShapeError::ChannelMismatch {
                main: main.len(),
                sidechain: sidechain.len(),
            }
            .into());
        }
        if main.len() > self.layout.count() {
            return Err(ShapeError::TooManyChannels {
                got: main.len(),
                max: self.layout.count(),
            }
            .into());
        }

        let expected = main.first().map_or(0, |channel| channel.len());
        let lengths = main
            .iter()
            .map(|channel| channel.len())
            .chain(sidechain.iter().map(|channel| channel.len()));
        for (index, got) in lengths.enumerate() {
            if got != expected {
                return Err(ShapeError::RaggedChannel {
                    channel: index % main.len(),
                    got,
                    expected,
                }
                .into());
            }
        }

        if expected > self.max_block_size {
            return Err(ShapeError::BlockTooLarge {
                got: expected,
                max: self.max_block_size,
            }
            .into());
        }

        Ok(expected)
    }

    /// Rebuild coefficients after a quality factor change
    fn refresh_coefficients(&mut self) {
        if !self.coeffs_dirty {
            return;
        }
        self.filters.set_quality_factor(self.config.quality_factor);
        self.coeffs_dirty = false;

        if self.filters.has_non_finite_state() || self.envelopes.has_non_finite_state() {
            self.filters.reset();
            self.envelopes.reset();
        }
    }

    /// One sample of one channel through every band
    #[inline]
    fn process_frame(&mut self, channel: usize, main: f32, sidechain: f32) -> f32 {
        let mut sum = 0.0;
        for band in 0..self.num_bands {
            let side = self
                .filters
                .process_sample(channel, band, Bank::Sidechain, sidechain);
            let envelope = self.envelopes.update(channel, band, side);
            let filtered = self.filters.process_sample(channel, band, Bank::Main, main);
            sum += filtered * envelope;
        }
        sum * self.output_gain
    }

    /// Publish a channel's envelopes, recovering bands that went non-finite
    fn publish(&mut self, channel: usize) {
        for band in 0..self.num_bands {
            if !self.envelopes.value(channel, band).is_finite()
                || !self.filters.band_is_finite(channel, band)
            {
                self.envelopes.reset_band(channel, band);
                self.filters.reset_band(channel, band);
            }
        }
        self.meter.publish(channel, self.envelopes.channel(channel));
    }

    /// Latest published envelope of `(channel, band)`
    pub fn envelope_value(&self, channel: usize, band: usize) -> f32 {
        self.meter.value(channel, band)
    }

    /// Handle for observers on other threads
    pub fn meter(&self) -> EnvelopeMeter {
        self.meter.clone()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn filter_bank(&self) -> &FilterBank {
        &self.filters
    }

    pub fn envelope_detector(&self) -> &EnvelopeDetector {
        &self.envelopes
    }

    pub fn center_frequencies(&self) -> &[f32] {
        self.filters.center_frequencies()
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    pub fn num_bands(&self) -> usize {
        self.num_bands
    }

    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }
}

impl Default for VocoderEngine {
    fn default() -> Self {
        Self::with_layout(ChannelLayout::Stereo, params::DEFAULT_NUM_BANDS)
    }
}
