//! Parallel bandpass filter banks
//!
//! Two identically shaped banks (sidechain and main) of `bands` cascaded
//! bandpass stages per channel. Both banks share one coefficient set per band
//! so their responses match exactly; only the recursion state differs.
//!
//! State lives in a single flat arena indexed by
//! `(bank, channel, band, stage)` so the hot path never allocates.

use crate::domain::filter::{BandpassCoeffs, FilterState};
use tracing::debug;

/// Maximum number of cascaded stages per band
pub const MAX_ORDER: usize = 8;

/// Which of the two banks a sample runs through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bank {
    Sidechain = 0,
    Main = 1,
}

impl Bank {
    const COUNT: usize = 2;

    #[inline]
    fn index(self) -> usize {
        self as usize
    }
}

/// Center frequency of band `index` out of `bands`, spaced logarithmically
/// from `low_hz` (band 0) to `high_hz` (last band).
///
/// A single band sits at the geometric mean of the range.
pub fn center_frequency(index: usize, bands: usize, low_hz: f32, high_hz: f32) -> f32 {
    if bands <= 1 {
        return (low_hz * high_hz).sqrt();
    }
    let ratio = index as f32 / (bands - 1) as f32;
    low_hz * (high_hz / low_hz).powf(ratio)
}

/// Sidechain + main filter banks for every channel
#[derive(Debug, Clone)]
pub struct FilterBank {
    channels: usize,
    bands: usize,
    order: usize,
    sample_rate: f32,
    centers: Vec<f32>,
    // One coefficient set per band, shared by every channel and both banks
    coeffs: Vec<BandpassCoeffs>,
    states: Vec<FilterState>,
}

impl FilterBank {
    /// Create an unprepared bank; every stage outputs silence until `prepare`
    pub fn new(channels: usize, bands: usize) -> Self {
        Self {
            channels,
            bands,
            order: 1,
            sample_rate: 0.0,
            centers: vec![0.0; bands],
            coeffs: vec![BandpassCoeffs::default(); bands],
            states: vec![FilterState::default(); Bank::COUNT * channels * bands],
        }
    }

    /// Configure both banks and zero all state
    ///
    /// Inputs are expected to be validated already (see `EngineConfig`).
    pub fn prepare(&mut self, sample_rate: f32, low_hz: f32, high_hz: f32, order: usize, q: f32) {
        debug_assert!(sample_rate > 0.0);
        debug_assert!(low_hz > 0.0 && low_hz < high_hz);
        debug_assert!((1..=MAX_ORDER).contains(&order));
        debug_assert!(q > 0.0);

        self.sample_rate = sample_rate;
        self.order = order;

        for (band, center) in self.centers.iter_mut().enumerate() {
            *center = center_frequency(band, self.bands, low_hz, high_hz);
        }
        self.set_quality_factor(q);

        // Reuses the existing allocation when the order shrinks
        let len = Bank::COUNT * self.channels * self.bands * order;
        self.states.clear();
        self.states.resize(len, FilterState::default());

        debug!(
            bands = self.bands,
            order,
            sample_rate,
            low_hz,
            high_hz,
            q,
            "Filter banks prepared"
        );
    }

    /// Recompute coefficients for a new quality factor, keeping filter state
    pub fn set_quality_factor(&mut self, q: f32) {
        for (coeffs, &center) in self.coeffs.iter_mut().zip(self.centers.iter()) {
            *coeffs = BandpassCoeffs::bandpass(self.sample_rate, center, q);
        }
    }

    #[inline]
    fn offset(&self, bank: Bank, channel: usize, band: usize) -> usize {
        ((bank.index() * self.channels + channel) * self.bands + band) * self.order
    }

    /// Run one sample through the cascade at `(channel, band)` of `bank`
    #[inline]
    pub fn process_sample(&mut self, channel: usize, band: usize, bank: Bank, x: f32) -> f32 {
        let start = self.offset(bank, channel, band);
        let coeffs = &self.coeffs[band];

        let mut y = x;
        for stage in &mut self.states[start..start + self.order] {
            y = stage.tick(coeffs, y);
        }
        y
    }

    /// Zero every stage of both banks
    pub fn reset(&mut self) {
        self.states.iter_mut().for_each(FilterState::reset);
    }

    /// Zero both cascades (sidechain and main) of one band
    pub fn reset_band(&mut self, channel: usize, band: usize) {
        for bank in [Bank::Sidechain, Bank::Main] {
            let start = self.offset(bank, channel, band);
            self.states[start..start + self.order]
                .iter_mut()
                .for_each(FilterState::reset);
        }
    }

    pub fn has_non_finite_state(&self) -> bool {
        self.states.iter().any(|s| !s.is_finite())
    }

    /// Whether both cascades of one band hold only finite values
    pub fn band_is_finite(&self, channel: usize, band: usize) -> bool {
        [Bank::Sidechain, Bank::Main].into_iter().all(|bank| {
            let start = self.offset(bank, channel, band);
            self.states[start..start + self.order]
                .iter()
                .all(FilterState::is_finite)
        })
    }

    pub fn has_non_finite_coeffs(&self) -> bool {
        self.coeffs.iter().any(|c| !c.is_finite())
    }

    pub fn center_frequencies(&self) -> &[f32] {
        &self.centers
    }

    pub fn coeffs(&self, band: usize) -> BandpassCoeffs {
        self.coeffs[band]
    }

    /// Gain of the full cascade of `band` at `freq_hz`
    pub fn band_gain_at(&self, band: usize, freq_hz: f32) -> f32 {
        self.coeffs[band]
            .magnitude_at(freq_hz, self.sample_rate)
            .powi(self.order as i32)
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn bands(&self) -> usize {
        self.bands
    }
}
