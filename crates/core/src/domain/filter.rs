//! Second-order bandpass stage
//!
//! One biquad section with a constant-skirt-gain response (peak gain = Q).
//! Steeper bands are built by cascading identical stages in the filter bank.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Bandpass filter coefficients
///
/// Direct Form I layout, normalized so that a0 = 1.0. Held in f64: low
/// centers at high sample rates put the poles within f32 rounding of the
/// unit circle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandpassCoeffs {
    /// Numerator coefficients
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    /// Denominator coefficients (a0 is normalized to 1.0)
    pub a1: f64,
    pub a2: f64,
}

impl Default for BandpassCoeffs {
    fn default() -> Self {
        // Silent until configured
        Self {
            b0: 0.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

impl BandpassCoeffs {
    /// Calculate coefficients for a constant-skirt-gain bandpass
    ///
    /// # Parameters
    /// - `sample_rate`: Audio sample rate in Hz
    /// - `center_hz`: Center frequency in Hz, must lie below Nyquist
    /// - `q`: Quality factor, also the gain at the center frequency
    #[must_use]
    pub fn bandpass(sample_rate: f32, center_hz: f32, q: f32) -> Self {
        let w0 = 2.0 * PI * f64::from(center_hz) / f64::from(sample_rate);
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * f64::from(q));

        let b0 = sin_w0 / 2.0;
        let b1 = 0.0;
        let b2 = -sin_w0 / 2.0;

        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.b0.is_finite()
            && self.b1.is_finite()
            && self.b2.is_finite()
            && self.a1.is_finite()
            && self.a2.is_finite()
    }

    /// Magnitude response of one stage at `freq_hz`
    pub fn magnitude_at(&self, freq_hz: f32, sample_rate: f32) -> f32 {
        let w = 2.0 * PI * f64::from(freq_hz) / f64::from(sample_rate);
        let (sin1, cos1) = w.sin_cos();
        let (sin2, cos2) = (2.0 * w).sin_cos();

        // H(z) evaluated at z = e^{jw}, with z^-n = cos(nw) - j sin(nw)
        let num_re = self.b0 + self.b1 * cos1 + self.b2 * cos2;
        let num_im = -self.b1 * sin1 - self.b2 * sin2;
        let den_re = 1.0 + self.a1 * cos1 + self.a2 * cos2;
        let den_im = -self.a1 * sin1 - self.a2 * sin2;

        ((num_re * num_re + num_im * num_im) / (den_re * den_re + den_im * den_im)).sqrt() as f32
    }
}

/// Stateful bandpass stage using Direct Form I
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BandpassFilter {
    coeffs: BandpassCoeffs,
    state: FilterState,
}

/// Recursion memory of one stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterState {
    // Previous input samples (x[n-1], x[n-2])
    x1: f64,
    x2: f64,
    // Previous output samples (y[n-1], y[n-2])
    y1: f64,
    y2: f64,
}

impl FilterState {
    /// Advance the recursion by one sample
    #[inline]
    pub fn tick(&mut self, coeffs: &BandpassCoeffs, x: f32) -> f32 {
        let x = f64::from(x);
        // Direct Form I: y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2]
        //                        - a1*y[n-1] - a2*y[n-2]
        let y = coeffs.b0 * x + coeffs.b1 * self.x1 + coeffs.b2 * self.x2
            - coeffs.a1 * self.y1
            - coeffs.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;

        y as f32
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_finite(&self) -> bool {
        self.x1.is_finite() && self.x2.is_finite() && self.y1.is_finite() && self.y2.is_finite()
    }
}

impl BandpassFilter {
    /// Create a new filter with given coefficients
    pub fn new(coeffs: BandpassCoeffs) -> Self {
        Self {
            coeffs,
            state: FilterState::default(),
        }
    }

    /// Derive and install coefficients, keeping the current state
    pub fn configure(&mut self, center_hz: f32, q: f32, sample_rate: f32) -> BandpassCoeffs {
        self.coeffs = BandpassCoeffs::bandpass(sample_rate, center_hz, q);
        self.coeffs
    }

    pub fn coeffs(&self) -> BandpassCoeffs {
        self.coeffs
    }

    /// Process a single sample
    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        self.state.tick(&self.coeffs, x)
    }

    /// Process a buffer of samples in place
    pub fn process(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }

    /// Reset filter state, coefficients are kept
    pub fn reset(&mut self) {
        self.state.reset();
    }

    pub fn is_finite(&self) -> bool {
        self.coeffs.is_finite() && self.state.is_finite()
    }
}
