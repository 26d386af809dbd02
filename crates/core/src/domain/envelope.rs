//! Asymmetric one-pole envelope follower
//!
//! One follower per (channel, band). The attack coefficient is used while the
//! rectified input rises above the envelope, the release coefficient otherwise.
//!
//! The coefficient scales the *error* term:
//!
//! ```text
//! env += (|x| - env) * attack    when |x| > env
//! env -= (env - |x|) * release   otherwise
//! ```
//!
//! so the fraction of a constant step covered after `n` samples is
//! `1 - (1 - coeff)^n`.

/// Convert a time constant in milliseconds to a follower coefficient
///
/// `exp(-1 / (T * Fs / 1000))`, always in `(0, 1)` for positive inputs.
#[inline]
pub fn time_to_coeff(time_ms: f32, sample_rate: f32) -> f32 {
    let time_in_samples = time_ms * sample_rate / 1000.0;
    (-1.0 / time_in_samples).exp()
}

/// Envelope followers for every (channel, band)
#[derive(Debug, Clone)]
pub struct EnvelopeDetector {
    bands: usize,
    attack_coeff: f32,
    release_coeff: f32,
    states: Vec<f32>,
}

impl EnvelopeDetector {
    pub fn new(channels: usize, bands: usize) -> Self {
        Self {
            bands,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            states: vec![0.0; channels * bands],
        }
    }

    /// Install new coefficients; envelope state is kept
    pub fn configure(&mut self, attack_coeff: f32, release_coeff: f32) {
        self.attack_coeff = attack_coeff;
        self.release_coeff = release_coeff;
    }

    /// Feed one filtered sidechain sample and return the updated envelope
    #[inline]
    pub fn update(&mut self, channel: usize, band: usize, sample: f32) -> f32 {
        let magnitude = sample.abs();
        let envelope = &mut self.states[channel * self.bands + band];

        if magnitude > *envelope {
            *envelope += (magnitude - *envelope) * self.attack_coeff;
        } else {
            *envelope -= (*envelope - magnitude) * self.release_coeff;
        }

        *envelope
    }

    #[inline]
    pub fn value(&self, channel: usize, band: usize) -> f32 {
        self.states[channel * self.bands + band]
    }

    /// Envelopes of every band of one channel
    pub fn channel(&self, channel: usize) -> &[f32] {
        let start = channel * self.bands;
        &self.states[start..start + self.bands]
    }

    pub fn reset(&mut self) {
        self.states.fill(0.0);
    }

    pub fn reset_band(&mut self, channel: usize, band: usize) {
        self.states[channel * self.bands + band] = 0.0;
    }

    pub fn has_non_finite_state(&self) -> bool {
        self.states.iter().any(|s| !s.is_finite())
    }

    pub fn attack_coeff(&self) -> f32 {
        self.attack_coeff
    }

    pub fn release_coeff(&self) -> f32 {
        self.release_coeff
    }
}
