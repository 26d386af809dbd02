//! Lock-free envelope snapshots for display
//!
//! The audio thread publishes one `f32` per (channel, band) after each channel
//! of a block; any number of observer threads poll them at their own rate.
//! Every slot is an independent `AtomicU32` holding the float's bit pattern.
//! Loads and stores are relaxed: a reader may see different bands from
//! different blocks, but never a torn value.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Shared handle to the envelope snapshot array
///
/// Cloning is cheap and every clone observes the same slots.
#[derive(Debug, Clone)]
pub struct EnvelopeMeter {
    channels: usize,
    bands: usize,
    slots: Arc<[AtomicU32]>,
}

impl EnvelopeMeter {
    pub fn new(channels: usize, bands: usize) -> Self {
        let slots = (0..channels * bands)
            .map(|_| AtomicU32::new(0.0_f32.to_bits()))
            .collect();
        Self {
            channels,
            bands,
            slots,
        }
    }

    /// Latest published envelope of `(channel, band)`, 0.0 when out of range
    #[inline]
    pub fn value(&self, channel: usize, band: usize) -> f32 {
        if channel >= self.channels || band >= self.bands {
            return 0.0;
        }
        f32::from_bits(self.slots[channel * self.bands + band].load(Ordering::Relaxed))
    }

    /// Copy one channel's bands into `out`, returns the number of values written
    pub fn snapshot_into(&self, channel: usize, out: &mut [f32]) -> usize {
        if channel >= self.channels {
            return 0;
        }
        let start = channel * self.bands;
        let slots = &self.slots[start..start + self.bands];
        let written = out.len().min(self.bands);
        for (dst, slot) in out.iter_mut().zip(slots) {
            *dst = f32::from_bits(slot.load(Ordering::Relaxed));
        }
        written
    }

    /// Publish one channel's envelopes
    #[inline]
    pub(crate) fn publish(&self, channel: usize, values: &[f32]) {
        let start = channel * self.bands;
        for (slot, value) in self.slots[start..start + self.bands].iter().zip(values) {
            slot.store(value.to_bits(), Ordering::Relaxed);
        }
    }

    pub(crate) fn clear(&self) {
        for slot in self.slots.iter() {
            slot.store(0.0_f32.to_bits(), Ordering::Relaxed);
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn bands(&self) -> usize {
        self.bands
    }
}
