//! Channel layout and engine error types
//!
//! The engine never negotiates buses itself. The host declares a layout when it
//! constructs the engine and every block it hands over must fit that layout.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest channel count the engine can be built for
pub const MAX_CHANNELS: usize = 2;

/// Errors that can occur in the vocoder engine
#[derive(Debug, Error)]
pub enum VocoderError {
    /// Band count outside `1..=MAX_BANDS`
    #[error("Invalid band count {bands} (supported: 1..={max})")]
    InvalidLayout { bands: usize, max: usize },

    /// Buffers handed to `process_block` do not match the prepared shape
    #[error("Buffer shape mismatch: {0}")]
    BufferShape(#[from] ShapeError),

    /// `process_block` called before `prepare`
    #[error("Engine has not been prepared")]
    NotPrepared,
}

/// Buffer precondition failures
///
/// Only integers are carried so the error can be built on the audio thread
/// without touching the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ShapeError {
    #[error("main has {main} channels but sidechain has {sidechain}")]
    ChannelMismatch { main: usize, sidechain: usize },

    #[error("{got} channels exceed the prepared layout of {max}")]
    TooManyChannels { got: usize, max: usize },

    #[error("channel {channel} has {got} samples, expected {expected}")]
    RaggedChannel {
        channel: usize,
        got: usize,
        expected: usize,
    },

    #[error("block of {got} samples exceeds the prepared maximum of {max}")]
    BlockTooLarge { got: usize, max: usize },

    #[error("interleaved buffer of {len} samples is not a multiple of {channels} channels")]
    PartialFrame { len: usize, channels: usize },

    #[error("main has {main} samples but sidechain has {sidechain}")]
    LengthMismatch { main: usize, sidechain: usize },
}

pub type Result<T> = std::result::Result<T, VocoderError>;

/// Channel layout of both the main and the sidechain bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelLayout {
    Mono,
    Stereo,
}

impl ChannelLayout {
    pub fn count(&self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }

    /// Layout for a raw channel count, if the engine supports it
    pub fn from_count(channels: usize) -> Option<Self> {
        match channels {
            1 => Some(ChannelLayout::Mono),
            2 => Some(ChannelLayout::Stereo),
            _ => None,
        }
    }
}

impl Default for ChannelLayout {
    fn default() -> Self {
        ChannelLayout::Stereo
    }
}
