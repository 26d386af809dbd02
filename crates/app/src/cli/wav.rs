//! WAV file input and output

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WavError {
    #[error("WAV error: {0}")]
    Hound(#[from] hound::Error),

    #[error("Unsupported bit depth {0}")]
    UnsupportedBitDepth(u16),
}

/// Decoded audio, interleaved, normalized to `[-1, 1]`
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFile {
    pub sample_rate: u32,
    pub channels: usize,
    pub samples: Vec<f32>,
}

impl AudioFile {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, WavError> {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();

        let samples = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .samples::<f32>()
                .collect::<Result<Vec<_>, _>>()?,
            hound::SampleFormat::Int => {
                if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                    return Err(WavError::UnsupportedBitDepth(spec.bits_per_sample));
                }
                let max_val = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|s| s as f32 / max_val))
                    .collect::<Result<Vec<_>, _>>()?
            }
        };

        Ok(Self {
            sample_rate: spec.sample_rate,
            channels: usize::from(spec.channels),
            samples,
        })
    }

    /// Write as 32-bit float
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), WavError> {
        let spec = hound::WavSpec {
            channels: self.channels as u16,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };

        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in &self.samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
        Ok(())
    }

    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }

    pub fn duration_secs(&self) -> f32 {
        self.frames() as f32 / self.sample_rate as f32
    }

    /// Re-shape to `channels` channels and exactly `frames` frames
    ///
    /// Mono is duplicated to every channel, stereo folded to mono by
    /// averaging. Missing frames are zero, extra frames dropped.
    pub fn conform(&self, channels: usize, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; channels * frames];
        let source_channels = self.channels.max(1);

        for (frame, source) in out
            .chunks_mut(channels)
            .zip(self.samples.chunks(source_channels))
        {
            if source.len() < source_channels {
                break;
            }
            if source_channels == channels {
                frame.copy_from_slice(source);
            } else if source_channels == 1 {
                frame.fill(source[0]);
            } else {
                let mono = source.iter().sum::<f32>() / source_channels as f32;
                frame.fill(mono);
            }
        }

        out
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0_f32, |peak, s| peak.max(s.abs()))
    }
}
