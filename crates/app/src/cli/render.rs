//! Offline rendering of WAV files through the engine

use crate::wav::AudioFile;
use anyhow::{bail, Context, Result};
use crossbeam::channel::{self, Receiver};
use ovocoder_core::domain::{
    params, ChannelLayout, EnvelopeMeter, VocoderConfig, VocoderEngine,
};
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Meter polling interval (~60 Hz)
const METER_INTERVAL: Duration = Duration::from_millis(16);

/// Ticks between two logged meter reports
const METER_REPORT_TICKS: u32 = 30;

#[derive(Debug, Clone)]
pub struct RenderJob {
    pub main: PathBuf,
    pub sidechain: PathBuf,
    pub output: PathBuf,
    pub config: VocoderConfig,
    pub meter: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSummary {
    pub frames: usize,
    pub channels: usize,
    pub sample_rate: u32,
    pub peak: f32,
}

pub fn render(job: &RenderJob) -> Result<RenderSummary> {
    let main = AudioFile::read(&job.main)
        .with_context(|| format!("Failed to read main input {}", job.main.display()))?;
    let sidechain = AudioFile::read(&job.sidechain)
        .with_context(|| format!("Failed to read sidechain {}", job.sidechain.display()))?;

    if main.sample_rate != sidechain.sample_rate {
        bail!(
            "Sample rate mismatch: main is {} Hz, sidechain is {} Hz",
            main.sample_rate,
            sidechain.sample_rate
        );
    }
    let sample_rate = main.sample_rate as f32;
    if !(params::SAMPLE_RATE_MIN..=params::SAMPLE_RATE_MAX).contains(&sample_rate) {
        bail!(
            "Unsupported sample rate {} Hz (supported: {}..={} Hz)",
            main.sample_rate,
            params::SAMPLE_RATE_MIN,
            params::SAMPLE_RATE_MAX
        );
    }
    let Some(layout) = ChannelLayout::from_count(main.channels) else {
        bail!("Main input has {} channels, only mono and stereo are supported", main.channels);
    };

    info!(
        main = %job.main.display(),
        sidechain = %job.sidechain.display(),
        channels = main.channels,
        sample_rate = main.sample_rate,
        seconds = main.duration_secs(),
        "Rendering"
    );

    let block_size = job.config.block_size;
    let mut engine_config = job.config.engine;
    engine_config.sample_rate = sample_rate;

    let mut engine = VocoderEngine::new(layout, job.config.num_bands)?;
    engine.prepare(engine_config, block_size);

    let frames = main.frames();
    let channels = layout.count();
    let side = sidechain.conform(channels, frames);
    let mut output = main.samples;
    output.truncate(frames * channels);

    let observer = if job.meter {
        Some(MeterObserver::spawn(engine.meter()).context("Failed to start meter thread")?)
    } else {
        None
    };

    for (out, side) in output
        .chunks_mut(block_size * channels)
        .zip(side.chunks(block_size * channels))
    {
        engine.process_interleaved(out, side)?;
    }

    if let Some(observer) = observer {
        observer.stop();
    }

    let rendered = AudioFile {
        sample_rate: main.sample_rate,
        channels,
        samples: output,
    };
    rendered
        .write(&job.output)
        .with_context(|| format!("Failed to write {}", job.output.display()))?;

    let summary = RenderSummary {
        frames,
        channels,
        sample_rate: rendered.sample_rate,
        peak: rendered.peak(),
    };
    info!(output = %job.output.display(), peak = summary.peak, "Render complete");
    Ok(summary)
}

/// Background thread polling the engine meter
struct MeterObserver {
    stop: channel::Sender<()>,
    handle: JoinHandle<()>,
}

impl MeterObserver {
    fn spawn(meter: EnvelopeMeter) -> std::io::Result<Self> {
        let (stop, stopped) = channel::bounded(1);
        let handle = thread::Builder::new()
            .name("ovocoder-meter".to_string())
            .spawn(move || observe(meter, stopped))?;
        Ok(Self { stop, handle })
    }

    fn stop(self) {
        // The observer may already have exited
        let _ = self.stop.send(());
        if self.handle.join().is_err() {
            warn!("Meter thread panicked");
        }
    }
}

fn observe(meter: EnvelopeMeter, stopped: Receiver<()>) {
    let ticker = channel::tick(METER_INTERVAL);
    let mut snapshot = vec![0.0; meter.bands()];
    let mut peaks = vec![0.0_f32; meter.channels() * meter.bands()];
    let mut ticks = 0;

    loop {
        crossbeam::select! {
            recv(ticker) -> _ => {
                for ch in 0..meter.channels() {
                    meter.snapshot_into(ch, &mut snapshot);
                    let row = &mut peaks[ch * meter.bands()..(ch + 1) * meter.bands()];
                    for (peak, &level) in row.iter_mut().zip(&snapshot) {
                        *peak = peak.max(level);
                    }
                }

                ticks += 1;
                if ticks % METER_REPORT_TICKS == 0 {
                    report(&meter, &peaks);
                    peaks.fill(0.0);
                }
            }
            recv(stopped) -> _ => break,
        }
    }

    report(&meter, &peaks);
    debug!(ticks, "Meter observer stopped");
}

fn report(meter: &EnvelopeMeter, peaks: &[f32]) {
    for (ch, row) in peaks.chunks(meter.bands()).enumerate() {
        let levels = row
            .iter()
            .map(|level| format!("{:.3}", level))
            .collect::<Vec<_>>()
            .join(" ");
        info!(channel = ch, levels = %levels, "Band envelopes");
    }
}
