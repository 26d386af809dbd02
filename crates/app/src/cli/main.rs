//! Ovocoder CLI Application

mod render;
mod wav;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use ovocoder_core::domain::{ChannelLayout, ParameterChange, VocoderConfig, VocoderEngine};
use render::RenderJob;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "ovocoder")]
#[command(about = "A multiband sidechain vocoder", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Vocode a main WAV file with a sidechain WAV file
    Render(RenderArgs),

    /// Print the band layout of a configuration
    Bands {
        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Write the default configuration to a TOML file
    InitConfig {
        path: PathBuf,
    },
}

#[derive(Args)]
struct RenderArgs {
    /// Carrier signal
    #[arg(long)]
    main: PathBuf,

    /// Modulator signal driving the band envelopes
    #[arg(long)]
    sidechain: PathBuf,

    /// Output file (32-bit float WAV)
    #[arg(short, long)]
    output: PathBuf,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Processing block size in frames
    #[arg(long)]
    block_size: Option<usize>,

    /// Envelope attack time (ms)
    #[arg(long)]
    attack: Option<f32>,

    /// Envelope release time (ms)
    #[arg(long)]
    release: Option<f32>,

    /// Band quality factor
    #[arg(long)]
    q: Option<f32>,

    /// Cascaded filter stages per band
    #[arg(long)]
    order: Option<usize>,

    /// Output gain (dB)
    #[arg(long, allow_hyphen_values = true)]
    gain: Option<f32>,

    /// Log band envelopes while rendering
    #[arg(long)]
    meter: bool,
}

impl RenderArgs {
    fn overrides(&self) -> Vec<ParameterChange> {
        [
            self.attack.map(ParameterChange::Attack),
            self.release.map(ParameterChange::Release),
            self.q.map(ParameterChange::QualityFactor),
            self.order.map(ParameterChange::Order),
            self.gain.map(ParameterChange::OutputGain),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

async fn load_config(path: Option<&Path>) -> anyhow::Result<VocoderConfig> {
    match path {
        Some(path) => VocoderConfig::load_from_file(path)
            .await
            .with_context(|| format!("Failed to load configuration {}", path.display())),
        None => Ok(VocoderConfig::default()),
    }
}

async fn run_render(args: RenderArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref()).await?;
    for change in args.overrides() {
        config.engine.apply(change);
    }
    if let Some(block_size) = args.block_size {
        if block_size == 0 {
            bail!("--block-size must be positive");
        }
        config.block_size = block_size;
    }

    let job = RenderJob {
        main: args.main,
        sidechain: args.sidechain,
        output: args.output,
        config,
        meter: args.meter,
    };

    let summary = tokio::task::spawn_blocking(move || render::render(&job)).await??;
    println!(
        "Rendered {} frames ({} ch, {} Hz), peak {:.3}",
        summary.frames, summary.channels, summary.sample_rate, summary.peak
    );
    Ok(())
}

async fn run_bands(config: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config.as_deref()).await?;
    let mut engine = VocoderEngine::new(ChannelLayout::Mono, config.num_bands)?;
    engine.prepare(config.engine, config.block_size);

    let engine_config = engine.config();
    println!(
        "{} bands, order {}, Q {:.3}, {} Hz",
        engine.num_bands(),
        engine_config.order,
        engine_config.quality_factor,
        engine_config.sample_rate
    );
    let detector = engine.envelope_detector();
    println!(
        "attack {} ms (coeff {:.6}), release {} ms (coeff {:.6})",
        engine_config.attack_ms,
        detector.attack_coeff(),
        engine_config.release_ms,
        detector.release_coeff()
    );

    let bank = engine.filter_bank();
    for (band, &center) in engine.center_frequencies().iter().enumerate() {
        let gain = bank.band_gain_at(band, center);
        println!(
            "  {:2}  {:9.1} Hz  peak gain {:7.3} ({:+6.1} dB)",
            band,
            center,
            gain,
            20.0 * gain.log10()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .init();
    }

    match cli.command {
        Command::Render(args) => run_render(args).await,
        Command::Bands { config } => run_bands(config).await,
        Command::InitConfig { path } => {
            VocoderConfig::default()
                .save_to_file(&path)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
    }
}
