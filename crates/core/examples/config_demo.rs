//! Example demonstrating configuration files and live parameter changes
//!
//! Run with: cargo run --package ovocoder-core --example config_demo

use ovocoder_core::domain::{
    ChannelLayout, ParameterChange, VocoderConfig, VocoderEngine,
};
use std::f32::consts::PI;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("ovocoder_core=debug,info")
        .init();

    println!("=== Ovocoder Configuration Demo ===\n");

    // 1. Save a configuration
    println!("1. Saving configuration to file...");
    let mut config = VocoderConfig {
        num_bands: 16,
        block_size: 256,
        ..VocoderConfig::default()
    };
    config.engine.attack_ms = 5.0;
    config.engine.release_ms = 80.0;
    let config_path = "demo_vocoder.toml";
    config.save_to_file(config_path).await?;
    println!("   ✓ Configuration saved to {}", config_path);

    // 2. Load it back
    println!("\n2. Loading configuration from file...");
    let loaded = VocoderConfig::load_from_file(config_path).await?;
    println!(
        "   ✓ Loaded {} bands, block size {}",
        loaded.num_bands, loaded.block_size
    );

    // 3. Build and prepare an engine
    println!("\n3. Preparing engine...");
    let mut engine = VocoderEngine::new(ChannelLayout::Mono, loaded.num_bands)?;
    engine.prepare(loaded.engine, loaded.block_size);
    for (band, center) in engine.center_frequencies().iter().enumerate() {
        println!("   band {:2}: {:8.1} Hz", band, center);
    }

    // 4. Drive it with a 1 kHz sidechain
    println!("\n4. Processing one second of audio...");
    let sample_rate = loaded.engine.sample_rate;
    let block = loaded.block_size;
    let blocks = (sample_rate as usize) / block;
    for index in 0..blocks {
        let mut main: Vec<f32> = (0..block)
            .map(|i| {
                let t = (index * block + i) as f32 / sample_rate;
                // Sawtooth carrier at 110 Hz
                2.0 * (t * 110.0).fract() - 1.0
            })
            .collect();
        let side: Vec<f32> = (0..block)
            .map(|i| {
                let t = (index * block + i) as f32 / sample_rate;
                0.5 * (2.0 * PI * 1000.0 * t).sin()
            })
            .collect();
        engine.process_block(&mut [main.as_mut_slice()], &[side.as_slice()])?;
    }

    let meter = engine.meter();
    let mut levels = vec![0.0; meter.bands()];
    meter.snapshot_into(0, &mut levels);
    for (band, level) in levels.iter().enumerate() {
        println!("   band {:2}: {:.4}", band, level);
    }

    // 5. Change parameters between blocks
    println!("\n5. Applying parameter changes...");
    let changes = [
        ParameterChange::QualityFactor(4.0),
        ParameterChange::Order(4),
        ParameterChange::OutputGain(-6.0),
    ];
    for change in changes {
        engine.apply(change);
        println!("   ✓ {:?}", change);
    }
    println!("   Current: {:?}", engine.config());

    // Cleanup
    println!("\n6. Cleaning up...");
    tokio::fs::remove_file(config_path).await?;
    println!("   ✓ Cleanup complete");

    println!("\n=== Demo Complete ===");
    Ok(())
}
