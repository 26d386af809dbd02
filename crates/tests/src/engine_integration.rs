//! Integration tests for the vocoder engine
//!
//! These tests drive the complete signal path (filter banks, envelope
//! followers, meter) through the public engine API, including long-running
//! and cross-thread scenarios.

use ovocoder_core::domain::{
    max_quality_factor, params, time_to_coeff, ChannelLayout, EngineConfig, EnvelopeDetector,
    VocoderConfig, VocoderEngine, MAX_ORDER,
};
use proptest::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::f32::consts::PI;

const SAMPLE_RATE: f32 = 48000.0;

fn create_engine(layout: ChannelLayout, config: EngineConfig, block_size: usize) -> VocoderEngine {
    let mut engine = VocoderEngine::new(layout, 12).unwrap();
    engine.prepare(config, block_size);
    engine
}

fn unity_peak_config() -> EngineConfig {
    // Q = 1 puts the peak gain of every stage at 1
    EngineConfig {
        quality_factor: 1.0,
        ..EngineConfig::default()
    }
}

fn generate_sine_wave(frequency: f32, amplitude: f32, offset: usize, len: usize) -> Vec<f32> {
    (offset..offset + len)
        .map(|i| 2.0 * PI * frequency * i as f32 / SAMPLE_RATE)
        .map(|phase| amplitude * phase.sin())
        .collect()
}

/// White noise through a one-pole lowpass
fn generate_band_limited_noise(rng: &mut StdRng, state: &mut f32, len: usize) -> Vec<f32> {
    (0..len)
        .map(|_| {
            let white: f32 = rng.gen_range(-1.0..1.0);
            *state += 0.2 * (white - *state);
            *state
        })
        .collect()
}

/// Largest published envelope per band while a sine drives the sidechain
fn envelope_peaks(engine: &mut VocoderEngine, frequency: f32, amplitude: f32) -> Vec<f32> {
    let block = 16;
    let warmup = (SAMPLE_RATE as usize / 2) / block;
    let measured = SAMPLE_RATE as usize / block;
    let mut peaks = vec![0.0_f32; engine.num_bands()];

    for index in 0..warmup + measured {
        let side = generate_sine_wave(frequency, amplitude, index * block, block);
        let mut main = vec![0.0; block];
        engine
            .process_block(&mut [main.as_mut_slice()], &[side.as_slice()])
            .unwrap();

        if index >= warmup {
            for (band, peak) in peaks.iter_mut().enumerate() {
                *peak = peak.max(engine.envelope_value(0, band));
            }
        }
    }

    peaks
}

// ============================================================================
// SILENCE
// ============================================================================

#[test]
fn test_silence_in_silence_out() {
    let mut engine = create_engine(ChannelLayout::Stereo, EngineConfig::default(), 256);
    let silence = vec![0.0; 256];

    for _ in 0..50 {
        let mut left = vec![0.0; 256];
        let mut right = vec![0.0; 256];
        engine
            .process_block(
                &mut [left.as_mut_slice(), right.as_mut_slice()],
                &[silence.as_slice(), silence.as_slice()],
            )
            .unwrap();

        assert!(left.iter().chain(&right).all(|&s| s == 0.0));
    }

    for channel in 0..2 {
        for band in 0..12 {
            assert_eq!(engine.envelope_value(channel, band), 0.0);
        }
    }
}

#[test]
fn test_impulse_on_main_with_silent_sidechain() {
    let mut engine = create_engine(ChannelLayout::Mono, EngineConfig::default(), 512);
    let mut main = vec![0.0; 512];
    main[0] = 1.0;
    let side = vec![0.0; 512];

    engine
        .process_block(&mut [main.as_mut_slice()], &[side.as_slice()])
        .unwrap();

    assert!(main.iter().all(|&s| s == 0.0));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_silence_for_any_configuration(
        attack in 0.1f32..5000.0,
        release in 0.1f32..5000.0,
        q in 0.1f32..24.0,
        order in 1usize..=8,
        gain in -60.0f32..24.0,
        block_size in 1usize..512,
    ) {
        let config = EngineConfig {
            attack_ms: attack,
            release_ms: release,
            quality_factor: q,
            order,
            output_gain_db: gain,
            ..EngineConfig::default()
        };
        let mut engine = create_engine(ChannelLayout::Mono, config, block_size);
        let side = vec![0.0; block_size];

        for _ in 0..4 {
            let mut main = vec![0.0; block_size];
            engine.process_block(&mut [main.as_mut_slice()], &[side.as_slice()]).unwrap();
            prop_assert!(main.iter().all(|&s| s == 0.0));
        }
        prop_assert!((0..12).all(|band| engine.envelope_value(0, band) == 0.0));
    }
}

// ============================================================================
// BAND RESPONSE
// ============================================================================

#[test]
fn test_sine_at_band_center_converges_to_amplitude() {
    let mut engine = create_engine(ChannelLayout::Mono, unity_peak_config(), 16);
    let center = engine.center_frequencies()[5];
    let amplitude = 0.5;

    let peaks = envelope_peaks(&mut engine, center, amplitude);

    assert!(
        (peaks[5] - amplitude).abs() < 0.02 * amplitude,
        "band 5 peak {} for amplitude {}",
        peaks[5],
        amplitude
    );
}

#[test]
fn test_adjacent_bands_are_attenuated() {
    let mut engine = create_engine(ChannelLayout::Mono, unity_peak_config(), 16);
    let center = engine.center_frequencies()[5];
    let amplitude = 0.5;

    let peaks = envelope_peaks(&mut engine, center, amplitude);

    assert!(peaks[4] < 0.65 * amplitude, "band 4 peak {}", peaks[4]);
    assert!(peaks[6] < 0.65 * amplitude, "band 6 peak {}", peaks[6]);
    // Further away is quieter still
    assert!(peaks[2] < peaks[4]);
    assert!(peaks[9] < peaks[6]);
}

#[test]
fn test_cascade_peak_gain_follows_order() {
    for order in [1, 2, 4, 8] {
        let config = EngineConfig {
            quality_factor: 2.0,
            order,
            ..EngineConfig::default()
        };
        let engine = create_engine(ChannelLayout::Mono, config, 64);
        let bank = engine.filter_bank();
        let center = engine.center_frequencies()[7];

        let expected = 2.0_f32.powi(order as i32);
        let gain = bank.band_gain_at(7, center);
        assert!((gain - expected).abs() < 1e-3 * expected, "order {order}: {gain}");
    }
}

// ============================================================================
// ENVELOPE DYNAMICS
// ============================================================================

#[test]
fn test_step_response_closed_form() {
    // A sub-sample time constant keeps the coefficient well inside (0, 1)
    let coeff = time_to_coeff(0.1, 8000.0);
    assert!(coeff > 0.2 && coeff < 0.4);

    let mut detector = EnvelopeDetector::new(1, 1);
    detector.configure(coeff, coeff);

    for n in 1..=100 {
        let value = detector.update(0, 0, 1.0);
        if [1, 10, 100].contains(&n) {
            let expected = 1.0 - (1.0 - coeff).powi(n);
            assert!((value - expected).abs() < 1e-4, "n = {n}: {value} vs {expected}");
        }
    }

    // Falling edge follows the same curve towards zero
    for n in 1..=10 {
        let value = detector.update(0, 0, 0.0);
        if n == 10 {
            assert!((value - (1.0 - coeff).powi(10)).abs() < 1e-4);
        }
    }
}

#[test]
fn test_longer_time_constant_tracks_more_tightly() {
    let short = time_to_coeff(1.0, SAMPLE_RATE);
    let long = time_to_coeff(100.0, SAMPLE_RATE);
    assert!(long > short);

    let mut fast = EnvelopeDetector::new(1, 1);
    let mut slow = EnvelopeDetector::new(1, 1);
    fast.configure(long, long);
    slow.configure(short, short);

    let tight = fast.update(0, 0, 1.0);
    let loose = slow.update(0, 0, 1.0);
    assert!(tight > loose);
}

#[test]
fn test_rise_and_fall_times_follow_coefficients() {
    // Attack time shorter than release time
    let attack = time_to_coeff(0.1, 8000.0);
    let release = time_to_coeff(0.2, 8000.0);
    assert!(attack < release);

    let mut detector = EnvelopeDetector::new(1, 1);
    detector.configure(attack, release);

    let rise = (1..=100)
        .find(|_| detector.update(0, 0, 1.0) >= 0.63)
        .unwrap();
    // Settle fully before the falling edge
    for _ in 0..100 {
        detector.update(0, 0, 1.0);
    }
    let fall = (1..=100)
        .find(|_| detector.update(0, 0, 0.0) <= 0.37)
        .unwrap();

    // The coefficient scales the error, so the larger one converges sooner
    assert_eq!(rise, 3);
    assert_eq!(fall, 2);
}

// ============================================================================
// LIFECYCLE AND RECONFIGURATION
// ============================================================================

#[test]
fn test_prepare_is_idempotent() {
    let input = generate_sine_wave(300.0, 0.5, 0, 256);
    let side = generate_sine_wave(1200.0, 0.8, 0, 256);

    let mut fresh = create_engine(ChannelLayout::Mono, EngineConfig::default(), 256);
    let mut expected = input.clone();
    fresh
        .process_block(&mut [expected.as_mut_slice()], &[side.as_slice()])
        .unwrap();

    let mut reused = create_engine(ChannelLayout::Mono, EngineConfig::default(), 256);
    let mut scratch = generate_sine_wave(5000.0, 1.0, 0, 256);
    let scratch_side = scratch.clone();
    reused
        .process_block(&mut [scratch.as_mut_slice()], &[scratch_side.as_slice()])
        .unwrap();
    reused.prepare(EngineConfig::default(), 256);
    reused.prepare(EngineConfig::default(), 256);

    let mut output = input.clone();
    reused
        .process_block(&mut [output.as_mut_slice()], &[side.as_slice()])
        .unwrap();

    assert_eq!(output, expected);
}

#[test]
fn test_order_change_mid_stream_stays_finite() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut state = 0.0;
    let mut engine = create_engine(ChannelLayout::Mono, EngineConfig::default(), 128);

    for block in 0..200 {
        if block == 100 {
            engine.set_order(4);
            assert_eq!(engine.filter_bank().order(), 4);
        }
        let mut main = generate_band_limited_noise(&mut rng, &mut state, 128);
        let side = generate_band_limited_noise(&mut rng, &mut state, 128);
        engine
            .process_block(&mut [main.as_mut_slice()], &[side.as_slice()])
            .unwrap();
        assert!(main.iter().all(|s| s.is_finite()));
    }
    assert!(!engine.filter_bank().has_non_finite_state());
}

#[test]
fn test_long_noise_run_stays_finite() {
    let block = 64;
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut state_main = 0.0;
    let mut state_side = 0.0;
    let mut engine = create_engine(ChannelLayout::Stereo, EngineConfig::default(), block);

    for index in 0..10_000 {
        if index % 1000 == 999 {
            // Exercise the lazy coefficient rebuild along the way
            engine.set_quality_factor(rng.gen_range(0.5..8.0));
        }

        let mut left = generate_band_limited_noise(&mut rng, &mut state_main, block);
        let mut right = left.clone();
        let side = generate_band_limited_noise(&mut rng, &mut state_side, block);
        engine
            .process_block(
                &mut [left.as_mut_slice(), right.as_mut_slice()],
                &[side.as_slice(), side.as_slice()],
            )
            .unwrap();

        assert!(left.iter().chain(&right).all(|s| s.is_finite()), "block {index}");
    }

    assert!(!engine.filter_bank().has_non_finite_state());
    assert!((0..12).all(|band| engine.envelope_value(1, band).is_finite()));
}

#[test]
fn test_extreme_configuration_stays_finite() {
    // Steepest, narrowest and loudest corner of the parameter space
    let config = EngineConfig {
        quality_factor: params::Q_MAX,
        order: MAX_ORDER,
        output_gain_db: params::GAIN_DB_MAX,
        sample_rate: params::SAMPLE_RATE_MAX,
        min_center_hz: params::FREQ_MIN,
        max_center_hz: 2.0 * params::FREQ_MIN,
        ..EngineConfig::default()
    };
    let block = 256;
    let mut engine = create_engine(ChannelLayout::Mono, config, block);
    assert_eq!(engine.config().order, MAX_ORDER);
    assert_eq!(engine.config().quality_factor, max_quality_factor(MAX_ORDER));

    let mut rng = StdRng::seed_from_u64(0xc0de);
    let mut meter = vec![0.0; engine.num_bands()];
    for index in 0..100 {
        let mut main: Vec<f32> = (0..block).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let side: Vec<f32> = (0..block).map(|_| rng.gen_range(-1.0..1.0)).collect();
        engine
            .process_block(&mut [main.as_mut_slice()], &[side.as_slice()])
            .unwrap();

        assert!(
            main.iter().all(|s| s.is_finite() && s.abs() < 1.0e12),
            "block {index}"
        );
        engine.meter().snapshot_into(0, &mut meter);
        assert!(meter.iter().all(|v| v.is_finite()), "block {index}");
    }

    assert!(!engine.filter_bank().has_non_finite_state());
}

#[test]
fn test_configuration_file_drives_engine() {
    let config = VocoderConfig::from_toml_str(
        r#"
        num_bands = 8
        block_size = 64

        [engine]
        min_center_hz = 100.0
        max_center_hz = 6400.0
        order = 3
        "#,
    )
    .unwrap();

    let mut engine = VocoderEngine::new(ChannelLayout::Stereo, config.num_bands).unwrap();
    engine.prepare(config.engine, config.block_size);

    let centers = engine.center_frequencies();
    assert_eq!(centers.len(), 8);
    assert!((centers[0] - 100.0).abs() < 1e-3);
    assert!((centers[7] - 6400.0).abs() < 0.05);
    assert_eq!(engine.filter_bank().order(), 3);
    assert_eq!(engine.max_block_size(), 64);
}

// ============================================================================
// TELEMETRY
// ============================================================================

#[test]
fn test_meter_visible_from_another_thread() {
    let mut engine = create_engine(ChannelLayout::Stereo, unity_peak_config(), 256);
    let meter = engine.meter();
    let center = engine.center_frequencies()[8];

    let side = generate_sine_wave(center, 0.5, 0, 256);
    let mut left = vec![0.0; 256];
    let mut right = vec![0.0; 256];
    engine
        .process_block(
            &mut [left.as_mut_slice(), right.as_mut_slice()],
            &[side.as_slice(), side.as_slice()],
        )
        .unwrap();
    let expected = engine.envelope_value(1, 8);

    let observed = std::thread::spawn(move || {
        let mut snapshot = vec![0.0; meter.bands()];
        let written = meter.snapshot_into(1, &mut snapshot);
        assert_eq!(written, 12);
        snapshot[8]
    })
    .join()
    .unwrap();

    assert!(expected > 0.0);
    assert_eq!(observed, expected);
}

#[test]
fn test_meter_out_of_range_reads_zero() {
    let engine = create_engine(ChannelLayout::Mono, EngineConfig::default(), 64);
    assert_eq!(engine.envelope_value(3, 0), 0.0);
    assert_eq!(engine.envelope_value(0, 99), 0.0);
}
