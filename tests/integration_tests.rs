//! Integration Tests
//!
//! End-to-end tests driving the playback engine through the offline backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use approx::assert_relative_eq;
use proptest::prelude::*;

use autoeq::config::EngineConfig;
use autoeq::dsp::{apply_volume_and_clip, soft_clip, FilterBank, BAND_COUNT};
use autoeq::engine::{
    export_wav, generate_test_tone, AudioBuffer, OfflineBackend, OutputBackend, OutputStream,
    PlayAction, PlaybackEngine, RenderCallback, StreamConfig, TransportState,
};
use autoeq::AutoEqError;

const BLOCK: usize = 256;

fn engine_with(volume: f32) -> (PlaybackEngine, OfflineBackend) {
    let backend = OfflineBackend::new();
    let config = EngineConfig {
        block_frames: BLOCK,
        initial_volume: volume,
        ..EngineConfig::default()
    };
    let engine = PlaybackEngine::new(config, backend.clone()).unwrap();
    (engine, backend)
}

/// Deterministic broadband stereo test signal
fn noise_buffer(frames: usize, sample_rate: u32) -> AudioBuffer {
    let mut seed: u32 = 0x2545_f491;
    let mut next = move || {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        (seed as f32 / u32::MAX as f32) * 1.6 - 0.8
    };
    let left: Vec<f32> = (0..frames).map(|_| next()).collect();
    let right: Vec<f32> = (0..frames).map(|_| next()).collect();
    AudioBuffer::from_channels(&left, &right, sample_rate)
}

/// Pull blocks until the transport leaves Playing
fn render_to_end(engine: &PlaybackEngine, backend: &OfflineBackend) -> Vec<f32> {
    let mut out = Vec::new();
    while engine.status().is_playing {
        out.extend(backend.pull_block(BLOCK).expect("stream should be open"));
    }
    out
}

struct FailingBackend;

impl OutputBackend for FailingBackend {
    fn open(
        &self,
        _config: StreamConfig,
        _callback: RenderCallback,
    ) -> autoeq::Result<Box<dyn OutputStream>> {
        Err(AutoEqError::Device {
            reason: "device busy".to_string(),
            source: None,
        })
    }
}

// === Playback ===

#[test]
fn test_load_reports_duration() {
    let (mut engine, _) = engine_with(0.8);
    let info = engine.load(AudioBuffer::silence(88200, 44100), "two-seconds").unwrap();

    assert_relative_eq!(info.duration_secs, 2.0, epsilon = 1.0 / 44100.0);
    assert_eq!(info.sample_rate, 44100);
    assert_eq!(info.channels, 2);

    let status = engine.status();
    assert_relative_eq!(status.duration_secs, 2.0, epsilon = 1.0 / 44100.0);
    assert_eq!(status.transport, TransportState::Stopped);
    assert_eq!(status.current_file.as_deref(), Some("two-seconds"));
}

#[test]
fn test_flat_eq_output_is_soft_clipped_input() {
    let (mut engine, backend) = engine_with(0.7);
    let input = noise_buffer(1000, 44100);
    engine.load(input.clone(), "noise").unwrap();
    engine.set_eq(&[0.4, -0.3, 0.0, 0.5, 0.0, 0.0, -0.5, 0.0, 0.2, 0.0]).unwrap();

    assert_eq!(engine.play().unwrap(), PlayAction::Started);
    let output = render_to_end(&engine, &backend);

    let expected = input.to_interleaved();
    for (i, (&out, &x)) in output.iter().zip(expected.iter()).enumerate() {
        assert_eq!(out, soft_clip(x * 0.7), "sample {}", i);
        assert_relative_eq!(out, (x * 0.7).tanh(), epsilon = 1e-6);
    }
}

#[test]
fn test_play_without_buffer_is_not_loaded() {
    let (mut engine, backend) = engine_with(0.8);
    assert!(matches!(engine.play(), Err(AutoEqError::NotLoaded)));
    assert_eq!(engine.status().transport, TransportState::Stopped);
    assert_eq!(backend.open_count(), 0);
}

#[test]
fn test_analyze_tone_cuts_tone_band() {
    let (engine, _) = engine_with(0.8);
    let gains = engine
        .analyze(&generate_test_tone(1000.0, 1.0, 44100, 0.5))
        .unwrap();

    assert!(gains[5] < 0.0, "gains: {:?}", gains);
    for band in [0, 1, 2, 7, 8, 9] {
        assert!(gains[band] > 0.0, "gains: {:?}", gains);
    }
}

#[test]
fn test_end_of_buffer_mid_block() {
    let (mut engine, backend) = engine_with(1.0);
    engine.load(noise_buffer(1000, 44100), "noise").unwrap();
    engine.play().unwrap();

    for _ in 0..3 {
        backend.pull_block(BLOCK).unwrap();
    }
    assert!(engine.status().is_playing);
    assert_relative_eq!(engine.status().position_secs, 768.0 / 44100.0);

    let tail = backend.pull_block(BLOCK).unwrap();
    assert!(tail[..232 * 2].iter().any(|&s| s != 0.0));
    assert!(tail[232 * 2..].iter().all(|&s| s == 0.0));

    let status = engine.status();
    assert!(!status.is_playing);
    assert!(!status.is_paused);
    assert_eq!(status.transport, TransportState::Stopped);
    assert_eq!(status.position_secs, 0.0);

    // The stream keeps running but only emits silence
    assert_eq!(backend.pull_block(BLOCK).unwrap(), vec![0.0; BLOCK * 2]);
}

// === Transport ===

#[test]
fn test_device_failure_leaves_stopped() {
    let mut engine = PlaybackEngine::new(EngineConfig::default(), FailingBackend).unwrap();
    engine.load(AudioBuffer::silence(1000, 44100), "quiet").unwrap();

    let err = engine.play().unwrap_err();
    assert!(matches!(err, AutoEqError::Device { .. }));
    assert_eq!(err.error_code(), "DEVICE_ERROR");
    assert_eq!(engine.status().transport, TransportState::Stopped);

    assert!(engine.play().is_err());
    assert_eq!(engine.status().transport, TransportState::Stopped);
}

#[test]
fn test_stop_and_pause_are_idempotent() {
    let (mut engine, backend) = engine_with(0.8);
    engine.load(noise_buffer(4096, 44100), "noise").unwrap();

    engine.pause();
    assert_eq!(engine.status().transport, TransportState::Stopped);

    engine.play().unwrap();
    backend.pull_block(BLOCK).unwrap();
    engine.pause();
    engine.pause();
    let status = engine.status();
    assert!(status.is_paused);
    assert!(!status.is_playing);
    assert_relative_eq!(status.position_secs, BLOCK as f64 / 44100.0);

    engine.stop();
    let first = engine.status();
    engine.stop();
    assert_eq!(engine.status(), first);
    assert_eq!(first.transport, TransportState::Stopped);
    assert_eq!(first.position_secs, 0.0);
    assert!(!backend.is_open());
}

#[test]
fn test_seek_keeps_transport_and_moves_render_position() {
    let (mut engine, backend) = engine_with(1.0);
    let input = noise_buffer(44100, 44100);
    engine.load(input.clone(), "noise").unwrap();
    engine.play().unwrap();

    assert_eq!(engine.seek(0.5), 0.5);
    assert!(engine.status().is_playing);

    let block = backend.pull_block(4).unwrap();
    let expected = input.frames()[22050];
    assert_eq!(block[0], soft_clip(expected[0]));
    assert_eq!(block[1], soft_clip(expected[1]));

    let clamped = engine.seek(99.0);
    assert_relative_eq!(clamped, 44099.0 / 44100.0);
}

#[test]
fn test_seek_while_paused_or_stopped_keeps_transport() {
    let (mut engine, backend) = engine_with(1.0);
    let input = noise_buffer(44100, 44100);
    engine.load(input.clone(), "noise").unwrap();

    assert_eq!(engine.seek(0.25), 0.25);
    assert_eq!(engine.status().transport, TransportState::Stopped);
    assert!(!backend.is_open());

    engine.play().unwrap();
    backend.pull_block(BLOCK).unwrap();
    engine.pause();

    assert_eq!(engine.seek(0.5), 0.5);
    let status = engine.status();
    assert_eq!(status.transport, TransportState::Paused);
    assert!(status.is_paused);
    assert_eq!(status.position_secs, 0.5);
    assert_eq!(backend.pull_block(BLOCK).unwrap(), vec![0.0; BLOCK * 2]);

    assert_eq!(engine.play().unwrap(), PlayAction::Resumed);
    let block = backend.pull_block(1).unwrap();
    assert_eq!(block[0], soft_clip(input.frames()[22050][0]));
}

#[test]
fn test_set_eq_requires_exactly_ten_gains() {
    let (engine, _) = engine_with(0.8);
    let ten = [1.0, -2.0, 3.0, -4.0, 5.0, -6.0, 7.0, -8.0, 9.0, -10.0];
    assert_eq!(engine.set_eq(&ten).unwrap(), ten);

    for len in [9, 11, 0] {
        let err = engine.set_eq(&vec![0.0; len]).unwrap_err();
        assert!(matches!(err, AutoEqError::InvalidParameter { .. }));
        assert_eq!(engine.status().eq_gains, ten);
    }
}

// === Filtering ===

#[test]
fn test_active_eq_matches_filter_bank() {
    let (mut engine, backend) = engine_with(0.6);
    let input = noise_buffer(2000, 48000);
    let gains = [3.0, 0.0, -4.0, 0.2, 6.0, 0.0, -2.5, 0.0, 1.0, -9.0];

    engine.load(input.clone(), "noise").unwrap();
    engine.set_eq(&gains).unwrap();
    engine.play().unwrap();
    let output = render_to_end(&engine, &backend);

    let mut expected = input.frames().to_vec();
    let mut bank = FilterBank::new(&gains, 48000).unwrap();
    bank.apply_all(&mut expected, &gains, true);
    apply_volume_and_clip(&mut expected, 0.6);

    let expected = AudioBuffer::new(expected, 48000).to_interleaved();
    assert_eq!(&output[..expected.len()], &expected[..]);
}

#[test]
fn test_top_band_stays_stable_at_low_sample_rate() {
    let (mut engine, backend) = engine_with(1.0);
    engine
        .load(generate_test_tone(440.0, 1.0, 22050, 0.1), "low-rate")
        .unwrap();
    engine.set_eq(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 6.0]).unwrap();
    engine.play().unwrap();

    let output = render_to_end(&engine, &backend);
    let peak = output.iter().fold(0.0_f32, |acc, s| acc.max(s.abs()));
    assert!(peak < 0.11, "peak {} should stay at the input level", peak);
    assert!(peak > 0.09);
}

#[test]
fn test_disabled_eq_is_bypassed() {
    let (mut engine, backend) = engine_with(0.5);
    let input = noise_buffer(600, 44100);
    engine.load(input.clone(), "noise").unwrap();
    engine.set_eq(&[12.0; BAND_COUNT]).unwrap();
    engine.set_eq_enabled(false);
    engine.play().unwrap();

    let output = render_to_end(&engine, &backend);
    for (&out, &x) in output.iter().zip(input.to_interleaved().iter()) {
        assert_eq!(out, soft_clip(x * 0.5));
    }
    assert!(!engine.status().eq_enabled);
}

#[test]
fn test_gain_change_applies_on_next_block() {
    let (mut engine, backend) = engine_with(1.0);
    engine.load(noise_buffer(4096, 44100), "noise").unwrap();
    engine.play().unwrap();

    let flat = backend.pull_block(BLOCK).unwrap();
    engine.set_eq(&[0.0, 0.0, 0.0, 0.0, 0.0, 12.0, 0.0, 0.0, 0.0, 0.0]).unwrap();
    let boosted = backend.pull_block(BLOCK).unwrap();

    assert_eq!(flat.len(), boosted.len());
    let energy = |block: &[f32]| block.iter().map(|s| s * s).sum::<f32>();
    assert!(energy(&boosted) > energy(&flat));
}

#[test]
fn test_load_file_and_reload_resets_session() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tone.wav");
    export_wav(&generate_test_tone(440.0, 0.5, 44100, 0.5), &path).unwrap();

    let (mut engine, backend) = engine_with(0.8);
    let info = engine.load_file(&path).unwrap();
    assert_relative_eq!(info.duration_secs, 0.5, epsilon = 1e-6);

    engine.play().unwrap();
    backend.pull_block(BLOCK).unwrap();
    engine.load_file(&path).unwrap();

    let status = engine.status();
    assert_eq!(status.transport, TransportState::Stopped);
    assert_eq!(status.position_secs, 0.0);
    assert!(!backend.is_open());
    assert_eq!(status.current_file, Some(path.display().to_string()));
}

#[test]
fn test_missing_file_errors() {
    let (mut engine, _) = engine_with(0.8);
    let path = std::path::Path::new("/nonexistent/song.flac");

    assert!(matches!(engine.load_file(path), Err(AutoEqError::Decode { .. })));
    assert!(matches!(engine.analyze_file(path), Err(AutoEqError::Analysis { .. })));
    assert!(engine.status().current_file.is_none());
}

// === Concurrency ===

#[test]
fn test_control_calls_race_render_thread() {
    let (mut engine, backend) = engine_with(0.9);
    engine.load(noise_buffer(44100, 44100), "noise").unwrap();
    engine.play().unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let render = {
        let backend = backend.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut blocks = 0usize;
            while !done.load(Ordering::Acquire) {
                match backend.pull_block(64) {
                    Some(block) => {
                        assert!(block.iter().all(|s| s.abs() < 1.0));
                        blocks += 1;
                    }
                    None => thread::yield_now(),
                }
            }
            blocks
        })
    };

    for i in 0..500u32 {
        let seconds = f64::from(i * 37 % 130) / 100.0 - 0.1;
        engine.seek(seconds);
        engine.set_volume(f32::from((i % 11) as u8) / 10.0);
        let mut gains = [0.0; BAND_COUNT];
        gains[(i as usize) % BAND_COUNT] = f64::from(i % 25) - 12.0;
        engine.set_eq(&gains).unwrap();
        if i % 50 == 25 {
            engine.pause();
        }

        let status = engine.status();
        assert!(status.position_secs >= 0.0, "status: {:?}", status);
        assert!(status.position_secs <= status.duration_secs, "status: {:?}", status);
        if !status.is_playing {
            engine.play().unwrap();
        }
    }

    engine.stop();
    assert!(backend.pull_block(64).is_none());
    let status = engine.status();
    assert_eq!(status.transport, TransportState::Stopped);
    assert_eq!(status.position_secs, 0.0);

    done.store(true, Ordering::Release);
    let blocks = render.join().unwrap();
    assert!(blocks > 0);
}

#[test]
fn test_seek_never_splits_a_rendered_block() {
    const STEP: f64 = 1e-5;
    let (mut engine, backend) = engine_with(1.0);
    // Every frame carries its own index, so the source frame can be recovered
    let ramp: Vec<f32> = (0..44100).map(|i| (i as f64 * STEP) as f32).collect();
    engine.load(AudioBuffer::from_mono(&ramp, 44100), "ramp").unwrap();
    engine.set_eq_enabled(false);
    engine.play().unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let render = {
        let backend = backend.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut jumps = 0usize;
            while !done.load(Ordering::Acquire) {
                let Some(block) = backend.pull_block(128) else {
                    thread::yield_now();
                    continue;
                };
                let indices: Vec<i64> = block
                    .chunks_exact(2)
                    .map(|frame| ((frame[0] as f64).atanh() / STEP).round() as i64)
                    .collect();
                for pair in indices.windows(2) {
                    if pair[0] > 0 && pair[1] > 0 && pair[1] != pair[0] + 1 {
                        jumps += 1;
                    }
                }
            }
            jumps
        })
    };

    for i in 0..300u32 {
        engine.seek(f64::from(i * 53 % 90) / 100.0);
        if !engine.status().is_playing {
            engine.play().unwrap();
        }
        thread::yield_now();
    }

    engine.stop();
    done.store(true, Ordering::Release);
    assert_eq!(render.join().unwrap(), 0);
}

// === Properties ===

proptest! {
    #[test]
    fn prop_volume_always_clamped(v in proptest::num::f32::ANY) {
        let (engine, _) = engine_with(0.8);
        let stored = engine.set_volume(v);
        prop_assert!((0.0..=1.0).contains(&stored));
        if (0.0..=1.0).contains(&v) {
            prop_assert_eq!(stored, v);
        }
    }

    #[test]
    fn prop_seek_within_duration(seconds in -10.0_f64..10.0) {
        let (mut engine, _) = engine_with(0.8);
        engine.load(AudioBuffer::silence(22050, 44100), "half-second").unwrap();

        let position = engine.seek(seconds);
        prop_assert!(position >= 0.0);
        prop_assert!(position <= engine.status().duration_secs);
        if seconds >= 0.5 {
            prop_assert_eq!(position, 22049.0 / 44100.0);
        }
    }
}
