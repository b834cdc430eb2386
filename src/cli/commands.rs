//! CLI Command Implementations
//!
//! Implements the actual logic for each CLI command.

use std::path::Path;

use tracing::info;

use crate::cli::EqArgs;
use crate::config::EngineConfig;
use crate::dsp::{BandGains, BAND_FREQUENCIES};
use crate::engine::{export_wav, AudioBuffer, OfflineBackend, PlaybackEngine};
use crate::error::Result;

/// Apply the requested gains (or analyzed ones) and the enable flag
fn configure_eq(engine: &PlaybackEngine, file: &Path, eq: &EqArgs) -> Result<()> {
    if eq.auto {
        let gains = engine.analyze_file(file)?;
        engine.set_eq(&gains)?;
        println!("Auto EQ: {}", format_gains(&gains));
    } else if let Some(gains) = &eq.gains {
        engine.set_eq(gains)?;
    }
    engine.set_eq_enabled(!eq.no_eq);
    Ok(())
}

fn format_gains(gains: &BandGains) -> String {
    gains
        .iter()
        .map(|g| format!("{:+.1}", g))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Play a file to the end through the default output device.
#[cfg(feature = "cpal-output")]
pub fn play(config: EngineConfig, file: &Path, eq: &EqArgs, seek: Option<f64>) -> Result<()> {
    use std::time::{Duration, Instant};

    use crate::engine::CpalBackend;

    let mut engine = PlaybackEngine::new(config, CpalBackend::new())?;
    let loaded = engine.load_file(file)?;
    println!(
        "Loaded: {} ({:.1}s @ {} Hz)",
        file.display(),
        loaded.duration_secs,
        loaded.sample_rate
    );

    configure_eq(&engine, file, eq)?;
    if let Some(seconds) = seek {
        engine.seek(seconds);
    }

    engine.play()?;

    let mut last_report = Instant::now();
    loop {
        std::thread::sleep(Duration::from_millis(100));
        let status = engine.status();
        if !status.is_playing {
            break;
        }
        if last_report.elapsed() >= Duration::from_secs(1) {
            info!(
                position_secs = %format!("{:.1}", status.position_secs),
                duration_secs = %format!("{:.1}", status.duration_secs),
                "playing"
            );
            last_report = Instant::now();
        }
    }

    engine.stop();
    println!("Finished: {}", file.display());
    Ok(())
}

/// Playback needs an audio device, which this build does not include.
#[cfg(not(feature = "cpal-output"))]
pub fn play(_config: EngineConfig, _file: &Path, _eq: &EqArgs, _seek: Option<f64>) -> Result<()> {
    Err(crate::error::AutoEqError::Device {
        reason: "built without the cpal-output feature".to_string(),
        source: None,
    })
}

/// Print the suggested gains for a file.
pub fn analyze(config: EngineConfig, file: &Path, json: bool) -> Result<()> {
    let engine = PlaybackEngine::new(config, OfflineBackend::new())?;
    let gains = engine.analyze_file(file)?;

    if json {
        let report = serde_json::json!({
            "file": file.display().to_string(),
            "eq_gains": gains,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Suggested EQ for {}:", file.display());
        for (freq, gain) in BAND_FREQUENCIES.iter().zip(gains.iter()) {
            println!("  {:>7} Hz  {:+5.1} dB", freq, gain);
        }
    }

    Ok(())
}

/// Run a file through the playback path offline and write the result.
pub fn render(config: EngineConfig, input: &Path, output: &Path, eq: &EqArgs) -> Result<()> {
    let block_frames = config.block_frames;
    let backend = OfflineBackend::new();
    let mut engine = PlaybackEngine::new(config, backend.clone())?;

    let loaded = engine.load_file(input)?;
    configure_eq(&engine, input, eq)?;
    engine.play()?;

    let total_frames = (loaded.duration_secs * loaded.sample_rate as f64).round() as usize;
    let mut rendered = Vec::with_capacity(total_frames * 2 + block_frames * 2);
    while engine.status().is_playing {
        match backend.pull_block(block_frames) {
            Some(block) => rendered.extend_from_slice(&block),
            None => break,
        }
    }
    engine.stop();

    rendered.truncate(total_frames * 2);
    let buffer = AudioBuffer::from_interleaved(&rendered, loaded.sample_rate)?;
    export_wav(&buffer, output)?;

    info!(frames = buffer.len(), peak = buffer.peak(), "render complete");
    println!("Rendered: {} -> {}", input.display(), output.display());
    Ok(())
}
