//! Spectral auto-EQ analysis
//!
//! Averages an STFT magnitude spectrum over the start of a track, expresses
//! it in dB relative to its own peak, normalizes it to 0..1 and turns the
//! energy around each band center into a corrective gain: bands that are
//! already loud get cut, quiet ones get boosted.
//!
//! The STFT centers every frame (zero-padding half a window on both sides)
//! and uses a periodic Hann window, so frame `t` covers input samples
//! `t * hop - window / 2 .. t * hop + window / 2`.

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::dsp::{BandGains, BAND_COUNT, BAND_FREQUENCIES, MAX_GAIN_DB, MIN_GAIN_DB};
use crate::engine::buffer::AudioBuffer;
use crate::error::{AutoEqError, Result};

/// Half-width of each band's averaging window, relative to its center
pub const BAND_WINDOW_RATIO: f64 = 0.3;

/// Energy assumed for a band whose window holds no spectral bins
pub const NEUTRAL_ENERGY: f64 = 0.5;

/// Normalized energy that maps to 0 dB
pub const TARGET_ENERGY: f64 = 0.4;

/// dB of gain per unit of normalized energy above the target
pub const GAIN_SLOPE: f64 = -8.0;

/// Added to the normalization range so a flat spectrum does not divide by zero
const NORMALIZE_EPSILON: f64 = 1e-8;

/// Amplitude floor before conversion to dB
const AMPLITUDE_FLOOR: f64 = 1e-5;

/// Dynamic range kept below the spectrum's peak
const TOP_DB: f64 = 80.0;

/// Offline analyzer producing a ten-band gain suggestion
pub struct SpectralAnalyzer {
    config: AnalysisConfig,
    window: Vec<f64>,
    fft: Arc<dyn Fft<f64>>,
}

impl SpectralAnalyzer {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        if config.window_size < 2 || !config.window_size.is_power_of_two() {
            return Err(AutoEqError::InvalidParameter {
                param: "window_size".to_string(),
                value: config.window_size.to_string(),
                expected: "power of two of at least 2".to_string(),
            });
        }
        if config.hop_size == 0 {
            return Err(AutoEqError::InvalidParameter {
                param: "hop_size".to_string(),
                value: "0".to_string(),
                expected: "at least 1".to_string(),
            });
        }

        let n = config.window_size;
        let window = (0..n)
            .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / n as f64).cos())
            .collect();
        let fft = FftPlanner::new().plan_fft_forward(n);

        Ok(Self {
            config,
            window,
            fft,
        })
    }

    /// Suggest gains for a stereo buffer (analyzed as a mono mix)
    pub fn analyze(&self, buffer: &AudioBuffer) -> Result<BandGains> {
        self.analyze_samples(&buffer.to_mono(), buffer.sample_rate())
    }

    /// Suggest gains for mono samples at `sample_rate`
    ///
    /// Only the first `max_duration_secs` of the signal are used. Every
    /// gain lies in the allowed range and is rounded to 0.1 dB.
    pub fn analyze_samples(&self, samples: &[f32], sample_rate: u32) -> Result<BandGains> {
        if sample_rate == 0 {
            return Err(AutoEqError::analysis("sample rate is 0"));
        }
        if samples.is_empty() {
            return Err(AutoEqError::analysis("signal is empty"));
        }
        if samples.iter().any(|s| !s.is_finite()) {
            return Err(AutoEqError::analysis("signal contains non-finite samples"));
        }

        let limit = (self.config.max_duration_secs * sample_rate as f64) as usize;
        let samples = &samples[..samples.len().min(limit.max(1))];

        let magnitudes = self.average_magnitude(samples);
        let normalized = normalize(&amplitude_to_db(&magnitudes));
        let bin_hz = sample_rate as f64 / self.config.window_size as f64;

        let mut gains = [0.0; BAND_COUNT];
        for (gain, &center) in gains.iter_mut().zip(BAND_FREQUENCIES.iter()) {
            let energy = band_energy(&normalized, bin_hz, center);
            *gain = gain_for_energy(energy);
        }

        debug!(
            frames = samples.len(),
            sample_rate,
            ?gains,
            "spectral analysis complete"
        );
        Ok(gains)
    }

    /// Mean STFT magnitude per bin, for bins `0..=window_size / 2`
    fn average_magnitude(&self, samples: &[f32]) -> Vec<f64> {
        let n = self.config.window_size;
        let hop = self.config.hop_size;
        let pad = n / 2;
        let bins = n / 2 + 1;
        let frame_count = 1 + samples.len() / hop;

        let mut frame = vec![Complex::new(0.0, 0.0); n];
        let mut scratch = vec![Complex::new(0.0, 0.0); self.fft.get_inplace_scratch_len()];
        let mut sums = vec![0.0; bins];

        for t in 0..frame_count {
            let start = t * hop;
            for (i, (slot, &w)) in frame.iter_mut().zip(self.window.iter()).enumerate() {
                let sample = (start + i)
                    .checked_sub(pad)
                    .and_then(|idx| samples.get(idx))
                    .copied()
                    .unwrap_or(0.0);
                *slot = Complex::new(sample as f64 * w, 0.0);
            }

            self.fft.process_with_scratch(&mut frame, &mut scratch);

            for (sum, bin) in sums.iter_mut().zip(frame.iter()) {
                *sum += bin.norm();
            }
        }

        for sum in sums.iter_mut() {
            *sum /= frame_count as f64;
        }
        sums
    }
}

/// Magnitudes to dB relative to the largest one, floored `TOP_DB` below it
fn amplitude_to_db(magnitudes: &[f64]) -> Vec<f64> {
    let floor_power = AMPLITUDE_FLOOR * AMPLITUDE_FLOOR;
    let peak = magnitudes.iter().copied().fold(0.0_f64, f64::max);
    let reference_db = 10.0 * (peak * peak).max(floor_power).log10();

    let db: Vec<f64> = magnitudes
        .iter()
        .map(|m| 10.0 * (m * m).max(floor_power).log10() - reference_db)
        .collect();

    let top = db.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    db.into_iter().map(|d| d.max(top - TOP_DB)).collect()
}

/// Min-max normalize to 0..1
fn normalize(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min + NORMALIZE_EPSILON;
    values.iter().map(|v| (v - min) / range).collect()
}

/// Mean normalized energy of the bins within ±30% of `center`
fn band_energy(normalized: &[f64], bin_hz: f64, center: f64) -> f64 {
    let half_width = center * BAND_WINDOW_RATIO;
    let (low, high) = (center - half_width, center + half_width);

    let (sum, count) = normalized
        .iter()
        .enumerate()
        .filter(|(k, _)| {
            let freq = *k as f64 * bin_hz;
            freq >= low && freq <= high
        })
        .fold((0.0, 0usize), |(sum, count), (_, e)| (sum + e, count + 1));

    if count == 0 {
        NEUTRAL_ENERGY
    } else {
        sum / count as f64
    }
}

/// Map normalized band energy to a gain in dB, rounded to 0.1 dB
///
/// Halfway cases round to the even tenth.
pub fn gain_for_energy(energy: f64) -> f64 {
    let gain = (GAIN_SLOPE * (energy - TARGET_ENERGY)).clamp(MIN_GAIN_DB, MAX_GAIN_DB);
    (gain * 10.0).round_ties_even() / 10.0
}
