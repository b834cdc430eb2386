//! Ten-band Filter Bank
//!
//! Fixed-frequency peaking bands applied in series from the lowest band to
//! the highest. Bands with a negligible gain are skipped, and the whole bank
//! is bypassed when every gain is negligible.

use serde::{Deserialize, Serialize};

use super::biquad::BiquadFilter;
use crate::engine::buffer::Frame;
use crate::error::Result;

/// Number of EQ bands
pub const BAND_COUNT: usize = 10;

/// Center frequency of each band, in Hz
pub const BAND_FREQUENCIES: [f64; BAND_COUNT] = [
    20.0, 60.0, 125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0,
];

/// Q of each band (wider at the extremes)
pub const BAND_Q: [f64; BAND_COUNT] = [0.7, 0.8, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.8, 0.7];

/// Gains with magnitude at or below this (dB) have no audible effect
pub const BYPASS_THRESHOLD_DB: f64 = 0.5;

/// Conventional gain range for a band, in dB
pub const MIN_GAIN_DB: f64 = -12.0;
pub const MAX_GAIN_DB: f64 = 12.0;

/// Gain vector covering every band, lowest frequency first
pub type BandGains = [f64; BAND_COUNT];

/// Description of one band as exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EqBand {
    /// Center frequency in Hz
    pub frequency: f64,
    /// Quality factor
    pub q: f64,
    /// Gain in dB
    #[serde(rename = "gain_db")]
    pub gain_db: f64,
}

/// Returns true if applying `gains` would change the signal
pub fn is_active(gains: &BandGains) -> bool {
    gains.iter().any(|g| g.abs() > BYPASS_THRESHOLD_DB)
}

/// Series bank of [`BAND_COUNT`] peaking filters
#[derive(Debug, Clone)]
pub struct FilterBank {
    filters: Vec<BiquadFilter>,
    sample_rate: u32,
}

impl FilterBank {
    /// Build all bands for `sample_rate` starting from `gains`
    pub fn new(gains: &BandGains, sample_rate: u32) -> Result<Self> {
        let filters = BAND_FREQUENCIES
            .iter()
            .zip(BAND_Q.iter())
            .zip(gains.iter())
            .map(|((&freq, &q), &gain)| BiquadFilter::new(freq, gain, q, sample_rate))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            filters,
            sample_rate,
        })
    }

    /// Rebuild every band for a new sample rate
    ///
    /// All channel state is discarded and coefficients are recomputed from
    /// `gains`. On error the existing bank is left as it was.
    pub fn reinitialize(&mut self, gains: &BandGains, sample_rate: u32) -> Result<()> {
        *self = Self::new(gains, sample_rate)?;
        Ok(())
    }

    /// Push new target gains into each band
    ///
    /// Each band applies its own hysteresis, so tiny moves are ignored.
    /// Returns the number of bands whose coefficients changed.
    pub fn set_gains(&mut self, gains: &BandGains) -> usize {
        let mut changed = 0;
        for (filter, &gain) in self.filters.iter_mut().zip(gains.iter()) {
            if filter.set_gain(gain) {
                changed += 1;
            }
        }
        changed
    }

    /// Run the bank over `frames` in place
    ///
    /// `gains` decides the whole-bank bypass; the per-band skip uses each
    /// band's effective (post-hysteresis) gain.
    pub fn apply_all(&mut self, frames: &mut [Frame], gains: &BandGains, enabled: bool) {
        if !enabled || !is_active(gains) {
            return;
        }

        for filter in self.filters.iter_mut() {
            if filter.gain_db().abs() > BYPASS_THRESHOLD_DB && filter.is_representable() {
                filter.process_block(frames);
            }
        }
    }

    /// Current band layout with effective gains
    pub fn bands(&self) -> Vec<EqBand> {
        self.filters
            .iter()
            .map(|f| EqBand {
                frequency: f.frequency(),
                q: f.q(),
                gain_db: f.gain_db(),
            })
            .collect()
    }

    pub fn filters(&self) -> &[BiquadFilter] {
        &self.filters
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::FilterChannelState;
    use std::f64::consts::PI;

    fn noise_frames(len: usize) -> Vec<Frame> {
        // Deterministic pseudo-random signal
        let mut seed: u32 = 0x1234_5678;
        (0..len)
            .map(|_| {
                seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                let l = (seed >> 8) as f32 / (1u32 << 24) as f32 - 0.5;
                seed = seed.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                let r = (seed >> 8) as f32 / (1u32 << 24) as f32 - 0.5;
                [l, r]
            })
            .collect()
    }

    #[test]
    fn test_bank_has_ten_bands_in_order() {
        let bank = FilterBank::new(&[0.0; BAND_COUNT], 44100).unwrap();
        assert_eq!(bank.len(), BAND_COUNT);
        let freqs: Vec<f64> = bank.bands().iter().map(|b| b.frequency).collect();
        assert_eq!(freqs, BAND_FREQUENCIES.to_vec());
        assert_eq!(bank.bands()[0].q, 0.7);
        assert_eq!(bank.bands()[8].q, 0.8);
    }

    #[test]
    fn test_disabled_bank_is_bypassed() {
        let gains = [6.0; BAND_COUNT];
        let mut bank = FilterBank::new(&gains, 44100).unwrap();
        let input = noise_frames(1024);
        let mut output = input.clone();
        bank.apply_all(&mut output, &gains, false);
        assert_eq!(input, output);
    }

    #[test]
    fn test_small_gains_bypass_bank() {
        let gains = [0.5, -0.5, 0.3, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, -0.2];
        let mut bank = FilterBank::new(&gains, 44100).unwrap();
        let input = noise_frames(1024);
        let mut output = input.clone();
        bank.apply_all(&mut output, &gains, true);
        assert_eq!(input, output);
        // No band ran, so no state was accumulated
        for filter in bank.filters() {
            assert_eq!(filter.channel_states()[0], FilterChannelState::default());
        }
    }

    #[test]
    fn test_inactive_bands_are_skipped() {
        let mut gains = [0.0; BAND_COUNT];
        gains[5] = 6.0;
        let mut bank = FilterBank::new(&gains, 44100).unwrap();
        let mut frames = noise_frames(256);
        bank.apply_all(&mut frames, &gains, true);

        for (i, filter) in bank.filters().iter().enumerate() {
            let touched = filter.channel_states()[0] != FilterChannelState::default();
            assert_eq!(touched, i == 5, "band {} state mismatch", i);
        }
    }

    #[test]
    fn test_series_matches_manual_cascade() {
        let gains = [3.0, 0.0, -4.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.0, -2.0];
        let mut bank = FilterBank::new(&gains, 48000).unwrap();
        let input = noise_frames(2000);
        let mut actual = input.clone();
        bank.apply_all(&mut actual, &gains, true);

        let mut expected = input.clone();
        for band in [0, 2, 5, 9] {
            let mut f = BiquadFilter::new(BAND_FREQUENCIES[band], gains[band], BAND_Q[band], 48000)
                .unwrap();
            f.process_block(&mut expected);
        }
        assert_eq!(expected, actual);
    }

    #[test]
    fn test_set_gains_applies_hysteresis_per_band() {
        let mut bank = FilterBank::new(&[0.0; BAND_COUNT], 44100).unwrap();
        let mut gains = [0.0; BAND_COUNT];
        gains[0] = 0.05;
        gains[3] = 2.0;
        gains[7] = -3.0;
        assert_eq!(bank.set_gains(&gains), 2);
        assert_eq!(bank.filters()[0].gain_db(), 0.0);
        assert_eq!(bank.filters()[3].gain_db(), 2.0);
    }

    #[test]
    fn test_reinitialize_discards_state() {
        let gains = [4.0; BAND_COUNT];
        let mut bank = FilterBank::new(&gains, 44100).unwrap();
        let mut frames = noise_frames(512);
        bank.apply_all(&mut frames, &gains, true);

        bank.reinitialize(&gains, 48000).unwrap();
        assert_eq!(bank.sample_rate(), 48000);
        for filter in bank.filters() {
            assert_eq!(filter.channel_states()[0], FilterChannelState::default());
            assert_eq!(filter.gain_db(), 4.0);
        }
    }

    #[test]
    fn test_top_band_skipped_at_low_sample_rate() {
        let mut gains = [0.0; BAND_COUNT];
        gains[9] = 6.0;
        let mut bank = FilterBank::new(&gains, 22050).unwrap();
        let input = noise_frames(4096);
        let mut output = input.clone();
        bank.apply_all(&mut output, &gains, true);

        assert_eq!(input, output);
        assert_eq!(bank.filters()[9].channel_states()[0], FilterChannelState::default());
    }

    #[test]
    fn test_boost_is_audible_at_band_center() {
        let mut gains = [0.0; BAND_COUNT];
        gains[6] = 12.0;
        let mut bank = FilterBank::new(&gains, 44100).unwrap();
        let mut frames: Vec<Frame> = (0..44100)
            .map(|i| {
                let s = (2.0 * PI * 2000.0 * i as f64 / 44100.0).sin() as f32 * 0.1;
                [s, s]
            })
            .collect();
        let input_peak = 0.1_f32;
        bank.apply_all(&mut frames, &gains, true);
        let out_peak = frames[22050..].iter().map(|f| f[0].abs()).fold(0.0, f32::max);
        let gain_db = 20.0 * (out_peak / input_peak).log10();
        assert!((gain_db - 12.0).abs() < 0.3, "Expected +12 dB, got {:.2}", gain_db);
    }
}
