//! Peaking Biquad Filter
//!
//! One band of the equalizer: a second-order IIR section whose coefficients
//! come from the Audio EQ Cookbook peaking form, run per sample in Direct
//! Form II with an independent delay pair for each stereo channel.

use std::f64::consts::PI;

use crate::engine::buffer::{Frame, CHANNELS};
use crate::error::{AutoEqError, Result};

/// Gain changes at or below this size (dB) leave the coefficients untouched
pub const GAIN_HYSTERESIS_DB: f64 = 0.1;

/// Biquad filter coefficients
/// Transfer function: H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
/// Normalized: all coefficients divided by a0
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoefficients {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoefficients {
    /// Pass-through section
    pub const IDENTITY: Self = BiquadCoefficients {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// Calculate peaking EQ coefficients using Audio EQ Cookbook formulas
    /// Reference: https://www.w3.org/2011/audio/audio-eq-cookbook.html
    pub fn peaking(frequency: f64, gain_db: f64, q: f64, sample_rate: f64) -> Self {
        let a = 10.0_f64.powf(gain_db / 40.0);
        let w0 = 2.0 * PI * frequency / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        let b0 = 1.0 + alpha * a;
        let b1 = -2.0 * cos_w0;
        let b2 = 1.0 - alpha * a;
        let a0 = 1.0 + alpha / a;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha / a;

        // Normalize by a0
        BiquadCoefficients {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Peaking coefficients for a band that may not fit under Nyquist
    ///
    /// A center frequency at or above `sample_rate / 2` would wrap w0 past pi
    /// and put a pole outside the unit circle, so such bands pass through.
    pub fn peaking_or_identity(frequency: f64, gain_db: f64, q: f64, sample_rate: f64) -> Self {
        if frequency >= sample_rate / 2.0 {
            Self::IDENTITY
        } else {
            Self::peaking(frequency, gain_db, q, sample_rate)
        }
    }

    /// Check if the numerator matches the denominator, i.e. H(z) = 1
    pub fn is_identity(&self, tolerance: f64) -> bool {
        (self.b0 - 1.0).abs() <= tolerance
            && (self.b1 - self.a1).abs() <= tolerance
            && (self.b2 - self.a2).abs() <= tolerance
    }
}

/// Delay elements for one channel
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FilterChannelState {
    pub z1: f64,
    pub z2: f64,
}

impl FilterChannelState {
    /// Process a single sample
    /// Direct Form II implementation
    #[inline]
    fn process(&mut self, input: f64, c: &BiquadCoefficients) -> f64 {
        let w = input - c.a1 * self.z1 - c.a2 * self.z2;
        let output = c.b0 * w + c.b1 * self.z1 + c.b2 * self.z2;

        // Shift delay line
        self.z2 = self.z1;
        self.z1 = w;

        output
    }
}

/// Stateful peaking EQ band
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    frequency: f64,
    gain_db: f64,
    q: f64,
    sample_rate: f64,
    coeffs: BiquadCoefficients,
    states: [FilterChannelState; CHANNELS],
}

impl BiquadFilter {
    /// Create a band at `frequency` Hz with the given gain, Q and sample rate
    ///
    /// Fails with `InvalidParameter` if the sample rate or Q is not positive,
    /// or the frequency is not positive.
    ///
    /// # Example
    /// ```
    /// use autoeq::dsp::BiquadFilter;
    ///
    /// let filter = BiquadFilter::new(1000.0, 0.0, 1.0, 44100).unwrap();
    /// assert!(filter.coefficients().is_identity(1e-12));
    /// ```
    pub fn new(frequency: f64, gain_db: f64, q: f64, sample_rate: u32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(AutoEqError::InvalidParameter {
                param: "sample_rate".to_string(),
                value: sample_rate.to_string(),
                expected: "> 0 Hz".to_string(),
            });
        }
        if !(q > 0.0) {
            return Err(AutoEqError::InvalidParameter {
                param: "q".to_string(),
                value: q.to_string(),
                expected: "> 0".to_string(),
            });
        }
        if !(frequency > 0.0) {
            return Err(AutoEqError::InvalidParameter {
                param: "frequency".to_string(),
                value: frequency.to_string(),
                expected: "> 0 Hz".to_string(),
            });
        }

        let sample_rate = sample_rate as f64;
        Ok(Self {
            frequency,
            gain_db,
            q,
            sample_rate,
            coeffs: BiquadCoefficients::peaking_or_identity(frequency, gain_db, q, sample_rate),
            states: [FilterChannelState::default(); CHANNELS],
        })
    }

    /// Update the band gain
    ///
    /// Coefficients are only recomputed when the gain moves by more than
    /// [`GAIN_HYSTERESIS_DB`]. The new coefficients apply from the next
    /// processed sample; there is no ramp. Returns whether they changed.
    pub fn set_gain(&mut self, gain_db: f64) -> bool {
        if (gain_db - self.gain_db).abs() > GAIN_HYSTERESIS_DB {
            self.gain_db = gain_db;
            self.coeffs = BiquadCoefficients::peaking_or_identity(
                self.frequency,
                gain_db,
                self.q,
                self.sample_rate,
            );
            true
        } else {
            false
        }
    }

    /// Filter a block of stereo frames in place, in frame order
    pub fn process_block(&mut self, frames: &mut [Frame]) {
        let coeffs = self.coeffs;
        let [left, right] = &mut self.states;

        for frame in frames.iter_mut() {
            frame[0] = left.process(frame[0] as f64, &coeffs) as f32;
            frame[1] = right.process(frame[1] as f64, &coeffs) as f32;
        }
    }

    /// Whether the center frequency is below Nyquist and the band can act
    pub fn is_representable(&self) -> bool {
        self.frequency < self.sample_rate / 2.0
    }

    /// Clear the delay elements of both channels
    pub fn reset(&mut self) {
        self.states = [FilterChannelState::default(); CHANNELS];
    }

    /// Effective gain in dB (the last value that passed the hysteresis check)
    pub fn gain_db(&self) -> f64 {
        self.gain_db
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn q(&self) -> f64 {
        self.q
    }

    pub fn coefficients(&self) -> &BiquadCoefficients {
        &self.coeffs
    }

    /// Per-channel delay state, left then right
    pub fn channel_states(&self) -> &[FilterChannelState; CHANNELS] {
        &self.states
    }
}
