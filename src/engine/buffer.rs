//! Audio Buffer
//!
//! Decoded audio as it is held by the playback state: interleaved-by-frame
//! stereo `f32` samples plus the rate they were decoded at.

use crate::error::{AutoEqError, Result};

/// Number of channels every loaded buffer carries
pub const CHANNELS: usize = 2;

/// One stereo sample frame: `[left, right]`
pub type Frame = [f32; CHANNELS];

/// Decoded stereo audio owned by the engine once loaded
///
/// # Example
/// ```
/// use autoeq::engine::AudioBuffer;
///
/// let buffer = AudioBuffer::from_interleaved(&[0.1, -0.1, 0.2, -0.2], 44100).unwrap();
/// assert_eq!(buffer.len(), 2);
/// assert_eq!(buffer.frames()[1], [0.2, -0.2]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    frames: Vec<Frame>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Create a buffer from stereo frames
    pub fn new(frames: Vec<Frame>, sample_rate: u32) -> Self {
        Self {
            frames,
            sample_rate,
        }
    }

    /// Create a silent buffer with `num_frames` frames
    pub fn silence(num_frames: usize, sample_rate: u32) -> Self {
        Self::new(vec![[0.0; CHANNELS]; num_frames], sample_rate)
    }

    /// Create a buffer from interleaved stereo data (L, R, L, R, ...)
    pub fn from_interleaved(interleaved: &[f32], sample_rate: u32) -> Result<Self> {
        if interleaved.len() % CHANNELS != 0 {
            return Err(AutoEqError::decode(format!(
                "Interleaved data length {} is not divisible by channel count {}",
                interleaved.len(),
                CHANNELS
            )));
        }

        let frames = interleaved
            .chunks_exact(CHANNELS)
            .map(|pair| [pair[0], pair[1]])
            .collect();

        Ok(Self::new(frames, sample_rate))
    }

    /// Create a buffer from a mono signal, duplicating it into both channels
    pub fn from_mono(samples: &[f32], sample_rate: u32) -> Self {
        Self::new(samples.iter().map(|&s| [s, s]).collect(), sample_rate)
    }

    /// Create a buffer from separate left and right channels
    ///
    /// The shorter channel determines the length.
    pub fn from_channels(left: &[f32], right: &[f32], sample_rate: u32) -> Self {
        Self::new(
            left.iter().zip(right).map(|(&l, &r)| [l, r]).collect(),
            sample_rate,
        )
    }

    /// Convert the buffer to interleaved format
    pub fn to_interleaved(&self) -> Vec<f32> {
        self.frames.iter().flatten().copied().collect()
    }

    /// Average both channels into a mono signal
    pub fn to_mono(&self) -> Vec<f32> {
        self.frames.iter().map(|[l, r]| (l + r) * 0.5).collect()
    }

    /// Stereo frames
    #[inline]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Number of frames
    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Check if the buffer has no frames
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Sample rate in Hz
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count (always stereo)
    #[inline]
    pub fn channels(&self) -> usize {
        CHANNELS
    }

    /// Get the duration in seconds
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    /// Peak absolute sample value across both channels
    pub fn peak(&self) -> f32 {
        self.frames
            .iter()
            .flatten()
            .map(|s| s.abs())
            .fold(0.0_f32, f32::max)
    }

    /// Check that every sample is a finite number
    pub fn is_finite(&self) -> bool {
        self.frames.iter().flatten().all(|s| s.is_finite())
    }
}
