//! Transport state for the playback engine
//!
//! [`PlaybackState`] is everything the control context and the audio
//! callback share. It lives behind a single mutex owned by the engine; the
//! methods here assume the caller already holds that lock.

use std::fmt;

use serde::Serialize;

use crate::dsp::{BandGains, FilterBank, BAND_COUNT};
use crate::engine::buffer::{AudioBuffer, Frame};
use crate::error::{AutoEqError, Result};

/// Transport mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    /// Nothing is rendered and the position rests at 0 after a stop
    #[default]
    Stopped,
    /// The callback renders audio and advances the position
    Playing,
    /// The callback renders silence and holds the position
    Paused,
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Stopped => write!(f, "Stopped"),
            TransportState::Playing => write!(f, "Playing"),
            TransportState::Paused => write!(f, "Paused"),
        }
    }
}

/// Mutable session state shared with the audio callback
#[derive(Debug)]
pub struct PlaybackState {
    pub(crate) buffer: Option<AudioBuffer>,
    /// Frame index of the next frame to render
    pub(crate) position: usize,
    pub(crate) transport: TransportState,
    pub(crate) volume: f32,
    pub(crate) eq_enabled: bool,
    pub(crate) gains: BandGains,
    pub(crate) filter_bank: FilterBank,
    /// Working chunk for the callback, sized from the control context
    pub(crate) scratch: Vec<Frame>,
    pub(crate) current_file: Option<String>,
    /// Rate reported and used for filters while nothing is loaded
    default_sample_rate: u32,
}

impl PlaybackState {
    /// Fresh stopped state with flat gains
    pub fn new(
        sample_rate: u32,
        block_frames: usize,
        volume: f32,
        eq_enabled: bool,
    ) -> Result<Self> {
        let gains = [0.0; BAND_COUNT];
        let filter_bank = FilterBank::new(&gains, sample_rate)?;

        Ok(Self {
            buffer: None,
            position: 0,
            transport: TransportState::Stopped,
            volume: clamp_volume(volume, 1.0),
            eq_enabled,
            gains,
            filter_bank,
            scratch: vec![[0.0; 2]; block_frames.max(1)],
            current_file: None,
            default_sample_rate: sample_rate,
        })
    }

    /// Replace the loaded buffer and return to a stopped transport
    ///
    /// The filter bank is rebuilt for the buffer's rate before anything
    /// else changes, so a failure leaves the previous session intact.
    pub(crate) fn install(&mut self, buffer: AudioBuffer, source: Option<String>) -> Result<()> {
        self.filter_bank.reinitialize(&self.gains, buffer.sample_rate())?;

        self.buffer = Some(buffer);
        self.current_file = source;
        self.transport = TransportState::Stopped;
        self.position = 0;
        Ok(())
    }

    /// Grow the callback's working chunk to at least `frames`
    pub(crate) fn reserve_scratch(&mut self, frames: usize) {
        if self.scratch.len() < frames {
            self.scratch.resize(frames, [0.0; 2]);
        }
    }

    /// Transition to Stopped with the position rewound
    pub(crate) fn rewind_and_stop(&mut self) {
        self.transport = TransportState::Stopped;
        self.position = 0;
    }

    /// Move the position to `seconds`, clamped to the last frame
    ///
    /// NaN seeks to the start. Returns the resulting position in seconds.
    pub(crate) fn seek(&mut self, seconds: f64) -> f64 {
        let Some(buffer) = self.buffer.as_ref() else {
            return 0.0;
        };

        let last_frame = buffer.len().saturating_sub(1);
        let target = seconds * buffer.sample_rate() as f64;
        // `as` saturates: negative and NaN land on 0, huge values on usize::MAX
        self.position = (target as usize).min(last_frame);
        self.position_secs()
    }

    /// Clamp and store the volume; NaN keeps the current one
    pub(crate) fn set_volume(&mut self, volume: f32) -> f32 {
        self.volume = clamp_volume(volume, self.volume);
        self.volume
    }

    /// Validate and install new band gains
    pub(crate) fn set_gains(&mut self, gains: &[f64]) -> Result<BandGains> {
        let gains: BandGains = gains.try_into().map_err(|_| AutoEqError::InvalidParameter {
            param: "gains".to_string(),
            value: format!("{} values", gains.len()),
            expected: format!("exactly {} values", BAND_COUNT),
        })?;

        if let Some(bad) = gains.iter().find(|g| !g.is_finite()) {
            return Err(AutoEqError::InvalidParameter {
                param: "gains".to_string(),
                value: bad.to_string(),
                expected: "finite gain in dB".to_string(),
            });
        }

        self.gains = gains;
        self.filter_bank.set_gains(&gains);
        Ok(gains)
    }

    pub fn transport(&self) -> TransportState {
        self.transport
    }

    /// Frame index of the next frame to render
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn gains(&self) -> &BandGains {
        &self.gains
    }

    pub fn eq_enabled(&self) -> bool {
        self.eq_enabled
    }

    pub fn filter_bank(&self) -> &FilterBank {
        &self.filter_bank
    }

    /// Rate of the loaded buffer, or the configured rate when empty
    pub fn sample_rate(&self) -> u32 {
        self.buffer
            .as_ref()
            .map(|b| b.sample_rate())
            .unwrap_or(self.default_sample_rate)
    }

    pub fn position_secs(&self) -> f64 {
        let rate = self.sample_rate();
        if rate == 0 {
            return 0.0;
        }
        self.position as f64 / rate as f64
    }

    pub fn duration_secs(&self) -> f64 {
        self.buffer
            .as_ref()
            .map(|b| b.duration_secs())
            .unwrap_or(0.0)
    }
}

fn clamp_volume(volume: f32, fallback: f32) -> f32 {
    if volume.is_nan() {
        fallback
    } else {
        volume.clamp(0.0, 1.0)
    }
}
