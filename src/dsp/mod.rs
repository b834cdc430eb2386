//! DSP for the playback path
//!
//! Peaking biquad bands, the ten-band series bank built from them, and the
//! volume/soft-clip output stage.

mod biquad;
mod clip;
mod filter_bank;

pub use biquad::{BiquadCoefficients, BiquadFilter, FilterChannelState, GAIN_HYSTERESIS_DB};
pub use clip::{apply_volume_and_clip, soft_clip};
pub use filter_bank::{
    is_active, BandGains, EqBand, FilterBank, BAND_COUNT, BAND_FREQUENCIES, BAND_Q,
    BYPASS_THRESHOLD_DB, MAX_GAIN_DB, MIN_GAIN_DB,
};
