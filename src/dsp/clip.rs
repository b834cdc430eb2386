//! Output stage: volume and hyperbolic-tangent soft clipping

use crate::engine::buffer::Frame;

/// Largest `f32` strictly below 1.0
const CLIP_CEILING: f32 = 1.0 - f32::EPSILON / 2.0;

/// Saturate a sample smoothly into the open interval (-1, 1)
///
/// NaN maps to silence.
#[inline]
pub fn soft_clip(sample: f32) -> f32 {
    if sample.is_nan() {
        return 0.0;
    }
    ((sample as f64).tanh() as f32).clamp(-CLIP_CEILING, CLIP_CEILING)
}

/// Multiply every sample by `volume`, then soft clip it
pub fn apply_volume_and_clip(frames: &mut [Frame], volume: f32) {
    for frame in frames.iter_mut() {
        for sample in frame.iter_mut() {
            *sample = soft_clip(*sample * volume);
        }
    }
}
