//! Audio file I/O for AutoEQ
//!
//! Decoding turns any supported file into the engine's fixed format: stereo
//! 32-bit float at the configured sample rate. Mono sources are duplicated
//! into both channels; sources with more than two channels are rejected.
//! Sample rate conversion uses linear interpolation.

use std::fs::File;
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::engine::buffer::{AudioBuffer, Frame, CHANNELS};
use crate::error::{AutoEqError, Result};

/// Turns an audio file into a stereo buffer at a fixed sample rate
pub trait AudioDecoder {
    /// Decode the whole file at `path`
    fn decode(&self, path: &Path) -> Result<AudioBuffer>;
}

/// Decoder for every container and codec symphonia is built with
#[derive(Debug, Clone)]
pub struct FileDecoder {
    target_sample_rate: u32,
}

impl FileDecoder {
    /// Create a decoder that resamples everything to `target_sample_rate`
    pub fn new(target_sample_rate: u32) -> Self {
        Self { target_sample_rate }
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }
}

impl AudioDecoder for FileDecoder {
    fn decode(&self, path: &Path) -> Result<AudioBuffer> {
        let (interleaved, channels, source_rate) = decode_interleaved(path)?;

        let buffer = match channels {
            1 => AudioBuffer::from_mono(&interleaved, source_rate),
            2 => AudioBuffer::from_interleaved(&interleaved, source_rate)?,
            n => {
                return Err(AutoEqError::decode(format!(
                    "{}-channel audio (only mono/stereo supported)",
                    n
                )))
            }
        };

        if buffer.is_empty() {
            return Err(AutoEqError::decode(format!(
                "{} contains no audio frames",
                path.display()
            )));
        }

        debug!(
            path = %path.display(),
            channels,
            source_rate,
            frames = buffer.len(),
            "decoded audio file"
        );

        Ok(resample_buffer(&buffer, self.target_sample_rate))
    }
}

/// Read every packet of the default track into interleaved f32 samples
///
/// Returns the samples, the source channel count and the source sample rate.
fn decode_interleaved(path: &Path) -> Result<(Vec<f32>, usize, u32)> {
    let file = File::open(path).map_err(|e| AutoEqError::Decode {
        reason: format!("Cannot open {}: {}", path.display(), e),
        source: Some(Box::new(e)),
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| symphonia_error("Unrecognized audio format", e))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| AutoEqError::decode("No audio track found"))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track.codec_params.channels.map(|c| c.count());

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| symphonia_error("Unsupported codec", e))?;

    let mut interleaved = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(symphonia_error("Failed to read packet", e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                if sample_rate.is_none() {
                    sample_rate = Some(spec.rate);
                }
                if channels.is_none() {
                    channels = Some(spec.channels.count());
                }

                let mut samples = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                samples.copy_interleaved_ref(decoded);
                interleaved.extend_from_slice(samples.samples());
            }
            Err(SymphoniaError::DecodeError(reason)) => {
                // Corrupt packet: drop it and keep going
                warn!(path = %path.display(), reason, "skipping undecodable packet");
            }
            Err(e) => return Err(symphonia_error("Failed to decode packet", e)),
        }
    }

    let sample_rate = sample_rate
        .filter(|&rate| rate > 0)
        .ok_or_else(|| AutoEqError::decode("Unknown sample rate"))?;
    let channels = channels
        .filter(|&count| count > 0)
        .ok_or_else(|| AutoEqError::decode("Unknown channel count"))?;

    Ok((interleaved, channels, sample_rate))
}

fn symphonia_error(context: &str, err: SymphoniaError) -> AutoEqError {
    AutoEqError::Decode {
        reason: format!("{}: {}", context, err),
        source: Some(Box::new(err)),
    }
}

/// Write a buffer as a 32-bit float stereo WAV file
pub fn export_wav(buffer: &AudioBuffer, path: &Path) -> Result<()> {
    let spec = WavSpec {
        channels: CHANNELS as u16,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, spec).map_err(hound_error)?;
    for sample in buffer.frames().iter().flatten() {
        writer.write_sample(*sample).map_err(hound_error)?;
    }
    writer.finalize().map_err(hound_error)?;

    Ok(())
}

fn hound_error(e: hound::Error) -> AutoEqError {
    match e {
        hound::Error::IoError(io) => AutoEqError::Io(io),
        other => AutoEqError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            other.to_string(),
        )),
    }
}

/// Generate a stereo sine tone with the same signal in both channels
pub fn generate_test_tone(
    frequency: f32,
    duration_secs: f32,
    sample_rate: u32,
    amplitude: f32,
) -> AudioBuffer {
    let num_frames = (duration_secs * sample_rate as f32) as usize;
    let angular_freq = 2.0 * std::f64::consts::PI * frequency as f64 / sample_rate as f64;

    let mono: Vec<f32> = (0..num_frames)
        .map(|i| (angular_freq * i as f64).sin() as f32 * amplitude)
        .collect();

    AudioBuffer::from_mono(&mono, sample_rate)
}

/// Resample a stereo buffer to `target_rate` by linear interpolation
///
/// Both channels are interpolated together, frame by frame. Source positions
/// are tracked as an exact rational (`i * source / target`), so long files do
/// not drift. Returns a copy when the rates already match.
pub fn resample_buffer(buffer: &AudioBuffer, target_rate: u32) -> AudioBuffer {
    let source_rate = buffer.sample_rate();
    if source_rate == target_rate || source_rate == 0 || target_rate == 0 {
        return AudioBuffer::new(buffer.frames().to_vec(), target_rate);
    }

    let frames = buffer.frames();
    let (source, target) = (source_rate as u64, target_rate as u64);
    let out_len = (frames.len() as u64 * target).div_ceil(source) as usize;

    let resampled: Vec<Frame> = (0..out_len as u64)
        .map(|i| {
            let position = i * source;
            let index = (position / target) as usize;
            let frac = (position % target) as f32 / target as f32;

            let current = frames[index.min(frames.len() - 1)];
            let next = frames.get(index + 1).copied().unwrap_or(current);
            [
                current[0] + (next[0] - current[0]) * frac,
                current[1] + (next[1] - current[1]) * frac,
            ]
        })
        .collect();

    AudioBuffer::new(resampled, target_rate)
}
