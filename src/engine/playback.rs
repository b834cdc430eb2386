//! Playback engine
//!
//! [`PlaybackEngine`] owns the shared [`PlaybackState`], the output stream
//! and the collaborators used to fill them. Control methods take the state
//! lock only for as long as it takes to read or write a few fields; file
//! decoding and stream setup happen outside it.
//!
//! The audio side is [`render_block`], called by the output stream once per
//! block. It holds the lock for the whole block.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::analysis::SpectralAnalyzer;
use crate::config::EngineConfig;
use crate::dsp::{apply_volume_and_clip, BandGains};
use crate::engine::buffer::{AudioBuffer, CHANNELS};
use crate::engine::io::{AudioDecoder, FileDecoder};
use crate::engine::output::{OutputBackend, OutputStream, StreamConfig};
use crate::engine::transport::{PlaybackState, TransportState};
use crate::error::{AutoEqError, Result};

/// Result of a successful load
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadInfo {
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub channels: usize,
}

/// What `play` did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayAction {
    /// A new output stream was opened
    Started,
    /// A paused session continued on the existing stream
    Resumed,
}

impl std::fmt::Display for PlayAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayAction::Started => write!(f, "started"),
            PlayAction::Resumed => write!(f, "resumed"),
        }
    }
}

/// Read-only snapshot of the session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackStatus {
    /// Audibly playing (Playing and not Paused)
    pub is_playing: bool,
    pub is_paused: bool,
    pub transport: TransportState,
    pub position_secs: f64,
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub volume: f32,
    pub eq_gains: BandGains,
    pub eq_enabled: bool,
    pub current_file: Option<String>,
}

/// Real-time EQ playback engine
pub struct PlaybackEngine {
    config: EngineConfig,
    state: Arc<Mutex<PlaybackState>>,
    backend: Box<dyn OutputBackend>,
    decoder: Box<dyn AudioDecoder>,
    analyzer: SpectralAnalyzer,
    stream: Option<Box<dyn OutputStream>>,
}

impl PlaybackEngine {
    /// Create a stopped engine with nothing loaded
    ///
    /// Files are decoded with a [`FileDecoder`] targeting the configured
    /// sample rate; see [`PlaybackEngine::with_decoder`] to replace it.
    pub fn new(config: EngineConfig, backend: impl OutputBackend + 'static) -> Result<Self> {
        config.validate()?;

        let state = PlaybackState::new(
            config.sample_rate,
            config.block_frames,
            config.initial_volume,
            config.eq_enabled,
        )?;
        let analyzer = SpectralAnalyzer::new(config.analysis.clone())?;

        Ok(Self {
            decoder: Box::new(FileDecoder::new(config.sample_rate)),
            config,
            state: Arc::new(Mutex::new(state)),
            backend: Box::new(backend),
            analyzer,
            stream: None,
        })
    }

    /// Replace the decoder used by [`PlaybackEngine::load_file`]
    pub fn with_decoder(mut self, decoder: impl AudioDecoder + 'static) -> Self {
        self.decoder = Box::new(decoder);
        self
    }

    fn lock(&self) -> MutexGuard<'_, PlaybackState> {
        lock_state(&self.state)
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Install a decoded buffer, stopping whatever was playing
    ///
    /// The output stream is torn down before the buffer is swapped, so no
    /// callback ever sees the new buffer with the old filter rate.
    pub fn load(&mut self, buffer: AudioBuffer, source: impl Into<String>) -> Result<LoadInfo> {
        if buffer.sample_rate() == 0 {
            return Err(AutoEqError::decode("buffer has a sample rate of 0"));
        }
        if !buffer.is_finite() {
            return Err(AutoEqError::decode("buffer contains non-finite samples"));
        }

        self.release_stream();

        let info = LoadInfo {
            duration_secs: buffer.duration_secs(),
            sample_rate: buffer.sample_rate(),
            channels: buffer.channels(),
        };
        let source = source.into();

        let mut state = self.lock();
        state.install(buffer, Some(source.clone()))?;
        state.reserve_scratch(self.config.block_frames);
        drop(state);

        info!(
            source = %source,
            duration_secs = info.duration_secs,
            sample_rate = info.sample_rate,
            "loaded audio"
        );
        Ok(info)
    }

    /// Decode `path` and load it
    pub fn load_file(&mut self, path: &Path) -> Result<LoadInfo> {
        let buffer = self.decoder.decode(path)?;
        self.load(buffer, path.display().to_string())
    }

    // ========================================================================
    // Transport
    // ========================================================================

    /// Start or resume playback
    ///
    /// From Paused the existing stream simply continues. Otherwise any open
    /// stream is released and a new one is opened; if that fails the
    /// transport stays Stopped.
    pub fn play(&mut self) -> Result<PlayAction> {
        {
            let mut state = self.lock();
            if state.buffer.is_none() {
                return Err(AutoEqError::NotLoaded);
            }
            if state.transport == TransportState::Paused {
                state.transport = TransportState::Playing;
                debug!(position_secs = state.position_secs(), "resumed");
                return Ok(PlayAction::Resumed);
            }
        }

        self.release_stream();

        let sample_rate = {
            let mut state = self.lock();
            state.reserve_scratch(self.config.block_frames);
            state.transport = TransportState::Playing;
            state.sample_rate()
        };

        let stream_config = StreamConfig {
            sample_rate,
            channels: CHANNELS as u16,
            block_frames: self.config.block_frames,
        };
        let shared = Arc::clone(&self.state);
        let callback = Box::new(move |out: &mut [f32]| render_block(&shared, out));

        match self.backend.open(stream_config, callback) {
            Ok(stream) => {
                self.stream = Some(stream);
                debug!(sample_rate, "playback started");
                Ok(PlayAction::Started)
            }
            Err(err) => {
                self.lock().transport = TransportState::Stopped;
                warn!(%err, "could not open output stream");
                Err(err)
            }
        }
    }

    /// Pause playback; a no-op unless Playing
    pub fn pause(&self) {
        let mut state = self.lock();
        if state.transport == TransportState::Playing {
            state.transport = TransportState::Paused;
            debug!(position_secs = state.position_secs(), "paused");
        }
    }

    /// Stop playback, rewind to the start and release the output stream
    pub fn stop(&mut self) {
        self.lock().rewind_and_stop();
        self.release_stream();
        debug!("stopped");
    }

    /// Move the playhead; returns the clamped position in seconds
    pub fn seek(&self, seconds: f64) -> f64 {
        let position = self.lock().seek(seconds);
        debug!(requested = seconds, position_secs = position, "seek");
        position
    }

    // ========================================================================
    // Parameters
    // ========================================================================

    /// Set the output volume, clamped to 0..=1; returns the stored value
    pub fn set_volume(&self, volume: f32) -> f32 {
        self.lock().set_volume(volume)
    }

    /// Replace all ten band gains (dB)
    ///
    /// Anything but exactly ten finite values is rejected and the previous
    /// gains stay in effect.
    pub fn set_eq(&self, gains: &[f64]) -> Result<BandGains> {
        let gains = self.lock().set_gains(gains)?;
        debug!(?gains, "eq updated");
        Ok(gains)
    }

    pub fn set_eq_enabled(&self, enabled: bool) {
        self.lock().eq_enabled = enabled;
        debug!(enabled, "eq toggled");
    }

    pub fn status(&self) -> PlaybackStatus {
        let state = self.lock();
        PlaybackStatus {
            is_playing: state.transport == TransportState::Playing,
            is_paused: state.transport == TransportState::Paused,
            transport: state.transport,
            position_secs: state.position_secs(),
            duration_secs: state.duration_secs(),
            sample_rate: state.sample_rate(),
            volume: state.volume,
            eq_gains: state.gains,
            eq_enabled: state.eq_enabled,
            current_file: state.current_file.clone(),
        }
    }

    // ========================================================================
    // Analysis
    // ========================================================================

    /// Suggest gains for `buffer`; does not touch the session
    pub fn analyze(&self, buffer: &AudioBuffer) -> Result<BandGains> {
        self.analyzer.analyze(buffer).map_err(AutoEqError::into_analysis)
    }

    /// Decode `path` and suggest gains for it
    pub fn analyze_file(&self, path: &Path) -> Result<BandGains> {
        let buffer = self
            .decoder
            .decode(path)
            .map_err(AutoEqError::into_analysis)?;
        let gains = self.analyze(&buffer)?;
        info!(path = %path.display(), ?gains, "analysis complete");
        Ok(gains)
    }

    /// Release the output stream, logging instead of failing
    fn release_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(err) = stream.stop() {
                warn!(%err, "failed to release output stream");
            }
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.release_stream();
    }
}

fn lock_state(state: &Mutex<PlaybackState>) -> MutexGuard<'_, PlaybackState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fill one interleaved stereo output block
///
/// Renders silence unless Playing. Reaching the end of the buffer zero-pads
/// the rest of the block and leaves the transport Stopped at position 0.
/// Never allocates.
pub fn render_block(state: &Mutex<PlaybackState>, out: &mut [f32]) {
    let mut guard = lock_state(state);
    let PlaybackState {
        buffer,
        position,
        transport,
        volume,
        eq_enabled,
        gains,
        filter_bank,
        scratch,
        ..
    } = &mut *guard;

    let requested = out.len() / CHANNELS;
    let source = match buffer.as_ref() {
        Some(buffer) if *transport == TransportState::Playing => buffer.frames(),
        _ => {
            out.fill(0.0);
            return;
        }
    };

    let start = *position;
    let end = start.saturating_add(requested).min(source.len());
    if end <= start {
        out.fill(0.0);
        *transport = TransportState::Stopped;
        *position = 0;
        debug!("end of track");
        return;
    }

    let mut written = 0;
    for piece in source[start..end].chunks(scratch.len()) {
        let chunk = &mut scratch[..piece.len()];
        chunk.copy_from_slice(piece);
        filter_bank.apply_all(chunk, gains, *eq_enabled);
        apply_volume_and_clip(chunk, *volume);

        let dst = &mut out[written * CHANNELS..(written + piece.len()) * CHANNELS];
        for (frame, slot) in chunk.iter().zip(dst.chunks_exact_mut(CHANNELS)) {
            slot.copy_from_slice(frame);
        }
        written += piece.len();
    }
    out[written * CHANNELS..].fill(0.0);

    if written < requested {
        *transport = TransportState::Stopped;
        *position = 0;
        debug!("end of track");
    } else {
        *position = end;
    }
}
