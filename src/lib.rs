//! AutoEQ - real-time parametric EQ playback with spectral auto-EQ
//!
//! AutoEQ streams decoded audio to an output device through a ten-band
//! peaking filter bank whose gains can change while audio is playing, and
//! can suggest those gains by analyzing a track's spectrum.
//!
//! # Architecture
//!
//! - [`dsp`]: biquad bands, the series filter bank and the soft-clip output stage
//! - [`engine`]: buffers, decoding, output backends and the playback state machine
//! - [`analysis`]: STFT-based gain suggestions
//! - [`config`]: engine and analysis settings
//!
//! ```no_run
//! use autoeq::config::EngineConfig;
//! use autoeq::engine::{OfflineBackend, PlaybackEngine};
//!
//! let mut engine = PlaybackEngine::new(EngineConfig::default(), OfflineBackend::new())?;
//! engine.load_file(std::path::Path::new("song.flac"))?;
//! let gains = engine.analyze_file(std::path::Path::new("song.flac"))?;
//! engine.set_eq(&gains)?;
//! engine.play()?;
//! # Ok::<(), autoeq::AutoEqError>(())
//! ```

pub mod analysis;
pub mod cli;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;

pub use error::{AutoEqError, Result};
