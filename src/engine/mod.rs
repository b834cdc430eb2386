//! Audio Engine Module
//!
//! Playback side of AutoEQ:
//! - Stereo sample buffers
//! - File decoding and WAV export
//! - Output backends (device and offline)
//! - Transport state and the real-time render callback

pub mod buffer;
pub mod io;
pub mod output;
pub mod playback;
pub mod transport;

pub use buffer::{AudioBuffer, Frame, CHANNELS};
pub use io::{export_wav, generate_test_tone, resample_buffer, AudioDecoder, FileDecoder};
#[cfg(feature = "cpal-output")]
pub use output::CpalBackend;
pub use output::{OfflineBackend, OutputBackend, OutputStream, RenderCallback, StreamConfig};
pub use playback::{render_block, LoadInfo, PlayAction, PlaybackEngine, PlaybackStatus};
pub use transport::{PlaybackState, TransportState};
