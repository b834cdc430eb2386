//! Audio output boundary
//!
//! The engine never talks to a sound card directly. It hands a render
//! callback to an [`OutputBackend`], which calls it once per block with an
//! interleaved stereo buffer to fill, until the returned [`OutputStream`] is
//! stopped or dropped.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::Result;

/// Callback invoked per block with an interleaved stereo buffer to fill
pub type RenderCallback = Box<dyn FnMut(&mut [f32]) + Send + 'static>;

/// Parameters for opening an output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames per callback invocation
    pub block_frames: usize,
}

/// A running output stream
pub trait OutputStream {
    /// Stop calling the render callback and release the device
    ///
    /// Must be idempotent. Dropping the stream releases it as well.
    fn stop(&mut self) -> Result<()>;
}

/// Something that can open output streams
pub trait OutputBackend {
    /// Open a stream that repeatedly invokes `callback` until stopped
    fn open(&self, config: StreamConfig, callback: RenderCallback) -> Result<Box<dyn OutputStream>>;
}

// ============================================================================
// Offline backend
// ============================================================================

#[derive(Default)]
struct OfflineSlot {
    callback: Option<RenderCallback>,
    config: Option<StreamConfig>,
    generation: u64,
}

/// Device-less backend driven by the caller
///
/// Opening a stream only stores the callback. Blocks are produced when the
/// caller asks for them with [`OfflineBackend::pull_block`], which makes the
/// real-time path usable for rendering to a file and deterministic in tests.
/// Clones share the same slot.
#[derive(Clone, Default)]
pub struct OfflineBackend {
    slot: Arc<Mutex<OfflineSlot>>,
}

impl OfflineBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, OfflineSlot> {
        lock_slot(&self.slot)
    }

    /// Invoke the open stream's callback for `frames` frames
    ///
    /// Returns `None` when no stream is open.
    pub fn pull_block(&self, frames: usize) -> Option<Vec<f32>> {
        let mut out = vec![0.0; frames * 2];
        if self.pull_into(&mut out) {
            Some(out)
        } else {
            None
        }
    }

    /// Invoke the open stream's callback on a caller-provided buffer
    pub fn pull_into(&self, out: &mut [f32]) -> bool {
        let mut slot = self.slot();
        match slot.callback.as_mut() {
            Some(callback) => {
                callback(out);
                true
            }
            None => false,
        }
    }

    /// Whether a stream is currently open
    pub fn is_open(&self) -> bool {
        self.slot().callback.is_some()
    }

    /// Config of the most recently opened stream
    pub fn last_config(&self) -> Option<StreamConfig> {
        self.slot().config
    }

    /// Number of streams opened so far
    pub fn open_count(&self) -> u64 {
        self.slot().generation
    }
}

impl OutputBackend for OfflineBackend {
    fn open(
        &self,
        config: StreamConfig,
        callback: RenderCallback,
    ) -> Result<Box<dyn OutputStream>> {
        let mut slot = self.slot();
        slot.generation += 1;
        slot.callback = Some(callback);
        slot.config = Some(config);

        Ok(Box::new(OfflineStream {
            slot: Arc::clone(&self.slot),
            generation: slot.generation,
        }))
    }
}

struct OfflineStream {
    slot: Arc<Mutex<OfflineSlot>>,
    generation: u64,
}

impl OutputStream for OfflineStream {
    fn stop(&mut self) -> Result<()> {
        let mut slot = lock_slot(&self.slot);
        // A newer stream may own the slot already
        if slot.generation == self.generation {
            slot.callback = None;
        }
        Ok(())
    }
}

impl Drop for OfflineStream {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn lock_slot(slot: &Mutex<OfflineSlot>) -> MutexGuard<'_, OfflineSlot> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// cpal backend
// ============================================================================

#[cfg(feature = "cpal-output")]
pub use cpal_backend::CpalBackend;

#[cfg(feature = "cpal-output")]
mod cpal_backend {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use tracing::{info, warn};

    use super::{OutputBackend, OutputStream, RenderCallback, StreamConfig};
    use crate::error::{AutoEqError, Result};

    /// Backend for the host's default output device
    pub struct CpalBackend {
        host: cpal::Host,
    }

    impl CpalBackend {
        pub fn new() -> Self {
            Self {
                host: cpal::default_host(),
            }
        }
    }

    impl Default for CpalBackend {
        fn default() -> Self {
            Self::new()
        }
    }

    impl OutputBackend for CpalBackend {
        fn open(
            &self,
            config: StreamConfig,
            mut callback: RenderCallback,
        ) -> Result<Box<dyn OutputStream>> {
            let device = self
                .host
                .default_output_device()
                .ok_or_else(|| AutoEqError::Device {
                    reason: "No output device available".to_string(),
                    source: None,
                })?;

            let stream_config = cpal::StreamConfig {
                channels: config.channels,
                sample_rate: cpal::SampleRate(config.sample_rate),
                buffer_size: cpal::BufferSize::Fixed(config.block_frames as u32),
            };

            let stream = device
                .build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| callback(data),
                    |err| warn!(%err, "output stream error"),
                    None,
                )
                .map_err(|e| AutoEqError::device("Failed to open output stream", e))?;

            stream
                .play()
                .map_err(|e| AutoEqError::device("Failed to start output stream", e))?;

            info!(
                device = %device.name().unwrap_or_else(|_| "unknown".to_string()),
                sample_rate = config.sample_rate,
                block_frames = config.block_frames,
                "output stream started"
            );

            Ok(Box::new(CpalStream {
                stream: Some(stream),
            }))
        }
    }

    struct CpalStream {
        stream: Option<cpal::Stream>,
    }

    impl OutputStream for CpalStream {
        fn stop(&mut self) -> Result<()> {
            // The stream is dropped (and the device released) even if pausing fails
            if let Some(stream) = self.stream.take() {
                stream
                    .pause()
                    .map_err(|e| AutoEqError::device("Failed to stop output stream", e))?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StreamConfig {
        StreamConfig {
            sample_rate: 44100,
            channels: 2,
            block_frames: 4,
        }
    }

    #[test]
    fn test_offline_pull_invokes_callback() {
        let backend = OfflineBackend::new();
        assert!(backend.pull_block(4).is_none());

        let _stream = backend
            .open(config(), Box::new(|out: &mut [f32]| out.fill(0.5)))
            .unwrap();
        assert!(backend.is_open());
        assert_eq!(backend.pull_block(4), Some(vec![0.5; 8]));
        assert_eq!(backend.last_config(), Some(config()));
    }

    #[test]
    fn test_offline_stop_is_idempotent() {
        let backend = OfflineBackend::new();
        let mut stream = backend.open(config(), Box::new(|_: &mut [f32]| {})).unwrap();
        stream.stop().unwrap();
        stream.stop().unwrap();
        assert!(!backend.is_open());
    }

    #[test]
    fn test_stale_stream_does_not_close_newer_one() {
        let backend = OfflineBackend::new();
        let mut old = backend.open(config(), Box::new(|_: &mut [f32]| {})).unwrap();
        let _new = backend
            .open(config(), Box::new(|out: &mut [f32]| out.fill(1.0)))
            .unwrap();

        old.stop().unwrap();
        drop(old);
        assert!(backend.is_open());
        assert_eq!(backend.open_count(), 2);
    }

    #[test]
    fn test_dropping_stream_releases_slot() {
        let backend = OfflineBackend::new();
        let stream = backend.open(config(), Box::new(|_: &mut [f32]| {})).unwrap();
        drop(stream);
        assert!(!backend.is_open());
    }
}
