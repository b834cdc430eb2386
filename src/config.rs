//! Engine configuration
//!
//! Loaded from a JSON file (every field optional) and overridable from the
//! command line.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AutoEqError, Result};

/// Default decode/playback rate in Hz
pub const DEFAULT_SAMPLE_RATE: u32 = 44100;

/// Default number of frames per output callback
pub const DEFAULT_BLOCK_FRAMES: usize = 1024;

/// Default output volume
pub const DEFAULT_VOLUME: f32 = 0.8;

/// Settings for the offline spectral analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// STFT window length in samples (power of two)
    pub window_size: usize,
    /// Distance between successive windows in samples
    pub hop_size: usize,
    /// Only this much of the signal is analyzed
    pub max_duration_secs: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_size: 2048,
            hop_size: 512,
            max_duration_secs: 30.0,
        }
    }
}

/// Playback engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Every file is decoded and resampled to this rate
    pub sample_rate: u32,
    /// Frames requested from the engine per output callback
    pub block_frames: usize,
    /// Volume at construction time
    pub initial_volume: f32,
    /// Whether the EQ starts enabled
    pub eq_enabled: bool,
    pub analysis: AnalysisConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_frames: DEFAULT_BLOCK_FRAMES,
            initial_volume: DEFAULT_VOLUME,
            eq_enabled: true,
            analysis: AnalysisConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Read a JSON configuration file and validate it
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let config: EngineConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(config_error("sample_rate must be greater than 0"));
        }
        if self.block_frames == 0 {
            return Err(config_error("block_frames must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&self.initial_volume) {
            return Err(config_error(format!(
                "initial_volume must be within 0..=1, got {}",
                self.initial_volume
            )));
        }
        if !self.analysis.window_size.is_power_of_two() {
            return Err(config_error(format!(
                "analysis.window_size must be a power of two, got {}",
                self.analysis.window_size
            )));
        }
        if self.analysis.hop_size == 0 {
            return Err(config_error("analysis.hop_size must be greater than 0"));
        }
        if !(self.analysis.max_duration_secs > 0.0) {
            return Err(config_error("analysis.max_duration_secs must be positive"));
        }
        Ok(())
    }
}

fn config_error(reason: impl Into<String>) -> AutoEqError {
    AutoEqError::Config {
        reason: reason.into(),
    }
}
