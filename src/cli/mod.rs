//! CLI Module
//!
//! Command-line interface for the AutoEQ playback engine.

pub mod commands;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::EngineConfig;
use crate::error::Result;

/// AutoEQ - real-time ten-band EQ player with automatic gain suggestions
#[derive(Parser, Debug)]
#[command(name = "autoeq")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON engine configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Decode and play at this sample rate (Hz)
    #[arg(long, global = true)]
    pub sample_rate: Option<u32>,

    /// Frames per output callback
    #[arg(long, global = true)]
    pub block_frames: Option<usize>,

    /// Output volume (0.0 - 1.0)
    #[arg(long, global = true)]
    pub volume: Option<f32>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Configuration file (or defaults) with command-line overrides applied
    pub fn engine_config(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::from_file(path)?,
            None => EngineConfig::default(),
        };

        if let Some(sample_rate) = self.sample_rate {
            config.sample_rate = sample_rate;
        }
        if let Some(block_frames) = self.block_frames {
            config.block_frames = block_frames;
        }
        if let Some(volume) = self.volume {
            config.initial_volume = volume;
        }

        config.validate()?;
        Ok(config)
    }
}

/// How the EQ is set up before playback or rendering
#[derive(Args, Debug, Clone, Default)]
pub struct EqArgs {
    /// Ten comma-separated band gains in dB, lowest band first
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub gains: Option<Vec<f64>>,

    /// Analyze the file first and use the suggested gains
    #[arg(long, conflicts_with = "gains")]
    pub auto: bool,

    /// Start with the EQ bypassed
    #[arg(long)]
    pub no_eq: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Play a file through the default output device
    #[command(name = "play")]
    Play {
        /// Audio file to play
        file: PathBuf,

        #[command(flatten)]
        eq: EqArgs,

        /// Start position in seconds
        #[arg(long)]
        seek: Option<f64>,
    },

    /// Suggest EQ gains for a file
    #[command(name = "analyze")]
    Analyze {
        /// Audio file to analyze
        file: PathBuf,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Process a file through the EQ and write a 32-bit float WAV
    #[command(name = "render")]
    Render {
        /// Audio file to process
        input: PathBuf,

        /// Destination WAV file
        output: PathBuf,

        #[command(flatten)]
        eq: EqArgs,
    },
}
