//! Error handling for AutoEQ
//!
//! Every fallible engine operation returns [`Result`]. None of these errors
//! leave the playback state half-updated; the caller can retry with a new
//! command.

use thiserror::Error;

/// Result type alias for AutoEQ operations
pub type Result<T> = std::result::Result<T, AutoEqError>;

/// Boxed cause carried by decode, device and analysis errors
pub type BoxedSource = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for AutoEQ operations
#[derive(Error, Debug)]
pub enum AutoEqError {
    // Input Errors
    #[error("Failed to decode audio: {reason}")]
    Decode {
        reason: String,
        #[source]
        source: Option<BoxedSource>,
    },

    // Output Errors
    #[error("Audio output device error: {reason}")]
    Device {
        reason: String,
        #[source]
        source: Option<BoxedSource>,
    },

    // Control Errors
    #[error("Invalid parameter: {param} = {value} (expected {expected})")]
    InvalidParameter {
        param: String,
        value: String,
        expected: String,
    },

    #[error("No audio loaded")]
    NotLoaded,

    // Analysis Errors
    #[error("Spectral analysis failed: {reason}")]
    Analysis {
        reason: String,
        #[source]
        source: Option<BoxedSource>,
    },

    // Configuration Errors
    #[error("Invalid configuration: {reason}")]
    Config { reason: String },

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AutoEqError {
    /// Build a decode error from a message only
    pub fn decode(reason: impl Into<String>) -> Self {
        AutoEqError::Decode {
            reason: reason.into(),
            source: None,
        }
    }

    /// Build a device error from a message and its underlying cause
    pub fn device<E>(reason: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        AutoEqError::Device {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Build an analysis error from a message only
    pub fn analysis(reason: impl Into<String>) -> Self {
        AutoEqError::Analysis {
            reason: reason.into(),
            source: None,
        }
    }

    /// Re-wrap any error as an analysis failure, keeping it as the cause
    pub fn into_analysis(self) -> Self {
        match self {
            err @ AutoEqError::Analysis { .. } => err,
            other => AutoEqError::Analysis {
                reason: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            AutoEqError::Decode { .. } => "DECODE_ERROR",
            AutoEqError::Device { .. } => "DEVICE_ERROR",
            AutoEqError::InvalidParameter { .. } => "INVALID_PARAMETER",
            AutoEqError::NotLoaded => "NOT_LOADED",
            AutoEqError::Analysis { .. } => "ANALYSIS_ERROR",
            AutoEqError::Config { .. } => "CONFIG_ERROR",
            AutoEqError::Io(_) => "IO_ERROR",
            AutoEqError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Returns a suggested recovery action for this error
    pub fn recovery_hint(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "Check that the file exists and is a supported audio format",
            Self::Device { .. } => {
                "Check that an output device is connected and not in exclusive use"
            }
            Self::InvalidParameter { .. } => "Send exactly 10 finite gain values in dB",
            Self::NotLoaded => "Load an audio file before starting playback",
            Self::Analysis { .. } => "Try a different file or a longer excerpt",
            Self::Config { .. } => "Fix the configuration value and restart",
            _ => "Check the error details and try again",
        }
    }
}
