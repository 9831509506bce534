//! Error Module
//!
//! Defines error types and result types used throughout the tape-aware garbage collector.

use thiserror::Error;

/// Main error type for the tape-aware garbage collector
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TapeGcError {
    #[error("Maximum queue size is zero")]
    MaxQueueSizeIsZero,

    #[error("Queue is empty")]
    QueueIsEmpty,

    #[error("Pool not found: {0}")]
    PoolNotFound(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Thread error: {0}")]
    ThreadError(String),

    #[error("Free bytes script failed: {0}")]
    ScriptError(String),

    #[error("Number of histogram bins must be between 1 and {max}")]
    InvalidNbBins { max: usize },

    #[error("Histogram bin width must be between 1 and {max} seconds")]
    InvalidBinWidth { max: u32 },

    #[error("Too far back in time: {0}")]
    TooFarBackInTime(String),

    #[error("Invalid bin index: {0}")]
    InvalidBinIndex(String),
}

impl From<std::io::Error> for TapeGcError {
    fn from(err: std::io::Error) -> Self {
        TapeGcError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for TapeGcError {
    fn from(err: serde_json::Error) -> Self {
        TapeGcError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for TapeGcError {
    fn from(err: serde_yaml::Error) -> Self {
        TapeGcError::SerializationError(err.to_string())
    }
}

/// Result type alias for the tape-aware garbage collector
pub type Result<T> = std::result::Result<T, TapeGcError>;
