//! # Error Types
//!
//! Custom error types for the extrusion analyser using `thiserror`.

use serde::de::Error as _;
use thiserror::Error;

/// Main error type for the extrusion analyser
#[derive(Debug, Error)]
pub enum AnalyserError {
    /// Wrong number of bytes handed to a frame decoder
    #[error("Malformed frame: expected {expected} bytes, got {actual}")]
    MalformedFrame { expected: usize, actual: usize },

    /// Serial transport failure (read/write error or disconnect)
    #[error("Transport failure: {0}")]
    Transport(String),

    /// Serial port could not be opened
    #[error("Serial port not found: {0}")]
    SerialPortNotFound(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Record serialization errors
    #[error("Record encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AnalyserError {
    /// Build a configuration error from a validation message
    pub fn invalid_config(msg: impl std::fmt::Display) -> Self {
        AnalyserError::Config(toml::de::Error::custom(msg))
    }
}

/// Result type alias for the extrusion analyser
pub type Result<T> = std::result::Result<T, AnalyserError>;
