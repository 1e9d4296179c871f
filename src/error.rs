//! # Error Types
//!
//! Custom error types for Volt Monitor using `thiserror`.

use thiserror::Error;

/// Main error type for Volt Monitor
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial port errors (open, read, write)
    #[error("Serial error: {0}")]
    Serial(String),

    /// ADC did not answer the configuration readback at startup
    #[error("ADC not detected: {0}")]
    SensorNotDetected(String),

    /// ADC returned a short or malformed conversion frame
    #[error("ADC frame error: {0}")]
    AdcFrame(String),

    /// Persistence sink errors (open, append, close)
    #[error("Storage error: {0}")]
    Storage(String),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for Volt Monitor
pub type Result<T> = std::result::Result<T, MonitorError>;
