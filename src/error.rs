//! # Error Types Module
//!
//! Centralized error handling for the measurement core.
//! Provides custom error types for each module with proper context and error chaining.
//!
//! ## Error Types
//! - `ConfigError`: Configuration file I/O, parsing and validation errors
//! - `SourceError`: Frame source acquisition and delivery failures
//! - `MeasurementError`: Terminal session failures reported to the caller
//!
//! ## Usage Examples
//! ```rust,ignore
//! // Config module uses ConfigError
//! pub fn load() -> Result<MeasurementConfig, ConfigError> { ... }
//!
//! // Frame sources report SourceError
//! fn acquire(&mut self) -> Result<(), SourceError> { ... }
//!
//! // The estimator refuses short readings with MeasurementError
//! pub fn estimate(...) -> Result<HrvMetrics, MeasurementError> { ... }
//! ```
//!
//! Per-frame skips (zero usable pixels) are not errors and never appear here.

use crate::session::FailureReason;
use std::fmt;

/// Errors that can occur during configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read config file
    ReadFailed(std::io::Error),
    /// Failed to write config file
    WriteFailed(std::io::Error),
    /// Failed to parse config file
    ParseFailed(toml::de::Error),
    /// Failed to serialize config
    SerializeFailed(toml::ser::Error),
    /// Config parsed but holds unusable values
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ReadFailed(e) => {
                write!(f, "Failed to read config file: {}", e)
            }
            ConfigError::WriteFailed(e) => {
                write!(f, "Failed to write config file: {}", e)
            }
            ConfigError::ParseFailed(e) => {
                write!(f, "Failed to parse config file: {}", e)
            }
            ConfigError::SerializeFailed(e) => {
                write!(f, "Failed to serialize config: {}", e)
            }
            ConfigError::Invalid(msg) => {
                write!(f, "Invalid configuration: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadFailed(e) => Some(e),
            ConfigError::WriteFailed(e) => Some(e),
            ConfigError::ParseFailed(e) => Some(e),
            ConfigError::SerializeFailed(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

/// Errors reported by a frame source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Camera busy, unsupported, or stopped delivering frames
    Unavailable(String),
    /// Caller is not authorized to read the camera
    PermissionDenied,
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Unavailable(msg) => {
                write!(f, "Frame source unavailable: {}", msg)
            }
            SourceError::PermissionDenied => {
                write!(f, "Permission to use the camera was denied. Check device settings.")
            }
        }
    }
}

impl std::error::Error for SourceError {}

/// Terminal failures of a measurement session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeasurementError {
    /// Frame source could not be acquired or stopped delivering frames
    SourceUnavailable(String),
    /// Camera access was refused
    PermissionDenied,
    /// Too few RR intervals survived detection to produce a reading
    InsufficientBeats { captured: usize, required: usize },
}

impl MeasurementError {
    /// Collapse into the reason code emitted across the core boundary
    pub fn reason(&self) -> FailureReason {
        match self {
            MeasurementError::SourceUnavailable(_) => FailureReason::SourceUnavailable,
            MeasurementError::PermissionDenied => FailureReason::PermissionDenied,
            MeasurementError::InsufficientBeats { .. } => FailureReason::InsufficientBeats,
        }
    }
}

impl fmt::Display for MeasurementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasurementError::SourceUnavailable(msg) => {
                write!(f, "Camera unavailable: {}", msg)
            }
            MeasurementError::PermissionDenied => {
                write!(f, "Camera permission denied")
            }
            MeasurementError::InsufficientBeats { captured, required } => {
                write!(
                    f,
                    "Only {} RR intervals captured, at least {} required",
                    captured, required
                )
            }
        }
    }
}

impl std::error::Error for MeasurementError {}

impl From<SourceError> for MeasurementError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Unavailable(msg) => MeasurementError::SourceUnavailable(msg),
            SourceError::PermissionDenied => MeasurementError::PermissionDenied,
        }
    }
}
