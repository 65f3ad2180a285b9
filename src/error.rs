//! Unified error handling for the trailnet library.
//!
//! Only configuration-level and statistical-input problems are errors.
//! Geometry edge cases (empty input, degenerate tracks, failed merges) are
//! absorbed by the stages themselves and reported as [`crate::Diagnostic`]s.

use thiserror::Error;

/// Unified error type for trailnet operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TrailNetError {
    /// A configuration parameter is out of its valid range
    #[error("Invalid configuration '{parameter}' = {value}: {reason}")]
    InvalidConfig {
        parameter: String,
        value: String,
        reason: String,
    },
    /// An attribute value fed to a statistic is not usable
    #[error("Attribute '{attribute}' has non-finite value {value} at index {index}")]
    InvalidAttribute {
        attribute: String,
        index: usize,
        value: f64,
    },
    /// A segment lacks an attribute a later stage requires
    #[error("Segment {segment} is missing required attribute '{attribute}'")]
    MissingAttribute { attribute: String, segment: usize },
    /// Two collections that must be aligned have different lengths
    #[error("Length mismatch in {context}: expected {expected}, got {actual}")]
    LengthMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },
    /// Geometry rejected by an explicit validation helper
    #[error("Geometry '{id}' is invalid: {message}")]
    InvalidGeometry { id: String, message: String },
    /// Configuration could not be parsed
    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },
    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl TrailNetError {
    /// Shorthand for an [`TrailNetError::InvalidConfig`] error.
    pub fn invalid_config(parameter: &str, value: impl ToString, reason: &str) -> Self {
        TrailNetError::InvalidConfig {
            parameter: parameter.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for TrailNetError {
    fn from(err: serde_json::Error) -> Self {
        TrailNetError::ConfigParse {
            message: err.to_string(),
        }
    }
}

/// Result type alias for trailnet operations.
pub type Result<T> = std::result::Result<T, TrailNetError>;

/// Extension trait for converting Option to TrailNetError.
pub trait OptionExt<T> {
    /// Convert Option to Result with generic internal error.
    fn ok_or_internal(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_internal(self, message: &str) -> Result<T> {
        self.ok_or_else(|| TrailNetError::Internal {
            message: message.to_string(),
        })
    }
}
