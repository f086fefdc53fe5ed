//! Unified error handling for the trail-finder library.
//!
//! Engine failures are deterministic functions of their input: nothing here is
//! transient and nothing is retried. The boundary layer maps each variant to a
//! user-facing response via [`TrailFinderError::kind`].

use thiserror::Error;

/// Unified error type for trail-finder operations.
#[derive(Debug, Error)]
pub enum TrailFinderError {
    /// Malformed or empty input geometry
    #[error("Invalid geometry: {message}")]
    InvalidGeometry { message: String },

    /// Malformed query input (non-finite point, non-positive limit, ...)
    #[error("Invalid parameter '{parameter}': {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Category filter outside the fixed enumeration
    #[error("Invalid filter: unknown route category '{value}'")]
    InvalidFilter { value: String },

    /// The feature index has not been built (or holds no features)
    #[error("Route data not loaded")]
    NotReady,

    /// Dataset file could not be read
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Dataset is not a well-formed feature collection
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Server configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl TrailFinderError {
    pub fn invalid_parameter(parameter: &str, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_geometry(message: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            message: message.into(),
        }
    }

    /// Stable machine-readable name of the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidGeometry { .. } => "invalid_geometry",
            Self::InvalidParameter { .. } => "invalid_parameter",
            Self::InvalidFilter { .. } => "invalid_filter",
            Self::NotReady => "not_ready",
            Self::Io(_) => "io",
            Self::Parse(_) => "parse",
            Self::Config { .. } => "config",
        }
    }
}

/// Result type alias for trail-finder operations.
pub type Result<T> = std::result::Result<T, TrailFinderError>;
