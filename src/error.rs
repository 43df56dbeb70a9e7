//! Error types shared across the engine.
//!
//! Errors scoped to one norm or one segment are recorded at that scope by the
//! callers; only structural violations and I/O are meant to abort an operation.

use thiserror::Error;

use crate::math::curve::hyperbola::HyperbolaFitError;

/// Failure to build an interpolation function from a point set.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InterpolationError {
    #[error("point set is empty")]
    EmptyPointSet,

    #[error("load {load} is not strictly positive")]
    NonPositiveLoad { load: f64 },

    #[error("least-squares fit failed: {0}")]
    SingularFit(#[from] HyperbolaFitError),
}

/// Engine-level error.
#[derive(Debug, Error)]
pub enum NormError {
    #[error("norm '{norm_id}' could not be interpolated: {source}")]
    Interpolation {
        norm_id: String,
        #[source]
        source: InterpolationError,
    },

    #[error("norm '{0}' not found")]
    NormNotFound(String),

    #[error("invalid numeric value for {field}: '{raw}'")]
    InvalidNumericInput { field: &'static str, raw: String },

    /// Structural contract violation in a persisted document.
    #[error("malformed entry for norm '{norm_id}': {reason}")]
    MalformedEntry { norm_id: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NormError {
    pub fn interpolation(norm_id: &str, source: InterpolationError) -> NormError {
        NormError::Interpolation { norm_id: norm_id.to_owned(), source }
    }
}

pub type Result<T> = std::result::Result<T, NormError>;
