//! Error types for the lantern interpretability toolkit

use thiserror::Error;

/// Result type alias for lantern operations
pub type Result<T> = std::result::Result<T, LanternError>;

/// Main error type for the lantern toolkit
///
/// Two families of failure exist: input errors (unknown feature, empty
/// background, malformed data) and computation errors (non-finite model
/// output or metric value). Both are deterministic functions of the
/// inputs, so no operation retries internally and no partial results are
/// returned.
#[derive(Error, Debug)]
pub enum LanternError {
    #[error("Data error: {0}")]
    DataError(String),

    #[error("Feature not found: {0}")]
    FeatureNotFound(String),

    #[error("Empty background sample: {0}")]
    EmptyBackground(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Computation error: {0}")]
    ComputationError(String),
}

impl From<polars::error::PolarsError> for LanternError {
    fn from(err: polars::error::PolarsError) -> Self {
        LanternError::DataError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for LanternError {
    fn from(err: ndarray::ShapeError) -> Self {
        LanternError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}
