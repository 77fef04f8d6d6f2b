//! Error types for array and value handling.

use thiserror::Error;

/// Result type alias using CommonError.
pub type CommonResult<T> = Result<T, CommonError>;

/// Errors raised by the shared array types.
#[derive(Debug, Error, PartialEq)]
pub enum CommonError {
    /// Array dimensions disagree with the data length or with each other
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Array accessed as the wrong element type
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// Value does not fit the requested type
    #[error("Cannot cast value {value:?} to {target}")]
    InvalidCast { value: String, target: String },

    /// Unrecognized value type name
    #[error("Unknown value type: {0}")]
    UnknownType(String),
}
