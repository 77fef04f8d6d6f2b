//! Error types for containers, collectives and the cache.

use bufr_common::CommonError;
use thiserror::Error;

/// Result type alias using ContainerError.
pub type ContainerResult<T> = Result<T, ContainerError>;

/// Result type alias using CacheError.
pub type CacheResult<T> = Result<T, CacheError>;

#[derive(Debug, Error)]
pub enum ContainerError {
    /// Field path not present in the container
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// Category not present in the container
    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    /// Field was already added for this category
    #[error("Field {path} already written for category {category}")]
    DuplicateField { path: String, category: String },

    /// Arrays cannot be combined along the first dimension
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Collective operation between ranks failed
    #[error("Communication failed: {0}")]
    Communication(String),

    /// Payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<CommonError> for ContainerError {
    fn from(err: CommonError) -> Self {
        ContainerError::ShapeMismatch(err.to_string())
    }
}

/// Misuse of the shared cache.
#[derive(Debug, Error, PartialEq)]
pub enum CacheError {
    /// Entry was added twice
    #[error("Cache entry already exists for ({source_path}, {mapping_path})")]
    AlreadyExists {
        source_path: String,
        mapping_path: String,
    },

    /// Entry is absent or was already evicted
    #[error("No cache entry for ({source_path}, {mapping_path})")]
    NotFound {
        source_path: String,
        mapping_path: String,
    },

    /// Category was never registered for the entry
    #[error("Category {category} was not registered for ({source_path}, {mapping_path})")]
    UnknownCategory {
        category: String,
        source_path: String,
        mapping_path: String,
    },
}
