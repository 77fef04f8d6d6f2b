//! Error types for the ingestion crate.

use bufr_common::CommonError;
use bufr_parser::BufrError;
use bufr_query::QueryError;
use data_container::{CacheError, ContainerError};
use thiserror::Error;

/// Errors that can occur while turning a BUFR file into a container.
#[derive(Error, Debug)]
pub enum IngestionError {
    /// File I/O error
    #[error("Failed to read file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Mapping file is not valid YAML
    #[error("Invalid mapping YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Mapping file is valid YAML but describes an invalid setup
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Variable could not be built from its query results
    #[error("Cannot export {variable}: {reason}")]
    Export { variable: String, reason: String },

    /// Split could not be applied
    #[error("Split {split} failed: {reason}")]
    Split { split: String, reason: String },

    /// BUFR decoding failed
    #[error("Failed to decode BUFR data: {0}")]
    Bufr(#[from] BufrError),

    /// Query construction or execution failed
    #[error("Query failed: {0}")]
    Query(#[from] QueryError),

    /// Container operation failed
    #[error("Container error: {0}")]
    Container(#[from] ContainerError),

    /// Cache lookup or update failed
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Array construction or conversion failed
    #[error("Array error: {0}")]
    Array(#[from] CommonError),
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestionError>;
