//! Mapping-driven ingestion of BUFR observations.
//!
//! A [`Description`] (loaded from YAML) lists the variables to query, the
//! filters and category splits to apply, and what an encoder should write.
//! A [`Parser`] runs that description over one BUFR file and produces a
//! [`data_container::DataContainer`]; an [`Encoder`] turns the container into
//! one dataset per category.
//!
//! # Architecture
//!
//! - `description`: YAML schema and validation
//! - `variables`, `filters`, `splits`: the export pipeline stages
//! - `parser`: query execution and export, serial or per rank
//! - `encoder`: output descriptions and path templating

pub mod description;
pub mod encoder;
pub mod error;
pub mod filters;
mod parser;
pub mod splits;
pub mod variables;

// Re-exports
pub use description::{BufrDescription, Description};
pub use encoder::{
    has_category_token, output_path_for, DimensionDescription, EncodedVariable, Encoder,
    EncoderDescription, MemoryDataset, MemoryEncoder, VariableDescription,
};
pub use error::{IngestionError, Result};
pub use filters::BoundingFilter;
pub use parser::{ParseOptions, Parser};
pub use splits::CategorySplit;
pub use variables::{DatetimeFields, SpectralRadianceFields, Transform, Variable, VariableSource};
