//! Error types for query construction and execution.

use bufr_common::CommonError;
use bufr_parser::BufrError;
use thiserror::Error;

pub type QueryResult<T> = Result<T, QueryError>;

#[derive(Debug, Error)]
pub enum QueryError {
    /// Bad syntax, unknown mnemonic, or an index above the table maximum.
    #[error("Invalid query '{query}': {reason}")]
    InvalidQuery { query: String, reason: String },

    /// Field name not registered in the query set
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// Group-by field is not on the same branch as the target
    #[error("Field {field} cannot be grouped by {group_by}: dimension paths differ")]
    IncompatibleGroupBy { field: String, group_by: String },

    /// Result fields cannot be combined
    #[error("Fields have different shapes: {0}")]
    ShapeMismatch(String),

    /// Message decoding failed
    #[error("Decode error: {0}")]
    Decode(#[from] BufrError),

    /// Array construction failed
    #[error(transparent)]
    Array(#[from] CommonError),
}

impl QueryError {
    pub fn invalid(query: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidQuery {
            query: query.into(),
            reason: reason.into(),
        }
    }
}
