//! Error types for BUFR decoding.

use thiserror::Error;

pub type BufrResult<T> = Result<T, BufrError>;

#[derive(Debug, Error)]
pub enum BufrError {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Descriptor table is inconsistent
    #[error("Invalid table: {0}")]
    InvalidTable(String),

    /// Descriptor table YAML could not be parsed
    #[error("Table parse error: {0}")]
    TableParse(#[from] serde_yaml::Error),

    /// Descriptor not present in the table
    #[error("Unknown descriptor {0}")]
    UnknownDescriptor(String),

    /// Message section is truncated or has a bad header
    #[error("Invalid section {section}: {reason}")]
    InvalidSection { section: u8, reason: String },

    /// Edition outside 2 through 4
    #[error("Unsupported BUFR edition {0}")]
    UnsupportedEdition(u8),

    /// Operator descriptor the decoder does not handle
    #[error("Unsupported operator {0}")]
    UnsupportedOperator(String),

    /// The bit stream does not match the shape the table predicts.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),
}

impl BufrError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedMessage(reason.into())
    }

    pub fn section(section: u8, reason: impl Into<String>) -> Self {
        Self::InvalidSection {
            section,
            reason: reason.into(),
        }
    }

    /// Whether this error is local to one message (the rest of a file may
    /// still decode).
    pub fn is_message_local(&self) -> bool {
        matches!(
            self,
            BufrError::MalformedMessage(_)
                | BufrError::InvalidSection { .. }
                | BufrError::UnsupportedEdition(_)
                | BufrError::UnsupportedOperator(_)
                | BufrError::UnknownDescriptor(_)
        )
    }
}
