//! Error types for model conversions.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that can occur while converting raw rows into typed values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// A required column is absent from the row.
    #[error("missing column: {column}")]
    MissingColumn {
        /// Name of the column.
        column: String,
    },

    /// A column holds a value of the wrong kind.
    #[error("type mismatch in column {column}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Name of the column.
        column: String,
        /// Expected value kind.
        expected: &'static str,
        /// Actual value kind.
        found: &'static str,
    },

    /// An identity column could not be parsed.
    #[error("invalid identity in column {column}: {value}")]
    InvalidIdentity {
        /// Name of the column.
        column: String,
        /// The rejected value.
        value: String,
    },
}

impl ModelError {
    /// Creates a missing column error.
    pub fn missing_column(column: impl Into<String>) -> Self {
        Self::MissingColumn {
            column: column.into(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(column: impl Into<String>, expected: &'static str, found: &'static str) -> Self {
        Self::TypeMismatch {
            column: column.into(),
            expected,
            found,
        }
    }
}
