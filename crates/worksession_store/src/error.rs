//! Error types for store operations.

use thiserror::Error;
use worksession_model::EntityKey;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in a data store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The original values of one or more entities no longer match the
    /// persisted rows.
    #[error("optimistic concurrency conflict on {}", format_keys(.keys))]
    ConcurrencyConflict {
        /// The conflicting entities.
        keys: Vec<EntityKey>,
    },

    /// A constraint was violated (duplicate key, missing row).
    #[error("constraint violation: {message}")]
    Constraint {
        /// Description of the violation.
        message: String,
    },

    /// The store could not be reached.
    #[error("connection failure: {message}")]
    Connection {
        /// Description of the failure.
        message: String,
    },

    /// A raw command was rejected.
    #[error("command failed: {message}")]
    Command {
        /// Description of the failure.
        message: String,
    },

    /// The store does not support the requested operation.
    #[error("unsupported operation: {operation}")]
    Unsupported {
        /// Name of the operation.
        operation: String,
    },
}

impl StoreError {
    /// Creates a concurrency conflict error.
    #[must_use]
    pub fn conflict(keys: Vec<EntityKey>) -> Self {
        Self::ConcurrencyConflict { keys }
    }

    /// Creates a constraint violation error.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint {
            message: message.into(),
        }
    }

    /// Creates a connection failure error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a command failure error.
    pub fn command(message: impl Into<String>) -> Self {
        Self::Command {
            message: message.into(),
        }
    }

    /// Creates an unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Returns true if this is an optimistic concurrency conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

fn format_keys(keys: &[EntityKey]) -> String {
    keys.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
