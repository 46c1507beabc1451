//! Error types for worksession core.

use crate::validation::ValidationErrors;
use std::io;
use thiserror::Error;
use worksession_model::{EntityKey, ModelError};
use worksession_store::StoreError;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in a session.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Store error, propagated unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Row conversion error.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// The connection descriptor is absent or invalid.
    #[error("connection {name:?} is missing or invalid: {reason}")]
    ConfigurationMissing {
        /// Name of the requested connection.
        name: String,
        /// Why it could not be resolved.
        reason: String,
    },

    /// One or more entities failed validation. Nothing was written.
    #[error("{0}")]
    ValidationFailed(ValidationErrors),

    /// A stored-procedure parameter has no supported representation.
    #[error("unsupported parameter at position {position}: {reason}")]
    UnsupportedParameter {
        /// Zero-based position of the parameter.
        position: usize,
        /// Why the parameter was rejected.
        reason: String,
    },

    /// Hook observers kept dirtying new entities.
    #[error("hook observers still dirtying entities after {passes} notification passes")]
    HookRecursionLimit {
        /// Number of passes that ran.
        passes: usize,
    },

    /// A hook observer failed.
    #[error("observer {observer} failed: {message}")]
    Observer {
        /// Name of the observer.
        observer: String,
        /// Description of the failure.
        message: String,
    },

    /// The entity is not tracked by this session.
    #[error("entity not tracked: {key}")]
    NotTracked {
        /// Key of the entity.
        key: EntityKey,
    },

    /// The entity is already tracked by this session.
    #[error("entity already tracked: {key}")]
    AlreadyTracked {
        /// Key of the entity.
        key: EntityKey,
    },

    /// I/O error while reading settings.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Settings file could not be parsed.
    #[error("settings parse error: {0}")]
    Settings(#[from] serde_json::Error),
}

impl CoreError {
    /// Creates a configuration missing error.
    pub fn configuration_missing(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigurationMissing {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates an unsupported parameter error.
    pub fn unsupported_parameter(position: usize, reason: impl Into<String>) -> Self {
        Self::UnsupportedParameter {
            position,
            reason: reason.into(),
        }
    }

    /// Creates an observer failure error.
    pub fn observer(observer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Observer {
            observer: observer.into(),
            message: message.into(),
        }
    }

    /// Creates a not tracked error.
    #[must_use]
    pub fn not_tracked(key: &EntityKey) -> Self {
        Self::NotTracked { key: key.clone() }
    }

    /// Returns true if this is an optimistic concurrency conflict.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_conflict())
    }

    /// Returns the aggregated validation failures, if this is a validation error.
    #[must_use]
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Self::ValidationFailed(errors) => Some(errors),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_are_transparent() {
        let err = CoreError::from(StoreError::constraint("duplicate key"));
        assert_eq!(err.to_string(), "constraint violation: duplicate key");
        assert!(!err.is_conflict());
        assert!(CoreError::from(StoreError::conflict(vec![])).is_conflict());
    }

    #[test]
    fn configuration_missing_display() {
        let err = CoreError::configuration_missing("main", "not configured");
        assert_eq!(
            err.to_string(),
            "connection \"main\" is missing or invalid: not configured"
        );
    }
}
