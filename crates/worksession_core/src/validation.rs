//! Entity validation before commit.
//!
//! Validation is a gate: every eligible tracked entity is checked, failures
//! are aggregated, and if any entity fails the save aborts before anything
//! is written.

use crate::error::{CoreError, CoreResult};
use crate::tracker::ChangeTracker;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;
use worksession_model::{Entity, EntityKey, EntityState, Value};

/// A single failed rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    /// Field the rule applies to.
    pub field: String,
    /// Human-readable description.
    pub message: String,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Outcome of validating one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    violations: Vec<FieldViolation>,
}

impl ValidationResult {
    /// Creates a passing result.
    #[must_use]
    pub fn valid() -> Self {
        Self::default()
    }

    /// Records a violation.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.violations.push(FieldViolation {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Builder-style variant of [`ValidationResult::add`].
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.add(field, message);
        self
    }

    /// Returns true if no rule failed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    /// Returns the violations.
    #[must_use]
    pub fn violations(&self) -> &[FieldViolation] {
        &self.violations
    }
}

/// Validation failures of one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityValidationFailure {
    /// Identity of the entity.
    pub key: EntityKey,
    /// State the entity was in when validated.
    pub state: EntityState,
    /// The failed rules.
    pub violations: Vec<FieldViolation>,
}

/// Aggregated validation failures of a save.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors {
    failures: Vec<EntityValidationFailure>,
}

impl ValidationErrors {
    /// Returns the per-entity failures.
    #[must_use]
    pub fn failures(&self) -> &[EntityValidationFailure] {
        &self.failures
    }

    /// Returns the failure recorded for an entity.
    #[must_use]
    pub fn for_key(&self, key: &EntityKey) -> Option<&EntityValidationFailure> {
        self.failures.iter().find(|f| &f.key == key)
    }

    /// Returns the number of failing entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// Returns true if nothing failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed for {} entities", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; {} ({})", failure.key, failure.state)?;
            for violation in &failure.violations {
                write!(f, " [{violation}]")?;
            }
        }
        Ok(())
    }
}

/// Checks entities before they are written.
pub trait Validator: Send + Sync {
    /// Returns true if the entity takes part in validation.
    ///
    /// Defaults to Added and Modified entities.
    fn should_validate(&self, entity: &Entity, state: EntityState) -> bool {
        let _ = entity;
        matches!(state, EntityState::Added | EntityState::Modified)
    }

    /// Validates one entity.
    fn validate(&self, entity: &Entity, state: EntityState) -> ValidationResult;
}

/// Validates every eligible tracked entity, aggregating failures.
///
/// Returns [`CoreError::ValidationFailed`] if any entity failed.
pub fn validate_tracked(tracker: &dyn ChangeTracker, validator: &dyn Validator) -> CoreResult<()> {
    let mut errors = ValidationErrors::default();
    let mut checked = 0usize;

    for entry in tracker.entries() {
        let Some(entity) = tracker.entity(&entry.key) else {
            continue;
        };
        if !validator.should_validate(entity, entry.state) {
            continue;
        }
        checked += 1;
        let result = validator.validate(entity, entry.state);
        if !result.is_valid() {
            errors.failures.push(EntityValidationFailure {
                key: entry.key,
                state: entry.state,
                violations: result.violations,
            });
        }
    }

    debug!(checked, failed = errors.len(), "validation complete");
    if errors.is_empty() {
        Ok(())
    } else {
        Err(CoreError::ValidationFailed(errors))
    }
}

type CustomCheck = Box<dyn Fn(Option<&Value>) -> bool + Send + Sync>;

/// A field rule used by [`RuleValidator`].
pub enum Rule {
    /// The field must be present and not null.
    Required(String),
    /// A text or bytes field must not exceed this length.
    MaxLength(String, usize),
    /// A caller-supplied predicate over the field value.
    Custom {
        /// Field the predicate reads.
        field: String,
        /// Message reported when the predicate returns false.
        message: String,
        /// The predicate.
        check: CustomCheck,
    },
}

impl Rule {
    /// Creates a custom rule.
    pub fn custom<F>(field: impl Into<String>, message: impl Into<String>, check: F) -> Self
    where
        F: Fn(Option<&Value>) -> bool + Send + Sync + 'static,
    {
        Self::Custom {
            field: field.into(),
            message: message.into(),
            check: Box::new(check),
        }
    }

    fn apply(&self, entity: &Entity, result: &mut ValidationResult) {
        match self {
            Self::Required(field) => {
                if entity.fields().get(field).map_or(true, Value::is_null) {
                    result.add(field.as_str(), "is required");
                }
            }
            Self::MaxLength(field, max) => {
                let len = match entity.fields().get(field) {
                    Some(Value::Text(s)) => s.chars().count(),
                    Some(Value::Bytes(b)) => b.len(),
                    _ => return,
                };
                if len > *max {
                    result.add(field.as_str(), format!("exceeds maximum length {max}"));
                }
            }
            Self::Custom {
                field,
                message,
                check,
            } => {
                if !check(entity.fields().get(field)) {
                    result.add(field.as_str(), message.as_str());
                }
            }
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required(field) => f.debug_tuple("Required").field(field).finish(),
            Self::MaxLength(field, max) => {
                f.debug_tuple("MaxLength").field(field).field(max).finish()
            }
            Self::Custom { field, message, .. } => f
                .debug_struct("Custom")
                .field("field", field)
                .field("message", message)
                .finish_non_exhaustive(),
        }
    }
}

/// A validator driven by per-type field rules.
#[derive(Debug, Default)]
pub struct RuleValidator {
    rules: HashMap<String, Vec<Rule>>,
}

impl RuleValidator {
    /// Creates a validator with no rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule for an entity type.
    #[must_use]
    pub fn rule(mut self, type_name: impl Into<String>, rule: Rule) -> Self {
        self.rules.entry(type_name.into()).or_default().push(rule);
        self
    }
}

impl Validator for RuleValidator {
    fn validate(&self, entity: &Entity, _state: EntityState) -> ValidationResult {
        let mut result = ValidationResult::valid();
        if let Some(rules) = self.rules.get(entity.type_name()) {
            for rule in rules {
                rule.apply(entity, &mut result);
            }
        }
        result
    }
}
