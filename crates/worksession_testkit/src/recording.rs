//! Recording doubles that log one shared event sequence.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use worksession_core::{
    ChangeEntry, ChangeTracker, CoreResult, HookNotification, HookObserver, ValidationResult,
    Validator,
};
use worksession_model::{Entity, EntityKey, EntityState, FieldMap, Row, Value};
use worksession_store::{ChangeBatch, CommandOptions, DataStore, InMemoryStore, StoreResult};

/// Something that happened during a save cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A pre-commit notification.
    PreCommit {
        /// Whether validation had already run.
        validated: bool,
        /// Announced entities.
        entries: Vec<ChangeEntry>,
        /// Merged-data flag of each announced entity when notified.
        merged: Vec<bool>,
    },
    /// The validator checked an entity.
    Validate(EntityKey),
    /// The store received a write.
    Write {
        /// Number of changes in the batch.
        changes: usize,
    },
    /// A post-commit notification.
    PostCommit {
        /// Announced entities with their new states.
        entries: Vec<ChangeEntry>,
        /// Merged-data flag of each still-tracked entity when notified.
        merged: Vec<bool>,
    },
}

impl Event {
    /// Returns a short label used in order assertions.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::PreCommit {
                validated: false, ..
            } => "pre".to_string(),
            Self::PreCommit {
                validated: true, ..
            } => "pre(validated)".to_string(),
            Self::Validate(key) => format!("validate({key})"),
            Self::Write { .. } => "write".to_string(),
            Self::PostCommit { .. } => "post".to_string(),
        }
    }
}

/// A shared, ordered event log.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    pub fn push(&self, event: Event) {
        self.events.lock().push(event);
    }

    /// Returns a copy of every event.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Returns the label of every event.
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        self.events.lock().iter().map(Event::label).collect()
    }

    /// Returns the number of logged events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Returns true if nothing was logged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Removes every event.
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

fn merged_flags(tracker: &dyn ChangeTracker, entries: &[ChangeEntry]) -> Vec<bool> {
    entries
        .iter()
        .filter_map(|entry| tracker.entity(&entry.key))
        .map(Entity::is_merged_data_excluded)
        .collect()
}

/// An observer that logs every notification.
#[derive(Debug, Clone)]
pub struct RecordingObserver {
    name: String,
    log: EventLog,
}

impl RecordingObserver {
    /// Creates an observer logging to `log`.
    pub fn new(name: impl Into<String>, log: EventLog) -> Self {
        Self {
            name: name.into(),
            log,
        }
    }
}

impl HookObserver for RecordingObserver {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_notification(
        &mut self,
        notification: &HookNotification,
        tracker: &mut dyn ChangeTracker,
    ) -> CoreResult<()> {
        let entries = notification.entries().to_vec();
        let merged = merged_flags(tracker, &entries);
        let event = match notification {
            HookNotification::PreCommit { validated, .. } => Event::PreCommit {
                validated: *validated,
                entries,
                merged,
            },
            HookNotification::PostCommit { .. } => Event::PostCommit { entries, merged },
        };
        self.log.push(event);
        Ok(())
    }
}

/// A validator that logs every check and fails chosen entities.
#[derive(Debug, Clone)]
pub struct RecordingValidator {
    log: EventLog,
    failures: HashMap<EntityKey, (String, String)>,
}

impl RecordingValidator {
    /// Creates a validator that accepts everything.
    #[must_use]
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            failures: HashMap::new(),
        }
    }

    /// Makes validation of `key` fail on `field`.
    #[must_use]
    pub fn failing(
        mut self,
        key: EntityKey,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.failures.insert(key, (field.into(), message.into()));
        self
    }
}

impl Validator for RecordingValidator {
    fn validate(&self, entity: &Entity, _state: EntityState) -> ValidationResult {
        self.log.push(Event::Validate(entity.key().clone()));
        match self.failures.get(entity.key()) {
            Some((field, message)) => ValidationResult::valid().with(field.as_str(), message.as_str()),
            None => ValidationResult::valid(),
        }
    }
}

/// A store that logs each write before delegating to an [`InMemoryStore`].
#[derive(Debug, Clone)]
pub struct RecordingStore {
    inner: Arc<InMemoryStore>,
    log: EventLog,
}

impl RecordingStore {
    /// Wraps `inner`, logging to `log`.
    #[must_use]
    pub fn new(inner: Arc<InMemoryStore>, log: EventLog) -> Self {
        Self { inner, log }
    }

    /// Returns the wrapped store.
    #[must_use]
    pub fn inner(&self) -> &Arc<InMemoryStore> {
        &self.inner
    }
}

#[async_trait]
impl DataStore for RecordingStore {
    fn apply(&self, batch: &ChangeBatch) -> StoreResult<usize> {
        self.log.push(Event::Write {
            changes: batch.len(),
        });
        self.inner.apply(batch)
    }

    async fn apply_async(&self, batch: &ChangeBatch) -> StoreResult<usize> {
        self.log.push(Event::Write {
            changes: batch.len(),
        });
        self.inner.apply_async(batch).await
    }

    fn fetch(&self, key: &EntityKey) -> StoreResult<Option<FieldMap>> {
        self.inner.fetch(key)
    }

    async fn fetch_async(&self, key: &EntityKey) -> StoreResult<Option<FieldMap>> {
        self.inner.fetch_async(key).await
    }

    fn query(&self, text: &str, params: &[Value]) -> StoreResult<Vec<Row>> {
        self.inner.query(text, params)
    }

    fn execute(&self, text: &str, params: &[Value], options: CommandOptions) -> StoreResult<usize> {
        self.inner.execute(text, params, options)
    }

    fn execute_batch(&self, script: &str) -> StoreResult<()> {
        self.inner.execute_batch(script)
    }

    fn command_timeout(&self) -> Option<Duration> {
        self.inner.command_timeout()
    }

    fn set_command_timeout(&self, timeout: Option<Duration>) {
        self.inner.set_command_timeout(timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use worksession_core::InMemoryTracker;
    use worksession_model::EntityId;

    #[test]
    fn observer_logs_flags() {
        let log = EventLog::new();
        let mut observer = RecordingObserver::new("rec", log.clone());
        let mut tracker = InMemoryTracker::new();
        let e = Entity::new("Order", EntityId::from_u128(1));
        let key = e.key().clone();
        tracker.add(e).unwrap();
        tracker.set_merged_data(&key, true);

        let n = HookNotification::PreCommit {
            entries: vec![ChangeEntry::new(key, EntityState::Added)],
            validated: false,
        };
        observer.on_notification(&n, &mut tracker).unwrap();

        assert_eq!(log.labels(), vec!["pre"]);
        match &log.events()[0] {
            Event::PreCommit { merged, .. } => assert_eq!(merged, &vec![true]),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn validator_fails_chosen_keys() {
        let log = EventLog::new();
        let bad = Entity::new("Order", EntityId::from_u128(2));
        let validator = RecordingValidator::new(log.clone()).failing(bad.key().clone(), "total", "missing");

        let good = Entity::new("Order", EntityId::from_u128(1));
        assert!(validator.validate(&good, EntityState::Added).is_valid());
        assert!(!validator.validate(&bad, EntityState::Added).is_valid());
        assert_eq!(log.len(), 2);
    }
}
