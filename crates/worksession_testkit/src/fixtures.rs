//! Test fixtures and session helpers.
//!
//! Provides convenience functions for setting up test sessions
//! and common test scenarios.

use crate::recording::{EventLog, RecordingObserver, RecordingStore, RecordingValidator};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use worksession_core::{ConnectionDescriptor, CoreResult, Session, SessionConfig};
use worksession_model::{Entity, EntityId, EntityKey};
use worksession_store::{DataStore, InMemoryStore};

/// A session over a recording in-memory store.
pub struct TestSession {
    /// The session.
    pub session: Session,
    /// The in-memory store behind the recording wrapper.
    pub store: Arc<InMemoryStore>,
    /// Events logged by the store and any recording doubles.
    pub log: EventLog,
}

impl TestSession {
    /// Creates a session with the default configuration.
    pub fn memory() -> Self {
        Self::with_config(SessionConfig::default())
    }

    /// Creates a session with a custom configuration.
    pub fn with_config(config: SessionConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let log = EventLog::new();
        let recording = RecordingStore::new(Arc::clone(&store), log.clone());
        let session = Session::with_store(test_connection(), Arc::new(recording), config);
        Self { session, store, log }
    }

    /// Registers a [`RecordingObserver`] on the shared log.
    pub fn observe(&mut self) {
        let observer = RecordingObserver::new("recorder", self.log.clone());
        self.session.register_observer(observer);
    }

    /// Returns a validator logging to the shared log.
    #[must_use]
    pub fn validator(&self) -> RecordingValidator {
        RecordingValidator::new(self.log.clone())
    }

    /// Persists an entity in the store and attaches it as Unchanged.
    pub fn seed(&mut self, entity: Entity) -> EntityKey {
        let key = entity.key().clone();
        self.store.put_row(key.clone(), entity.fields().clone());
        self.session
            .attach_or_reuse(entity)
            .expect("Failed to attach seeded entity");
        key
    }
}

impl std::ops::Deref for TestSession {
    type Target = Session;

    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

impl std::ops::DerefMut for TestSession {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.session
    }
}

/// Connection descriptor used by test sessions.
#[must_use]
pub fn test_connection() -> ConnectionDescriptor {
    ConnectionDescriptor::new("test", "memory", "worksession-test")
}

/// Returns a connector that opens a fresh in-memory store.
pub fn memory_connector() -> impl Fn(&ConnectionDescriptor) -> CoreResult<Arc<dyn DataStore>> {
    |_descriptor: &ConnectionDescriptor| -> CoreResult<Arc<dyn DataStore>> {
        Ok(Arc::new(InMemoryStore::new()))
    }
}

/// Returns the key of the `n`th test order.
#[must_use]
pub fn order_key(n: u128) -> EntityKey {
    EntityKey::new("Order", EntityId::from_u128(n))
}

/// Creates the `n`th test order.
#[must_use]
pub fn order(n: u128, total: i64) -> Entity {
    Entity::from_key(order_key(n))
        .with("total", total)
        .with("status", "open")
}

/// Writes a JSON settings file into a fresh temporary directory.
///
/// The directory is deleted when the returned `TempDir` is dropped.
pub fn settings_file(json: &str) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let path = dir.path().join("settings.json");
    fs::write(&path, json).expect("Failed to write settings file");
    (dir, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use worksession_core::{JsonFileSettings, MemorySettings};

    #[test]
    fn seeded_entity_is_persisted_and_tracked() {
        let mut t = TestSession::memory();
        let key = t.seed(order(1, 10));
        assert!(t.store.row(&key).is_some());
        assert!(t.is_attached(&key));
    }

    #[test]
    fn connector_opens_sessions() {
        let settings = MemorySettings::new().with_connection("main", "memory", "orders");
        let session =
            Session::open(&settings, "main", &memory_connector(), SessionConfig::default()).unwrap();
        assert_eq!(session.connection().provider, "memory");
    }

    #[test]
    fn settings_file_round_trip() {
        let (_dir, path) = settings_file(
            r#"{"connections": {"main": {"provider": "memory", "connection_string": "orders"}}}"#,
        );
        let settings = JsonFileSettings::new(&path);
        let session =
            Session::open(&settings, "main", &memory_connector(), SessionConfig::default()).unwrap();
        assert_eq!(session.connection().connection_string, "orders");
    }
}
