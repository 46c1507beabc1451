//! Session facade.

use crate::attach::AttachmentManager;
use crate::commit::ConcurrencyRetryCommitter;
use crate::config::{SessionConfig, SessionFlags};
use crate::connection::{ConnectionDescriptor, ConnectionResolver, SettingsStore, StoreConnector};
use crate::error::CoreResult;
use crate::hooks::pipeline::{close_window, current_states};
use crate::hooks::{HookObserver, HookPipeline};
use crate::raw::{ProcedureArg, RawExecutor};
use crate::tracker::{ChangeEntry, ChangeTracker, InMemoryTracker};
use crate::validation::{validate_tracked, Validator};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use worksession_model::{Entity, EntityKey, FromRow, Value};
use worksession_store::DataStore;

/// A unit-of-work session over one data store.
///
/// `Session` is the primary entry point. It provides:
/// - Change tracking through an identity map
/// - A save pipeline with hooks, validation and conflict recovery
/// - Raw queries, statements, scripts and stored procedures
///
/// # Saving
///
/// A save runs these steps in order:
/// 1. pre-commit notification of the changed entities (unvalidated)
/// 2. extra notification passes for entities observers dirtied
/// 3. validation of every eligible tracked entity
/// 4. pre-commit notification of the same set (validated)
/// 5. the physical write, retried after reloading on conflicts
/// 6. post-commit notification with the entities' new states
///
/// From step 1 until step 6 completes, derived fields of the changed
/// entities are hidden from reads. A failure at any step aborts the save and
/// nothing after it runs.
///
/// ```rust,ignore
/// use worksession_core::{MemorySettings, Session, SessionConfig};
///
/// let settings = MemorySettings::new().with_connection("main", "memory", "orders");
/// let mut session = Session::open(&settings, "main", &connector, SessionConfig::default())?;
///
/// session.add(Entity::new("Order", EntityId::new()).with("total", 10))?;
/// session.save()?;
/// ```
pub struct Session {
    /// Resolved connection.
    connection: ConnectionDescriptor,
    /// Configuration.
    config: SessionConfig,
    /// Data store.
    store: Arc<dyn DataStore>,
    /// Identity map.
    tracker: Box<dyn ChangeTracker>,
    /// Hook observers.
    pipeline: HookPipeline,
    /// Validator consulted on save.
    validator: Option<Box<dyn Validator>>,
    /// Write and conflict recovery.
    committer: ConcurrencyRetryCommitter,
}

impl Session {
    /// Opens a session against a named connection.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationMissing` if the connection is absent or
    /// invalid in `settings`, or the connector's error if it cannot open
    /// the store.
    pub fn open(
        settings: &dyn SettingsStore,
        name: &str,
        connector: &dyn StoreConnector,
        config: SessionConfig,
    ) -> CoreResult<Self> {
        let connection = ConnectionResolver::new(settings).resolve(name)?;
        let store = connector.connect(&connection)?;
        info!(connection = name, provider = %connection.provider, "session opened");
        Ok(Self::with_store(connection, store, config))
    }

    /// Creates a session over an already opened store.
    pub fn with_store(
        connection: ConnectionDescriptor,
        store: Arc<dyn DataStore>,
        config: SessionConfig,
    ) -> Self {
        if let Some(timeout) = config.command_timeout {
            store.set_command_timeout(Some(timeout));
        }
        let mut tracker: Box<dyn ChangeTracker> = Box::new(InMemoryTracker::new());
        tracker.set_proxy_creation(config.flags.proxy_creation);
        Self {
            connection,
            committer: ConcurrencyRetryCommitter::new(config.conflict_retry, config.merge_policy),
            config,
            store,
            tracker,
            pipeline: HookPipeline::new(),
            validator: None,
        }
    }

    /// Replaces the change tracker.
    #[must_use]
    pub fn with_tracker(mut self, mut tracker: Box<dyn ChangeTracker>) -> Self {
        tracker.set_proxy_creation(self.config.flags.proxy_creation);
        self.tracker = tracker;
        self
    }

    /// Returns the resolved connection.
    #[must_use]
    pub fn connection(&self) -> &ConnectionDescriptor {
        &self.connection
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns the data store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn DataStore> {
        &self.store
    }

    /// Returns the session flags.
    #[must_use]
    pub fn flags(&self) -> &SessionFlags {
        &self.config.flags
    }

    /// Returns the session flags mutably.
    ///
    /// Use [`Session::set_proxy_creation`] for the proxy flag so the tracker
    /// sees the change.
    pub fn flags_mut(&mut self) -> &mut SessionFlags {
        &mut self.config.flags
    }

    /// Enables or disables proxy creation on the tracker.
    pub fn set_proxy_creation(&mut self, enabled: bool) {
        self.config.flags.proxy_creation = enabled;
        self.tracker.set_proxy_creation(enabled);
    }

    /// Registers a hook observer.
    pub fn register_observer<O: HookObserver + 'static>(&mut self, observer: O) {
        self.pipeline.register(Box::new(observer));
    }

    /// Sets the validator consulted on save.
    pub fn set_validator<V: Validator + 'static>(&mut self, validator: V) {
        self.validator = Some(Box::new(validator));
    }

    /// Returns the change tracker.
    #[must_use]
    pub fn tracker(&self) -> &dyn ChangeTracker {
        &*self.tracker
    }

    /// Returns the change tracker mutably.
    pub fn tracker_mut(&mut self) -> &mut dyn ChangeTracker {
        &mut *self.tracker
    }

    /// Starts tracking a new entity.
    pub fn add(&mut self, entity: Entity) -> CoreResult<()> {
        self.tracker.add(entity)
    }

    /// Marks a tracked entity for deletion.
    pub fn remove(&mut self, key: &EntityKey) -> CoreResult<()> {
        self.tracker.remove(key)
    }

    /// Returns a tracked entity.
    #[must_use]
    pub fn entity(&self, key: &EntityKey) -> Option<&Entity> {
        self.tracker.entity(key)
    }

    /// Returns a tracked entity mutably.
    pub fn entity_mut(&mut self, key: &EntityKey) -> Option<&mut Entity> {
        self.tracker.entity_mut(key)
    }

    /// Returns true if anything would be written by a save.
    ///
    /// Runs change detection first when automatic detection is enabled.
    pub fn has_pending_changes(&mut self) -> bool {
        if self.config.flags.auto_detect_changes {
            self.tracker.detect_changes();
        }
        self.tracker.has_pending_changes()
    }

    /// Returns each modified field of an entity with its original value.
    ///
    /// Fields that did not exist originally map to `Value::Null`.
    pub fn modified_fields(&mut self, key: &EntityKey) -> BTreeMap<String, Value> {
        if self.config.flags.auto_detect_changes {
            self.tracker.detect_changes();
        }
        self.tracker
            .modified_fields(key)
            .into_iter()
            .map(|field| {
                let original = self
                    .tracker
                    .original_value(key, &field)
                    .unwrap_or(Value::Null);
                (field, original)
            })
            .collect()
    }

    /// Saves pending changes, returning the number of affected rows.
    ///
    /// # Errors
    ///
    /// - `ValidationFailed` if any eligible entity fails validation
    /// - `HookRecursionLimit` if observers keep dirtying new entities
    /// - an observer's error if it fails
    /// - the store's error for anything other than a recoverable conflict
    pub fn save(&mut self) -> CoreResult<usize> {
        let window = self.prepare_save()?;
        let result = self.committer.commit(&mut *self.tracker, &*self.store);
        self.finish_save(&window, result)
    }

    /// Async variant of [`Session::save`].
    ///
    /// Conflict recovery happens inside the returned future.
    pub async fn save_async(&mut self) -> CoreResult<usize> {
        let window = self.prepare_save()?;
        let result = self
            .committer
            .commit_async(&mut *self.tracker, &*self.store)
            .await;
        self.finish_save(&window, result)
    }

    /// Runs the pre-commit phase, returning the entities whose merged-data
    /// window is open.
    fn prepare_save(&mut self) -> CoreResult<Vec<ChangeEntry>> {
        let flags = self.config.flags;
        let mut window = Vec::new();

        let passes = self.pipeline.run_pre_commit(
            &flags,
            self.config.max_hook_passes,
            &mut *self.tracker,
            &mut window,
        );
        self.pipeline.release();

        let result = match passes {
            Ok(()) => self.validate_and_confirm(&flags, &window),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            close_window(&mut *self.tracker, &window);
            debug!(error = %e, "save aborted before write");
            return Err(e);
        }
        Ok(window)
    }

    fn validate_and_confirm(&mut self, flags: &SessionFlags, window: &[ChangeEntry]) -> CoreResult<()> {
        if flags.validate_on_save {
            if let Some(validator) = &self.validator {
                validate_tracked(&*self.tracker, &**validator)?;
            }
        }
        if !window.is_empty() {
            let entries = current_states(&*self.tracker, window);
            self.pipeline
                .publish_pre(flags.hooks_enabled, &entries, true, &mut *self.tracker)?;
            // Edits made by validated-pass observers are written unannounced.
            if flags.auto_detect_changes {
                self.tracker.detect_changes();
            }
        }
        Ok(())
    }

    fn finish_save(&mut self, window: &[ChangeEntry], result: CoreResult<usize>) -> CoreResult<usize> {
        let outcome = result.and_then(|affected| {
            let entries = current_states(&*self.tracker, window);
            self.pipeline
                .publish_post(self.config.flags.hooks_enabled, &entries, &mut *self.tracker)
                .map(|()| affected)
        });
        close_window(&mut *self.tracker, window);

        match &outcome {
            Ok(affected) => info!(affected, entities = window.len(), "save complete"),
            Err(e) => warn!(error = %e, "save failed"),
        }
        outcome
    }

    /// Runs a raw query and converts each row.
    pub fn query<T: FromRow>(&self, text: &str, params: &[Value]) -> CoreResult<Vec<T>> {
        RawExecutor::new(&*self.store).query(text, params)
    }

    /// Runs a raw statement, returning the number of affected rows.
    ///
    /// `timeout` overrides the command timeout for this statement only.
    pub fn execute_command(
        &self,
        text: &str,
        suppress_transaction: bool,
        timeout: Option<Duration>,
        params: &[Value],
    ) -> CoreResult<usize> {
        RawExecutor::new(&*self.store).execute_command(text, suppress_transaction, timeout, params)
    }

    /// Runs a script that may contain batch separator lines.
    pub fn execute_batch_script(&self, script: &str) -> CoreResult<()> {
        RawExecutor::new(&*self.store).execute_batch_script(script)
    }

    /// Calls a stored procedure and attaches the returned entities.
    pub fn call_procedure(
        &mut self,
        command: &str,
        entity_type: &str,
        args: &[ProcedureArg],
    ) -> CoreResult<Vec<Entity>> {
        let mut attachments = AttachmentManager::new(&mut *self.tracker);
        RawExecutor::new(&*self.store).call_procedure(&mut attachments, command, entity_type, args)
    }

    /// Attaches an entity, or returns the tracked instance with the same
    /// identity.
    ///
    /// The returned entity is a copy. Edit the tracked instance through
    /// [`Session::entity_mut`].
    pub fn attach_or_reuse(&mut self, entity: Entity) -> CoreResult<Entity> {
        AttachmentManager::new(&mut *self.tracker).attach_or_reuse(entity)
    }

    /// Returns true if an entity with this key is tracked.
    #[must_use]
    pub fn is_attached(&self, key: &EntityKey) -> bool {
        self.tracker.is_tracked(key)
    }

    /// Stops tracking an entity. Returns false if it was not tracked.
    pub fn detach(&mut self, key: &EntityKey) -> bool {
        AttachmentManager::new(&mut *self.tracker).detach(key)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connection", &self.connection)
            .field("config", &self.config)
            .field("pipeline", &self.pipeline)
            .field("validator", &self.validator.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConflictRetryPolicy;
    use crate::connection::MemorySettings;
    use crate::error::CoreError;
    use crate::hooks::HookNotification;
    use crate::validation::{Rule, RuleValidator};
    use std::sync::Mutex;
    use worksession_model::{EntityId, EntityState};
    use worksession_store::{InMemoryStore, StoreError};

    fn session() -> (Session, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let session = Session::with_store(
            ConnectionDescriptor::new("main", "memory", "test"),
            store.clone(),
            SessionConfig::default(),
        );
        (session, store)
    }

    fn order(n: u128) -> Entity {
        Entity::new("Order", EntityId::from_u128(n)).with("total", 10)
    }

    #[test]
    fn open_resolves_connection() {
        let settings = MemorySettings::new().with_connection("main", "memory", "orders");
        let connector = |d: &ConnectionDescriptor| -> CoreResult<Arc<dyn DataStore>> {
            assert_eq!(d.connection_string, "orders");
            Ok(Arc::new(InMemoryStore::new()))
        };
        let session = Session::open(&settings, "main", &connector, SessionConfig::default()).unwrap();
        assert_eq!(session.connection().name, "main");

        let err = Session::open(&settings, "other", &connector, SessionConfig::default()).unwrap_err();
        assert!(matches!(err, CoreError::ConfigurationMissing { .. }));
    }

    #[test]
    fn save_writes_and_accepts() {
        let (mut session, store) = session();
        let e = order(1);
        let key = e.key().clone();
        session.add(e).unwrap();
        assert!(session.has_pending_changes());

        assert_eq!(session.save().unwrap(), 1);
        assert!(!session.has_pending_changes());
        assert_eq!(session.tracker().state(&key), EntityState::Unchanged);
        assert!(store.row(&key).is_some());
    }

    #[test]
    fn modified_fields_report_originals() {
        let (mut session, _store) = session();
        let e = order(1);
        let key = e.key().clone();
        session.attach_or_reuse(e).unwrap();

        let entity = session.entity_mut(&key).unwrap();
        entity.set("total", 12);
        entity.set("note", "rush");

        let modified = session.modified_fields(&key);
        assert_eq!(modified.len(), 2);
        assert_eq!(modified["total"], Value::from(10));
        assert_eq!(modified["note"], Value::Null);
    }

    #[test]
    fn validation_failure_writes_nothing() {
        let (mut session, store) = session();
        session.set_validator(RuleValidator::new().rule("Order", Rule::Required("customer".into())));
        session.add(order(1)).unwrap();

        let err = session.save().unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed(_)));
        assert_eq!(store.apply_calls(), 0);
        assert!(session.has_pending_changes());
    }

    #[test]
    fn validation_can_be_disabled() {
        let (mut session, store) = session();
        session.set_validator(RuleValidator::new().rule("Order", Rule::Required("customer".into())));
        session.flags_mut().validate_on_save = false;
        session.add(order(1)).unwrap();

        session.save().unwrap();
        assert_eq!(store.row_count(), 1);
    }

    #[test]
    fn merged_flag_closed_after_failure() {
        let (mut session, store) = session();
        let e = order(1);
        let key = e.key().clone();
        session.add(e).unwrap();
        store.fail_next_apply(StoreError::connection("reset"));

        assert!(session.save().is_err());
        assert!(!session.entity(&key).unwrap().is_merged_data_excluded());
        assert_eq!(session.tracker().state(&key), EntityState::Added);
    }

    #[test]
    fn post_commit_reports_new_states() {
        let (mut session, store) = session();
        let a = order(1);
        let b = order(2);
        let (ka, kb) = (a.key().clone(), b.key().clone());
        store.put_row(kb.clone(), b.fields().clone());
        session.add(a).unwrap();
        session.attach_or_reuse(b).unwrap();
        session.remove(&kb).unwrap();

        let posts = Arc::new(Mutex::new(Vec::new()));
        let p = Arc::clone(&posts);
        session.register_observer(
            move |n: &HookNotification, _: &mut dyn ChangeTracker| -> CoreResult<()> {
                if n.is_post_commit() {
                    p.lock().unwrap().extend(n.entries().iter().cloned());
                }
                Ok(())
            },
        );

        session.save().unwrap();
        let posts = posts.lock().unwrap();
        assert_eq!(
            *posts,
            vec![
                ChangeEntry::new(ka, EntityState::Unchanged),
                ChangeEntry::new(kb, EntityState::Detached),
            ]
        );
    }

    #[test]
    fn limited_retry_surfaces_conflict() {
        let store = Arc::new(InMemoryStore::new());
        let mut session = Session::with_store(
            ConnectionDescriptor::new("main", "memory", "test"),
            store.clone(),
            SessionConfig::new().conflict_retry(ConflictRetryPolicy::Limited(0)),
        );
        let e = order(1);
        let key = e.key().clone();
        store.put_row(key.clone(), e.fields().clone());
        session.attach_or_reuse(e).unwrap();
        session.entity_mut(&key).unwrap().set("total", 11);
        store.put_row(key.clone(), order(1).with("total", 99).fields().clone());

        assert!(session.save().unwrap_err().is_conflict());
    }

    #[test]
    fn command_timeout_applied_on_open() {
        let store = Arc::new(InMemoryStore::new());
        let _session = Session::with_store(
            ConnectionDescriptor::new("main", "memory", "test"),
            store.clone(),
            SessionConfig::new().command_timeout(Duration::from_secs(7)),
        );
        assert_eq!(store.command_timeout(), Some(Duration::from_secs(7)));
    }

    #[test]
    fn proxy_creation_forwarded() {
        let (mut session, _store) = session();
        session.set_proxy_creation(true);
        assert!(session.flags().proxy_creation);
    }
}
