//! In-memory data store.

use crate::batch::ChangeBatch;
use crate::error::{StoreError, StoreResult};
use crate::script;
use crate::store::{CommandKind, CommandOptions, DataStore};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;
use worksession_model::{EntityKey, EntityState, FieldMap, Row, Value};

/// A raw command recorded by [`InMemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedCommand {
    /// Kind of command.
    pub kind: CommandKind,
    /// Command text as submitted.
    pub text: String,
    /// Positional parameters.
    pub params: Vec<Value>,
    /// Whether the command ran inside a store transaction.
    pub transactional: bool,
    /// Command timeout in effect when the command ran.
    pub timeout: Option<Duration>,
}

/// An in-memory data store.
///
/// Rows are kept in a map keyed by entity identity. The store is suitable
/// for:
/// - Unit and integration tests
/// - Ephemeral sessions that don't need persistence
///
/// Raw commands are recorded rather than interpreted. Query results and
/// affected-row counts can be registered per command text, and failures can
/// be queued to exercise error paths.
///
/// # Thread Safety
///
/// The store is thread-safe and is normally shared as an `Arc`. Other
/// writers (see [`InMemoryStore::put_row`]) can change rows underneath a
/// session to provoke optimistic-concurrency conflicts.
#[derive(Debug)]
pub struct InMemoryStore {
    rows: RwLock<HashMap<EntityKey, FieldMap>>,
    query_results: RwLock<HashMap<String, Vec<Row>>>,
    command_results: RwLock<HashMap<String, usize>>,
    commands: RwLock<Vec<ExecutedCommand>>,
    apply_failures: Mutex<VecDeque<StoreError>>,
    command_failures: Mutex<VecDeque<StoreError>>,
    command_timeout: RwLock<Option<Duration>>,
    batch_channel: AtomicBool,
    apply_calls: AtomicU64,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
            query_results: RwLock::new(HashMap::new()),
            command_results: RwLock::new(HashMap::new()),
            commands: RwLock::new(Vec::new()),
            apply_failures: Mutex::new(VecDeque::new()),
            command_failures: Mutex::new(VecDeque::new()),
            command_timeout: RwLock::new(Some(Duration::from_secs(30))),
            batch_channel: AtomicBool::new(true),
            apply_calls: AtomicU64::new(0),
        }
    }
}

impl InMemoryStore {
    /// Creates a new empty store with a batch-capable channel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables the batch-capable channel.
    pub fn set_batch_channel(&self, available: bool) {
        self.batch_channel.store(available, Ordering::SeqCst);
    }

    /// Writes a row directly, as another writer would.
    pub fn put_row(&self, key: EntityKey, fields: FieldMap) {
        self.rows.write().insert(key, fields);
    }

    /// Deletes a row directly, as another writer would.
    pub fn delete_row(&self, key: &EntityKey) -> bool {
        self.rows.write().remove(key).is_some()
    }

    /// Returns a copy of a persisted row.
    #[must_use]
    pub fn row(&self, key: &EntityKey) -> Option<FieldMap> {
        self.rows.read().get(key).cloned()
    }

    /// Returns the number of persisted rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.read().len()
    }

    /// Registers the rows a query with this exact text returns.
    pub fn register_query(&self, text: impl Into<String>, rows: Vec<Row>) {
        self.query_results.write().insert(text.into(), rows);
    }

    /// Registers the affected-row count a command with this exact text returns.
    pub fn register_command(&self, text: impl Into<String>, affected: usize) {
        self.command_results.write().insert(text.into(), affected);
    }

    /// Queues an error returned by the next call to `apply`.
    pub fn fail_next_apply(&self, error: StoreError) {
        self.apply_failures.lock().push_back(error);
    }

    /// Queues an error returned by the next call to `execute`.
    pub fn fail_next_command(&self, error: StoreError) {
        self.command_failures.lock().push_back(error);
    }

    /// Returns every raw command recorded so far.
    #[must_use]
    pub fn commands(&self) -> Vec<ExecutedCommand> {
        self.commands.read().clone()
    }

    /// Returns how many times `apply` was called, including failed attempts.
    #[must_use]
    pub fn apply_calls(&self) -> u64 {
        self.apply_calls.load(Ordering::SeqCst)
    }

    fn record(&self, kind: CommandKind, text: &str, params: &[Value], transactional: bool) {
        let timeout = *self.command_timeout.read();
        self.commands.write().push(ExecutedCommand {
            kind,
            text: text.to_string(),
            params: params.to_vec(),
            transactional,
            timeout,
        });
    }

    /// Checks every change against the persisted rows without writing.
    fn check(rows: &HashMap<EntityKey, FieldMap>, batch: &ChangeBatch) -> StoreResult<()> {
        let mut conflicts = Vec::new();
        for change in batch.iter() {
            match change.state {
                EntityState::Added => {
                    if rows.contains_key(&change.key) {
                        return Err(StoreError::constraint(format!(
                            "duplicate key {}",
                            change.key
                        )));
                    }
                }
                EntityState::Modified | EntityState::Deleted => {
                    match rows.get(&change.key) {
                        Some(persisted) if *persisted == change.original => {}
                        _ => conflicts.push(change.key.clone()),
                    }
                }
                EntityState::Unchanged | EntityState::Detached => {}
            }
        }

        if conflicts.is_empty() {
            Ok(())
        } else {
            Err(StoreError::conflict(conflicts))
        }
    }
}

#[async_trait]
impl DataStore for InMemoryStore {
    fn apply(&self, batch: &ChangeBatch) -> StoreResult<usize> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.apply_failures.lock().pop_front() {
            return Err(err);
        }

        let mut rows = self.rows.write();
        Self::check(&rows, batch)?;

        let mut affected = 0;
        for change in batch.iter() {
            match change.state {
                EntityState::Added | EntityState::Modified => {
                    rows.insert(change.key.clone(), change.current.clone());
                    affected += 1;
                }
                EntityState::Deleted => {
                    rows.remove(&change.key);
                    affected += 1;
                }
                EntityState::Unchanged | EntityState::Detached => {}
            }
        }
        debug!(affected, "applied change batch");
        Ok(affected)
    }

    async fn apply_async(&self, batch: &ChangeBatch) -> StoreResult<usize> {
        // Suspend once so callers observe a real await point.
        tokio::task::yield_now().await;
        self.apply(batch)
    }

    fn fetch(&self, key: &EntityKey) -> StoreResult<Option<FieldMap>> {
        Ok(self.rows.read().get(key).cloned())
    }

    async fn fetch_async(&self, key: &EntityKey) -> StoreResult<Option<FieldMap>> {
        tokio::task::yield_now().await;
        self.fetch(key)
    }

    fn query(&self, text: &str, params: &[Value]) -> StoreResult<Vec<Row>> {
        self.record(CommandKind::Query, text, params, false);
        Ok(self
            .query_results
            .read()
            .get(text)
            .cloned()
            .unwrap_or_default())
    }

    fn execute(&self, text: &str, params: &[Value], options: CommandOptions) -> StoreResult<usize> {
        if let Some(err) = self.command_failures.lock().pop_front() {
            return Err(err);
        }
        if script::contains_separator(text) {
            return Err(StoreError::command("incorrect syntax near batch separator"));
        }
        self.record(CommandKind::Execute, text, params, options.transactional);
        Ok(self.command_results.read().get(text).copied().unwrap_or(0))
    }

    fn execute_batch(&self, script: &str) -> StoreResult<()> {
        if !self.batch_channel.load(Ordering::SeqCst) {
            return Err(StoreError::unsupported("batch script execution"));
        }
        self.record(CommandKind::Batch, script, &[], false);
        Ok(())
    }

    fn command_timeout(&self) -> Option<Duration> {
        *self.command_timeout.read()
    }

    fn set_command_timeout(&self, timeout: Option<Duration>) {
        *self.command_timeout.write() = timeout;
    }
}
