//! Data store trait definition.

use crate::batch::ChangeBatch;
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use std::time::Duration;
use worksession_model::{EntityKey, FieldMap, Row, Value};

/// Options for a raw command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandOptions {
    /// Whether the store should wrap the command in its own transaction.
    pub transactional: bool,
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self {
            transactional: true,
        }
    }
}

/// What kind of raw operation a logged command was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// A read-only query.
    Query,
    /// A mutating statement.
    Execute,
    /// A script sent through the batch-capable channel.
    Batch,
}

/// A data store the session commits to.
///
/// # Invariants
///
/// - `apply` is atomic: either every change in the batch is persisted or
///   none is
/// - `apply` rejects a Modified or Deleted change whose `original` values no
///   longer match the persisted row with [`StoreError::ConcurrencyConflict`],
///   listing every conflicting key
/// - `fetch` returns the currently persisted fields of a row
/// - Stores must be `Send + Sync` so they can be shared across tasks
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Applies a batch of changes, returning the number of affected rows.
    fn apply(&self, batch: &ChangeBatch) -> StoreResult<usize>;

    /// Applies a batch without blocking the calling thread.
    async fn apply_async(&self, batch: &ChangeBatch) -> StoreResult<usize> {
        self.apply(batch)
    }

    /// Reads the persisted fields of an entity, if the row exists.
    fn fetch(&self, key: &EntityKey) -> StoreResult<Option<FieldMap>>;

    /// Async variant of [`DataStore::fetch`].
    async fn fetch_async(&self, key: &EntityKey) -> StoreResult<Option<FieldMap>> {
        self.fetch(key)
    }

    /// Runs a read-only query with positional parameters.
    fn query(&self, text: &str, params: &[Value]) -> StoreResult<Vec<Row>>;

    /// Runs a mutating statement, returning the number of affected rows.
    fn execute(&self, text: &str, params: &[Value], options: CommandOptions) -> StoreResult<usize>;

    /// Runs a script containing batch separators through a batch-capable
    /// channel.
    ///
    /// Stores without such a channel keep the default, which reports the
    /// operation as unsupported.
    fn execute_batch(&self, script: &str) -> StoreResult<()> {
        let _ = script;
        Err(StoreError::unsupported("batch script execution"))
    }

    /// Returns the command timeout currently in effect.
    fn command_timeout(&self) -> Option<Duration>;

    /// Sets the command timeout.
    fn set_command_timeout(&self, timeout: Option<Duration>);
}
