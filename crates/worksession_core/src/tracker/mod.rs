//! Change tracking.
//!
//! The tracker is the identity map of a session: at most one instance per
//! [`EntityKey`], each with a lifecycle state and the baseline values it was
//! loaded with. The save pipeline reads pending work from it, and the
//! committer reloads conflicting entries through it.

mod memory;

pub use memory::InMemoryTracker;

use crate::config::MergePolicy;
use crate::error::CoreResult;
use worksession_model::{Entity, EntityKey, EntityState, FieldMap, Value};
use worksession_store::ChangeBatch;

/// A tracked entity's key and state at the time it was read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChangeEntry {
    /// Identity of the entity.
    pub key: EntityKey,
    /// Lifecycle state.
    pub state: EntityState,
}

impl ChangeEntry {
    /// Creates a new change entry.
    #[must_use]
    pub fn new(key: EntityKey, state: EntityState) -> Self {
        Self { key, state }
    }
}

/// Identity map and state tracking for a session.
///
/// Implementations must be `Send` so a session can be moved into an async
/// task. Every method that names a key operates on the tracked instance,
/// never on a copy.
pub trait ChangeTracker: Send {
    /// Returns every tracked entry in tracking order.
    fn entries(&self) -> Vec<ChangeEntry>;

    /// Returns true if an entity with this key is tracked.
    fn is_tracked(&self, key: &EntityKey) -> bool;

    /// Returns the tracked instance.
    fn entity(&self, key: &EntityKey) -> Option<&Entity>;

    /// Returns the tracked instance mutably.
    ///
    /// Edits are picked up by [`ChangeTracker::detect_changes`] or by an
    /// explicit [`ChangeTracker::mark_modified`].
    fn entity_mut(&mut self, key: &EntityKey) -> Option<&mut Entity>;

    /// Returns the state of the entity, or `Detached` if it is not tracked.
    fn state(&self, key: &EntityKey) -> EntityState;

    /// Returns the baseline value of a field.
    fn original_value(&self, key: &EntityKey, field: &str) -> Option<Value>;

    /// Returns the names of fields whose value differs from the baseline.
    ///
    /// Only Modified entries report fields.
    fn modified_fields(&self, key: &EntityKey) -> Vec<String>;

    /// Starts tracking a new entity in the Added state.
    fn add(&mut self, entity: Entity) -> CoreResult<()>;

    /// Starts tracking an existing entity in the Unchanged state.
    fn attach(&mut self, entity: Entity) -> CoreResult<()>;

    /// Marks an entity for deletion. Added entities are simply detached.
    fn remove(&mut self, key: &EntityKey) -> CoreResult<()>;

    /// Stops tracking an entity. Returns false if it was not tracked.
    fn detach(&mut self, key: &EntityKey) -> bool;

    /// Marks an Unchanged entity as Modified without a snapshot comparison.
    fn mark_modified(&mut self, key: &EntityKey) -> CoreResult<()>;

    /// Compares every tracked instance against its baseline and updates
    /// Unchanged and Modified states accordingly.
    fn detect_changes(&mut self);

    /// Builds the write batch for all pending entries.
    fn pending_batch(&self) -> ChangeBatch;

    /// Marks the pending work as persisted.
    ///
    /// Added and Modified entries become Unchanged with a fresh baseline;
    /// Deleted entries stop being tracked.
    fn accept_all_changes(&mut self);

    /// Refreshes an entry from the persisted row after a conflict.
    ///
    /// `None` means the row no longer exists and the entry is detached.
    fn reload(
        &mut self,
        key: &EntityKey,
        persisted: Option<FieldMap>,
        policy: MergePolicy,
    ) -> CoreResult<()>;

    /// Sets or clears the merged-data flag of a tracked entity.
    fn set_merged_data(&mut self, key: &EntityKey, excluded: bool);

    /// Enables or disables proxy creation.
    fn set_proxy_creation(&mut self, enabled: bool) {
        let _ = enabled;
    }

    /// Returns true if any entry is Added, Modified or Deleted.
    fn has_pending_changes(&self) -> bool {
        self.entries().iter().any(|e| e.state.is_pending())
    }
}
