//! Change batches handed to the physical write.

use worksession_model::{EntityKey, EntityState, FieldMap};

/// One entity's pending change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChange {
    /// Identity of the entity.
    pub key: EntityKey,
    /// Lifecycle state driving the write (Added, Modified or Deleted).
    pub state: EntityState,
    /// Baseline values the entity was loaded with. Empty for Added.
    pub original: FieldMap,
    /// Values to persist. Ignored for Deleted.
    pub current: FieldMap,
}

impl PendingChange {
    /// Creates a pending change.
    #[must_use]
    pub fn new(key: EntityKey, state: EntityState, original: FieldMap, current: FieldMap) -> Self {
        Self {
            key,
            state,
            original,
            current,
        }
    }
}

/// An ordered set of pending changes applied as one atomic unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
    changes: Vec<PendingChange>,
}

impl ChangeBatch {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a change.
    pub fn push(&mut self, change: PendingChange) {
        self.changes.push(change);
    }

    /// Returns the changes in order.
    pub fn iter(&self) -> impl Iterator<Item = &PendingChange> {
        self.changes.iter()
    }

    /// Returns the keys of all changes in order.
    #[must_use]
    pub fn keys(&self) -> Vec<EntityKey> {
        self.changes.iter().map(|c| c.key.clone()).collect()
    }

    /// Returns the number of changes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Returns true if there is nothing to write.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

impl FromIterator<PendingChange> for ChangeBatch {
    fn from_iter<I: IntoIterator<Item = PendingChange>>(iter: I) -> Self {
        Self {
            changes: iter.into_iter().collect(),
        }
    }
}
