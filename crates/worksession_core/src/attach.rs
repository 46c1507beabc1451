//! Attaching externally obtained entities to a tracker.

use crate::error::{CoreError, CoreResult};
use crate::tracker::ChangeTracker;
use tracing::debug;
use worksession_model::{Entity, EntityKey};

/// Attaches entities while keeping one instance per identity.
pub struct AttachmentManager<'a> {
    tracker: &'a mut dyn ChangeTracker,
}

impl<'a> AttachmentManager<'a> {
    /// Creates a manager over a tracker.
    pub fn new(tracker: &'a mut dyn ChangeTracker) -> Self {
        Self { tracker }
    }

    /// Attaches an entity unless one with the same identity is tracked.
    ///
    /// Returns a copy of the tracked instance: the newly attached entity, or
    /// the one that was already there. Existing entries keep their state
    /// and values.
    pub fn attach_or_reuse(&mut self, entity: Entity) -> CoreResult<Entity> {
        let key = entity.key().clone();
        if !self.tracker.is_tracked(&key) {
            debug!(key = %key, "attaching entity");
            self.tracker.attach(entity)?;
        }
        self.tracker
            .entity(&key)
            .cloned()
            .ok_or_else(|| CoreError::not_tracked(&key))
    }

    /// Returns true if an entity with this key is tracked.
    #[must_use]
    pub fn is_attached(&self, key: &EntityKey) -> bool {
        self.tracker.is_tracked(key)
    }

    /// Stops tracking an entity. Returns false if it was not tracked.
    pub fn detach(&mut self, key: &EntityKey) -> bool {
        self.tracker.detach(key)
    }
}
