//! Entity lifecycle state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of an entity as seen by the change tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityState {
    /// Tracked and identical to its persisted baseline.
    Unchanged,
    /// New; will be inserted on the next commit.
    Added,
    /// Tracked with pending field changes.
    Modified,
    /// Marked for removal on the next commit.
    Deleted,
    /// Not tracked.
    Detached,
}

impl EntityState {
    /// Returns true if the entity has a pending change to commit.
    #[must_use]
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::Added | Self::Modified | Self::Deleted)
    }
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unchanged => "Unchanged",
            Self::Added => "Added",
            Self::Modified => "Modified",
            Self::Deleted => "Deleted",
            Self::Detached => "Detached",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_states() {
        assert!(EntityState::Added.is_pending());
        assert!(EntityState::Modified.is_pending());
        assert!(EntityState::Deleted.is_pending());
        assert!(!EntityState::Unchanged.is_pending());
        assert!(!EntityState::Detached.is_pending());
    }
}
