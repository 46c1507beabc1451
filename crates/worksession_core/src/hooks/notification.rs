//! Notification payloads and the observer trait.

use crate::error::CoreResult;
use crate::tracker::{ChangeEntry, ChangeTracker};

/// A notification delivered to hook observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookNotification {
    /// Sent before the physical write.
    PreCommit {
        /// The changed entities.
        entries: Vec<ChangeEntry>,
        /// False for the pass that precedes validation, true after it.
        validated: bool,
    },
    /// Sent after a successful physical write.
    PostCommit {
        /// The saved entities with their post-save states.
        entries: Vec<ChangeEntry>,
    },
}

impl HookNotification {
    /// Returns the entries carried by this notification.
    #[must_use]
    pub fn entries(&self) -> &[ChangeEntry] {
        match self {
            Self::PreCommit { entries, .. } | Self::PostCommit { entries } => entries,
        }
    }

    /// Returns true for pre-commit notifications.
    #[must_use]
    pub const fn is_pre_commit(&self) -> bool {
        matches!(self, Self::PreCommit { .. })
    }

    /// Returns true for post-commit notifications.
    #[must_use]
    pub const fn is_post_commit(&self) -> bool {
        matches!(self, Self::PostCommit { .. })
    }

    /// Returns true for the pre-commit pass that follows validation.
    #[must_use]
    pub const fn is_validated(&self) -> bool {
        matches!(self, Self::PreCommit { validated: true, .. })
    }

    /// Returns the `requires_validation` flag of the notification.
    ///
    /// Set on the second pre-commit pass, once entries have been validated.
    /// Always false for post-commit notifications.
    #[must_use]
    pub const fn requires_validation(&self) -> bool {
        self.is_validated()
    }
}

/// Receives save-time notifications.
///
/// An error returned from an observer aborts the save.
pub trait HookObserver: Send {
    /// Name used in logs and error messages.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Handles one notification.
    fn on_notification(
        &mut self,
        notification: &HookNotification,
        tracker: &mut dyn ChangeTracker,
    ) -> CoreResult<()>;
}

impl<F> HookObserver for F
where
    F: FnMut(&HookNotification, &mut dyn ChangeTracker) -> CoreResult<()> + Send,
{
    fn on_notification(
        &mut self,
        notification: &HookNotification,
        tracker: &mut dyn ChangeTracker,
    ) -> CoreResult<()> {
        self(notification, tracker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use worksession_model::{EntityId, EntityKey, EntityState};

    #[test]
    fn accessors() {
        let entry = ChangeEntry::new(
            EntityKey::new("Order", EntityId::from_u128(1)),
            EntityState::Added,
        );
        let pre = HookNotification::PreCommit {
            entries: vec![entry.clone()],
            validated: false,
        };
        assert!(pre.is_pre_commit());
        assert!(!pre.is_validated());
        assert!(!pre.requires_validation());
        assert_eq!(pre.entries(), &[entry.clone()]);

        let post = HookNotification::PostCommit {
            entries: vec![entry],
        };
        assert!(post.is_post_commit());
        assert!(!post.is_validated());
    }
}
