//! Notification delivery for one session.

use super::{HookNotification, HookObserver};
use crate::config::SessionFlags;
use crate::error::{CoreError, CoreResult};
use crate::tracker::{ChangeEntry, ChangeTracker};
use std::collections::HashSet;
use tracing::{debug, warn};
use worksession_model::EntityKey;

/// Keys already announced in the current save cycle.
///
/// An entity whose key is in the set is not announced again by a later
/// pass of the same cycle, even if an observer modifies it again.
#[derive(Debug, Default, Clone)]
pub struct DedupSet {
    keys: HashSet<EntityKey>,
}

impl DedupSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a key. Returns false if it was already present.
    pub fn insert(&mut self, key: EntityKey) -> bool {
        self.keys.insert(key)
    }

    /// Returns true if the key was already announced.
    #[must_use]
    pub fn contains(&self, key: &EntityKey) -> bool {
        self.keys.contains(key)
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Removes every key.
    pub fn clear(&mut self) {
        self.keys.clear();
    }
}

/// Observers of a session and the per-cycle dedup state.
#[derive(Default)]
pub struct HookPipeline {
    observers: Vec<Box<dyn HookObserver>>,
    dedup: DedupSet,
}

impl HookPipeline {
    /// Creates a pipeline with no observers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observer. Observers are notified in registration order.
    pub fn register(&mut self, observer: Box<dyn HookObserver>) {
        self.observers.push(observer);
    }

    /// Returns the number of registered observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Returns the keys announced so far in this cycle.
    #[must_use]
    pub fn dedup(&self) -> &DedupSet {
        &self.dedup
    }

    /// Returns pending entries not yet announced in this cycle and marks
    /// them announced.
    pub fn collect_changed(&mut self, tracker: &dyn ChangeTracker) -> Vec<ChangeEntry> {
        tracker
            .entries()
            .into_iter()
            .filter(|entry| entry.state.is_pending())
            .filter(|entry| self.dedup.insert(entry.key.clone()))
            .collect()
    }

    /// Runs the unvalidated pre-commit passes of a save cycle.
    ///
    /// Each pass collects entities that became pending and were not yet
    /// announced, opens their merged-data window and notifies observers.
    /// Passes repeat until one finds nothing new. Every entity the passes
    /// announced is appended to `window`, also when an error is returned,
    /// so the caller can close the window.
    pub fn run_pre_commit(
        &mut self,
        flags: &SessionFlags,
        max_passes: usize,
        tracker: &mut dyn ChangeTracker,
        window: &mut Vec<ChangeEntry>,
    ) -> CoreResult<()> {
        let mut passes = 0usize;
        loop {
            if flags.auto_detect_changes {
                tracker.detect_changes();
            }
            let changed = self.collect_changed(tracker);
            if changed.is_empty() {
                return Ok(());
            }
            if passes >= max_passes {
                return Err(CoreError::HookRecursionLimit { passes });
            }
            passes += 1;

            open_window(tracker, &changed);
            window.extend(changed.iter().cloned());
            debug!(pass = passes, entities = changed.len(), "pre-commit pass");
            self.publish_pre(flags.hooks_enabled, &changed, false, tracker)?;
        }
    }

    /// Publishes a pre-commit notification.
    pub fn publish_pre(
        &mut self,
        hooks_enabled: bool,
        entries: &[ChangeEntry],
        validated: bool,
        tracker: &mut dyn ChangeTracker,
    ) -> CoreResult<()> {
        if !hooks_enabled || entries.is_empty() {
            return Ok(());
        }
        let notification = HookNotification::PreCommit {
            entries: entries.to_vec(),
            validated,
        };
        self.deliver(&notification, tracker)
    }

    /// Publishes a post-commit notification.
    pub fn publish_post(
        &mut self,
        hooks_enabled: bool,
        entries: &[ChangeEntry],
        tracker: &mut dyn ChangeTracker,
    ) -> CoreResult<()> {
        if !hooks_enabled || entries.is_empty() {
            return Ok(());
        }
        let notification = HookNotification::PostCommit {
            entries: entries.to_vec(),
        };
        self.deliver(&notification, tracker)
    }

    /// Forgets which entities were announced.
    pub fn release(&mut self) {
        self.dedup.clear();
    }

    fn deliver(
        &mut self,
        notification: &HookNotification,
        tracker: &mut dyn ChangeTracker,
    ) -> CoreResult<()> {
        for observer in &mut self.observers {
            if let Err(e) = observer.on_notification(notification, tracker) {
                warn!(observer = observer.name(), error = %e, "hook observer failed");
                return Err(e);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for HookPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookPipeline")
            .field("observers", &self.observers.len())
            .field("dedup", &self.dedup)
            .finish()
    }
}

/// Excludes derived data from reads of the given entities.
pub(crate) fn open_window(tracker: &mut dyn ChangeTracker, entries: &[ChangeEntry]) {
    for entry in entries {
        tracker.set_merged_data(&entry.key, true);
    }
}

/// Restores derived data reads of the given entities.
pub(crate) fn close_window(tracker: &mut dyn ChangeTracker, entries: &[ChangeEntry]) {
    for entry in entries {
        tracker.set_merged_data(&entry.key, false);
    }
}

/// Re-reads the current state of each entry.
pub(crate) fn current_states(tracker: &dyn ChangeTracker, entries: &[ChangeEntry]) -> Vec<ChangeEntry> {
    entries
        .iter()
        .map(|entry| ChangeEntry::new(entry.key.clone(), tracker.state(&entry.key)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::InMemoryTracker;
    use std::sync::{Arc, Mutex};
    use worksession_model::{Entity, EntityId, EntityState};

    fn order(n: u128) -> Entity {
        Entity::new("Order", EntityId::from_u128(n)).with("total", 10)
    }

    #[test]
    fn collect_changed_skips_announced() {
        let mut tracker = InMemoryTracker::new();
        tracker.add(order(1)).unwrap();
        tracker.attach(order(2)).unwrap();

        let mut pipeline = HookPipeline::new();
        let first = pipeline.collect_changed(&tracker);
        assert_eq!(first.len(), 1);
        assert!(pipeline.collect_changed(&tracker).is_empty());

        pipeline.release();
        assert!(pipeline.dedup().is_empty());
        assert_eq!(pipeline.collect_changed(&tracker).len(), 1);
    }

    #[test]
    fn hook_dirtied_entities_get_one_extra_pass() {
        let mut tracker = InMemoryTracker::new();
        tracker.add(order(1)).unwrap();
        let audit = Entity::new("Audit", EntityId::from_u128(99));
        let audit_key = audit.key().clone();
        let pending = Arc::new(Mutex::new(Some(audit)));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let mut pipeline = HookPipeline::new();
        let (p, s) = (Arc::clone(&pending), Arc::clone(&seen));
        pipeline.register(Box::new(
            move |n: &HookNotification, t: &mut dyn ChangeTracker| -> CoreResult<()> {
                s.lock().unwrap().push(n.entries().len());
                if let Some(audit) = p.lock().unwrap().take() {
                    t.add(audit)?;
                }
                Ok(())
            },
        ));

        let mut window = Vec::new();
        pipeline
            .run_pre_commit(&SessionFlags::default(), 16, &mut tracker, &mut window)
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![1, 1]);
        assert_eq!(window.len(), 2);
        assert!(tracker.entity(&audit_key).unwrap().is_merged_data_excluded());
    }

    #[test]
    fn runaway_observer_hits_pass_limit() {
        let mut tracker = InMemoryTracker::new();
        tracker.add(order(1)).unwrap();
        let mut next = 100u128;

        let mut pipeline = HookPipeline::new();
        pipeline.register(Box::new(
            move |_: &HookNotification, t: &mut dyn ChangeTracker| -> CoreResult<()> {
                next += 1;
                t.add(order(next))
            },
        ));

        let mut window = Vec::new();
        let err = pipeline
            .run_pre_commit(&SessionFlags::default(), 3, &mut tracker, &mut window)
            .unwrap_err();
        assert!(matches!(err, CoreError::HookRecursionLimit { passes: 3 }));
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn disabled_hooks_deliver_nothing() {
        let mut tracker = InMemoryTracker::new();
        tracker.add(order(1)).unwrap();
        let calls = Arc::new(Mutex::new(0));

        let mut pipeline = HookPipeline::new();
        let c = Arc::clone(&calls);
        pipeline.register(Box::new(
            move |_: &HookNotification, _: &mut dyn ChangeTracker| -> CoreResult<()> {
                *c.lock().unwrap() += 1;
                Ok(())
            },
        ));

        let flags = SessionFlags {
            hooks_enabled: false,
            ..SessionFlags::default()
        };
        let mut window = Vec::new();
        pipeline
            .run_pre_commit(&flags, 16, &mut tracker, &mut window)
            .unwrap();
        pipeline
            .publish_post(false, &window, &mut tracker)
            .unwrap();
        assert_eq!(*calls.lock().unwrap(), 0);
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn observer_error_stops_delivery() {
        let mut tracker = InMemoryTracker::new();
        let later = Arc::new(Mutex::new(0));

        let mut pipeline = HookPipeline::new();
        pipeline.register(Box::new(
            |_: &HookNotification, _: &mut dyn ChangeTracker| -> CoreResult<()> {
                Err(CoreError::observer("audit", "audit table locked"))
            },
        ));
        let l = Arc::clone(&later);
        pipeline.register(Box::new(
            move |_: &HookNotification, _: &mut dyn ChangeTracker| -> CoreResult<()> {
                *l.lock().unwrap() += 1;
                Ok(())
            },
        ));

        let entries = vec![ChangeEntry::new(order(1).key().clone(), EntityState::Added)];
        let err = pipeline
            .publish_pre(true, &entries, false, &mut tracker)
            .unwrap_err();
        assert!(matches!(err, CoreError::Observer { .. }));
        assert_eq!(*later.lock().unwrap(), 0);
    }
}
