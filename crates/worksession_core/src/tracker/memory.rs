//! In-memory change tracker.

use super::{ChangeEntry, ChangeTracker};
use crate::config::MergePolicy;
use crate::error::{CoreError, CoreResult};
use std::collections::HashMap;
use tracing::debug;
use worksession_model::{Entity, EntityKey, EntityState, FieldMap, Value};
use worksession_store::{ChangeBatch, PendingChange};

#[derive(Debug, Clone)]
struct TrackedEntry {
    entity: Entity,
    original: FieldMap,
    state: EntityState,
}

impl TrackedEntry {
    fn changed_fields(&self) -> Vec<String> {
        let current = self.entity.fields();
        let mut names: Vec<String> = current
            .iter()
            .filter(|&(name, value)| self.original.get(name) != Some(value))
            .map(|(name, _)| name.clone())
            .collect();
        names.extend(
            self.original
                .keys()
                .filter(|name| !current.contains_key(*name))
                .cloned(),
        );
        names.sort();
        names
    }

    fn is_dirty(&self) -> bool {
        self.entity.fields() != &self.original
    }
}

/// Snapshot-based change tracker.
///
/// Each entry keeps the baseline field values it was attached or last saved
/// with. [`ChangeTracker::detect_changes`] compares the live instance
/// against that baseline.
#[derive(Debug, Default)]
pub struct InMemoryTracker {
    entries: HashMap<EntityKey, TrackedEntry>,
    order: Vec<EntityKey>,
    proxy_creation: bool,
}

impl InMemoryTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of tracked entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Returns the last proxy creation setting forwarded by the session.
    #[must_use]
    pub fn proxy_creation(&self) -> bool {
        self.proxy_creation
    }

    fn track(&mut self, entity: Entity, state: EntityState, original: FieldMap) -> CoreResult<()> {
        let key = entity.key().clone();
        if self.entries.contains_key(&key) {
            return Err(CoreError::AlreadyTracked { key });
        }
        debug!(key = %key, state = %state, "tracking entity");
        self.entries.insert(
            key.clone(),
            TrackedEntry {
                entity,
                original,
                state,
            },
        );
        self.order.push(key);
        Ok(())
    }

    fn untrack(&mut self, key: &EntityKey) -> Option<TrackedEntry> {
        let entry = self.entries.remove(key)?;
        self.order.retain(|k| k != key);
        Some(entry)
    }
}

impl ChangeTracker for InMemoryTracker {
    fn entries(&self) -> Vec<ChangeEntry> {
        self.order
            .iter()
            .filter_map(|key| {
                self.entries
                    .get(key)
                    .map(|entry| ChangeEntry::new(key.clone(), entry.state))
            })
            .collect()
    }

    fn is_tracked(&self, key: &EntityKey) -> bool {
        self.entries.contains_key(key)
    }

    fn entity(&self, key: &EntityKey) -> Option<&Entity> {
        self.entries.get(key).map(|entry| &entry.entity)
    }

    fn entity_mut(&mut self, key: &EntityKey) -> Option<&mut Entity> {
        self.entries.get_mut(key).map(|entry| &mut entry.entity)
    }

    fn state(&self, key: &EntityKey) -> EntityState {
        self.entries
            .get(key)
            .map_or(EntityState::Detached, |entry| entry.state)
    }

    fn original_value(&self, key: &EntityKey, field: &str) -> Option<Value> {
        self.entries
            .get(key)
            .and_then(|entry| entry.original.get(field).cloned())
    }

    fn modified_fields(&self, key: &EntityKey) -> Vec<String> {
        match self.entries.get(key) {
            Some(entry) if entry.state == EntityState::Modified => entry.changed_fields(),
            _ => Vec::new(),
        }
    }

    fn add(&mut self, entity: Entity) -> CoreResult<()> {
        self.track(entity, EntityState::Added, FieldMap::new())
    }

    fn attach(&mut self, entity: Entity) -> CoreResult<()> {
        let original = entity.fields().clone();
        self.track(entity, EntityState::Unchanged, original)
    }

    fn remove(&mut self, key: &EntityKey) -> CoreResult<()> {
        match self.state(key) {
            EntityState::Detached => Err(CoreError::not_tracked(key)),
            EntityState::Added => {
                self.untrack(key);
                Ok(())
            }
            _ => {
                if let Some(entry) = self.entries.get_mut(key) {
                    entry.state = EntityState::Deleted;
                }
                Ok(())
            }
        }
    }

    fn detach(&mut self, key: &EntityKey) -> bool {
        self.untrack(key).is_some()
    }

    fn mark_modified(&mut self, key: &EntityKey) -> CoreResult<()> {
        let entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| CoreError::not_tracked(key))?;
        if entry.state == EntityState::Unchanged {
            entry.state = EntityState::Modified;
        }
        Ok(())
    }

    fn detect_changes(&mut self) {
        for entry in self.entries.values_mut() {
            match entry.state {
                EntityState::Unchanged if entry.is_dirty() => {
                    entry.state = EntityState::Modified;
                }
                EntityState::Modified if !entry.is_dirty() => {
                    entry.state = EntityState::Unchanged;
                }
                _ => {}
            }
        }
    }

    fn pending_batch(&self) -> ChangeBatch {
        self.order
            .iter()
            .filter_map(|key| self.entries.get(key))
            .filter(|entry| entry.state.is_pending())
            .map(|entry| {
                PendingChange::new(
                    entry.entity.key().clone(),
                    entry.state,
                    entry.original.clone(),
                    entry.entity.fields().clone(),
                )
            })
            .collect()
    }

    fn accept_all_changes(&mut self) {
        let deleted: Vec<EntityKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.state == EntityState::Deleted)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &deleted {
            self.untrack(key);
        }

        for entry in self.entries.values_mut() {
            if entry.state.is_pending() {
                entry.original = entry.entity.fields().clone();
                entry.state = EntityState::Unchanged;
            }
        }
    }

    fn reload(
        &mut self,
        key: &EntityKey,
        persisted: Option<FieldMap>,
        policy: MergePolicy,
    ) -> CoreResult<()> {
        let Some(persisted) = persisted else {
            debug!(key = %key, "row no longer exists; detaching");
            return if self.untrack(key).is_some() {
                Ok(())
            } else {
                Err(CoreError::not_tracked(key))
            };
        };

        let entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| CoreError::not_tracked(key))?;

        match policy {
            MergePolicy::DiscardPending => {
                entry.entity.replace_fields(persisted.clone());
                entry.original = persisted;
                entry.state = EntityState::Unchanged;
            }
            MergePolicy::KeepPending => {
                let pending: Vec<String> = if entry.state == EntityState::Added {
                    entry.entity.fields().keys().cloned().collect()
                } else {
                    entry.changed_fields()
                };
                let mut merged = persisted.clone();
                for name in pending {
                    match entry.entity.fields().get(&name) {
                        Some(value) => {
                            merged.insert(name, value.clone());
                        }
                        None => {
                            merged.remove(&name);
                        }
                    }
                }
                entry.entity.replace_fields(merged);
                entry.original = persisted;
                entry.state = match entry.state {
                    EntityState::Deleted => EntityState::Deleted,
                    _ if entry.is_dirty() => EntityState::Modified,
                    _ => EntityState::Unchanged,
                };
            }
        }
        Ok(())
    }

    fn set_merged_data(&mut self, key: &EntityKey, excluded: bool) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.entity.set_merged_data_excluded(excluded);
        }
    }

    fn set_proxy_creation(&mut self, enabled: bool) {
        self.proxy_creation = enabled;
    }
}
