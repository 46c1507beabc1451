//! Commit with optimistic-concurrency recovery.

use crate::config::{ConflictRetryPolicy, MergePolicy};
use crate::error::CoreResult;
use crate::tracker::ChangeTracker;
use tracing::{debug, warn};
use worksession_store::{DataStore, StoreError};

/// Writes the tracker's pending batch, reloading and retrying on conflicts.
///
/// On a [`StoreError::ConcurrencyConflict`] each conflicting entry is
/// reloaded from the store (detached if its row is gone) and the write is
/// attempted again with a freshly built batch. Any other error is returned
/// unchanged. On success every pending entry is accepted.
#[derive(Debug, Clone, Copy)]
pub struct ConcurrencyRetryCommitter {
    retry: ConflictRetryPolicy,
    merge: MergePolicy,
}

impl ConcurrencyRetryCommitter {
    /// Creates a committer.
    #[must_use]
    pub const fn new(retry: ConflictRetryPolicy, merge: MergePolicy) -> Self {
        Self { retry, merge }
    }

    /// Returns the retry policy.
    #[must_use]
    pub const fn retry_policy(&self) -> ConflictRetryPolicy {
        self.retry
    }

    /// Commits pending changes, blocking the calling thread.
    pub fn commit(&self, tracker: &mut dyn ChangeTracker, store: &dyn DataStore) -> CoreResult<usize> {
        let mut attempt = 1u32;
        loop {
            let batch = tracker.pending_batch();
            debug!(attempt, changes = batch.len(), "applying batch");
            match store.apply(&batch) {
                Ok(affected) => {
                    tracker.accept_all_changes();
                    return Ok(affected);
                }
                Err(StoreError::ConcurrencyConflict { keys }) if self.retry.allows_retry(attempt) => {
                    warn!(attempt, conflicts = keys.len(), "concurrency conflict, reloading entries");
                    for key in &keys {
                        let persisted = store.fetch(key)?;
                        tracker.reload(key, persisted, self.merge)?;
                    }
                    attempt = next_attempt(attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Commits pending changes without blocking.
    ///
    /// The reload and retry happen inside the same future; the caller awaits
    /// one result.
    pub async fn commit_async(
        &self,
        tracker: &mut dyn ChangeTracker,
        store: &dyn DataStore,
    ) -> CoreResult<usize> {
        let mut attempt = 1u32;
        loop {
            let batch = tracker.pending_batch();
            debug!(attempt, changes = batch.len(), "applying batch");
            match store.apply_async(&batch).await {
                Ok(affected) => {
                    tracker.accept_all_changes();
                    return Ok(affected);
                }
                Err(StoreError::ConcurrencyConflict { keys }) if self.retry.allows_retry(attempt) => {
                    warn!(attempt, conflicts = keys.len(), "concurrency conflict, reloading entries");
                    for key in &keys {
                        let persisted = store.fetch_async(key).await?;
                        tracker.reload(key, persisted, self.merge)?;
                    }
                    attempt = next_attempt(attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Advances the attempt counter, saturating at `u32::MAX`.
const fn next_attempt(attempt: u32) -> u32 {
    attempt.saturating_add(1)
}

impl Default for ConcurrencyRetryCommitter {
    fn default() -> Self {
        Self::new(ConflictRetryPolicy::Unbounded, MergePolicy::KeepPending)
    }
}
