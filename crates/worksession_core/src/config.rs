//! Session configuration.

use std::time::Duration;

/// Per-session toggles callers may flip between saves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionFlags {
    /// Whether hook observers receive notifications.
    pub hooks_enabled: bool,
    /// Whether pending changes are detected from snapshots before a save.
    pub auto_detect_changes: bool,
    /// Whether the validator runs before the physical write.
    pub validate_on_save: bool,
    /// Forwarded to the change tracker; the in-memory tracker only records it.
    pub proxy_creation: bool,
}

impl Default for SessionFlags {
    fn default() -> Self {
        Self {
            hooks_enabled: true,
            auto_detect_changes: true,
            validate_on_save: true,
            proxy_creation: false,
        }
    }
}

/// How often the committer retries after an optimistic-concurrency conflict.
///
/// `Unbounded` never gives up: a workload where conflicts keep recurring
/// never completes the save. `Limited` surfaces the conflict after the given
/// number of retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictRetryPolicy {
    /// Retry until the write succeeds or fails for another reason.
    Unbounded,
    /// Retry at most this many times.
    Limited(u32),
}

impl ConflictRetryPolicy {
    /// Returns true if a retry may follow the given failed attempt (1-based).
    #[must_use]
    pub const fn allows_retry(self, failed_attempt: u32) -> bool {
        match self {
            Self::Unbounded => true,
            Self::Limited(max) => failed_attempt <= max,
        }
    }
}

/// How a reload after a conflict treats the caller's pending values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Refresh the baseline and untouched fields; keep pending field values.
    KeepPending,
    /// Replace the entity with the persisted row; pending values are lost.
    DiscardPending,
}

/// Configuration for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Session toggles.
    pub flags: SessionFlags,
    /// Conflict retry policy.
    pub conflict_retry: ConflictRetryPolicy,
    /// Reload merge policy.
    pub merge_policy: MergePolicy,
    /// Maximum unvalidated pre-notification passes per save.
    pub max_hook_passes: usize,
    /// Command timeout applied to the store when the session opens.
    pub command_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            flags: SessionFlags::default(),
            conflict_retry: ConflictRetryPolicy::Unbounded,
            merge_policy: MergePolicy::KeepPending,
            max_hook_passes: 16,
            command_timeout: None,
        }
    }
}

impl SessionConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether hooks are enabled.
    #[must_use]
    pub const fn hooks_enabled(mut self, value: bool) -> Self {
        self.flags.hooks_enabled = value;
        self
    }

    /// Sets whether changes are detected automatically.
    #[must_use]
    pub const fn auto_detect_changes(mut self, value: bool) -> Self {
        self.flags.auto_detect_changes = value;
        self
    }

    /// Sets whether validation runs on save.
    #[must_use]
    pub const fn validate_on_save(mut self, value: bool) -> Self {
        self.flags.validate_on_save = value;
        self
    }

    /// Sets whether the tracker may create proxies.
    #[must_use]
    pub const fn proxy_creation(mut self, value: bool) -> Self {
        self.flags.proxy_creation = value;
        self
    }

    /// Sets the conflict retry policy.
    #[must_use]
    pub const fn conflict_retry(mut self, policy: ConflictRetryPolicy) -> Self {
        self.conflict_retry = policy;
        self
    }

    /// Sets the reload merge policy.
    #[must_use]
    pub const fn merge_policy(mut self, policy: MergePolicy) -> Self {
        self.merge_policy = policy;
        self
    }

    /// Sets the maximum number of hook passes.
    #[must_use]
    pub const fn max_hook_passes(mut self, passes: usize) -> Self {
        self.max_hook_passes = passes;
        self
    }

    /// Sets the command timeout.
    #[must_use]
    pub const fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }
}
