//! # worksession core
//!
//! Unit-of-work session engine for worksession.
//!
//! This crate provides:
//! - Change tracking with an identity map and snapshot change detection
//! - A save pipeline with pre/post-commit hooks and hook-dirtied passes
//! - Validation that aborts the save before anything is written
//! - Optimistic-concurrency recovery (reload and retry), blocking and async
//! - Raw queries, statements, batch scripts and stored procedure calls
//! - Connection resolution from memory, environment or JSON settings

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod attach;
mod commit;
mod config;
mod connection;
mod error;
pub mod hooks;
mod raw;
mod session;
mod tracker;
pub mod validation;

pub use attach::AttachmentManager;
pub use commit::ConcurrencyRetryCommitter;
pub use config::{ConflictRetryPolicy, MergePolicy, SessionConfig, SessionFlags};
pub use connection::{
    ConnectionDescriptor, ConnectionResolver, ConnectionSettings, EnvSettings, JsonFileSettings,
    MemorySettings, SettingsStore, StoreConnector,
};
pub use error::{CoreError, CoreResult};
pub use hooks::{DedupSet, HookNotification, HookObserver, HookPipeline};
pub use raw::{render_procedure_call, ParameterDirection, ProcedureArg, RawExecutor, ID_COLUMN};
pub use session::Session;
pub use tracker::{ChangeEntry, ChangeTracker, InMemoryTracker};
pub use validation::{
    EntityValidationFailure, FieldViolation, Rule, RuleValidator, ValidationErrors,
    ValidationResult, Validator,
};

// Re-export the model and store types sessions are used with.
pub use worksession_model::{Entity, EntityId, EntityKey, EntityState, FieldMap, FromRow, Row, Value};
pub use worksession_store::{DataStore, InMemoryStore, StoreError};
