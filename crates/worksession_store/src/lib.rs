//! # worksession store
//!
//! Data store trait and implementations for worksession.
//!
//! A data store is the physical side of a session: it applies change
//! batches atomically, detects optimistic-concurrency conflicts, and runs
//! raw commands that bypass the entity pipeline.
//!
//! ## Design Principles
//!
//! - A batch is applied all-or-nothing
//! - A Modified or Deleted change whose original values no longer match the
//!   persisted row is rejected with [`StoreError::ConcurrencyConflict`]
//! - Stores are `Send + Sync` and shared as `Arc<dyn DataStore>`
//! - Every blocking operation has an async counterpart
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For tests and ephemeral sessions
//!
//! ## Example
//!
//! ```rust
//! use worksession_model::{EntityId, EntityKey, EntityState, FieldMap, Value};
//! use worksession_store::{ChangeBatch, DataStore, InMemoryStore, PendingChange};
//!
//! let store = InMemoryStore::new();
//! let key = EntityKey::new("Order", EntityId::new());
//! let mut current = FieldMap::new();
//! current.insert("total".into(), Value::Integer(5));
//!
//! let mut batch = ChangeBatch::new();
//! batch.push(PendingChange::new(key.clone(), EntityState::Added, FieldMap::new(), current));
//! assert_eq!(store.apply(&batch).unwrap(), 1);
//! assert!(store.fetch(&key).unwrap().is_some());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod batch;
mod error;
mod memory;
pub mod script;
mod store;

pub use batch::{ChangeBatch, PendingChange};
pub use error::{StoreError, StoreResult};
pub use memory::{ExecutedCommand, InMemoryStore};
pub use store::{CommandKind, CommandOptions, DataStore};
