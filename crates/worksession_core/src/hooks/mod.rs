//! Save-time hook notifications.
//!
//! Observers registered on a session are told about each save cycle:
//! - before validation, with the set of changed entities
//! - after validation, with the same set flagged as validated
//! - after the physical write, with the entities' new states
//!
//! Observers receive the session's change tracker and may modify or add
//! entities. Entities dirtied this way get their own pre-commit pass
//! before validation runs.
//!
//! # Usage
//!
//! ```rust,ignore
//! use worksession_core::{ChangeTracker, CoreResult, HookNotification, Session};
//!
//! session.register_observer(
//!     |n: &HookNotification, _: &mut dyn ChangeTracker| -> CoreResult<()> {
//!         if n.is_post_commit() {
//!             println!("saved {} entities", n.entries().len());
//!         }
//!         Ok(())
//!     },
//! );
//! ```

mod notification;
pub(crate) mod pipeline;

pub use notification::{HookNotification, HookObserver};
pub use pipeline::{DedupSet, HookPipeline};
