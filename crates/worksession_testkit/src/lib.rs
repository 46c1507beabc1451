//! # worksession testkit
//!
//! Test utilities for worksession.
//!
//! This crate provides:
//! - Session fixtures over an in-memory store
//! - Recording observers, validators and stores that log one shared
//!   event sequence, for asserting the order of a save cycle
//! - Property-based test generators using proptest
//! - Test logging setup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use worksession_testkit::prelude::*;
//!
//! #[test]
//! fn saves_in_order() {
//!     let mut t = TestSession::memory();
//!     t.observe();
//!     t.add(order(1, 10)).unwrap();
//!     t.save().unwrap();
//!     assert_eq!(t.log.labels(), vec!["pre", "pre(validated)", "write", "post"]);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod logging;
pub mod recording;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::logging::*;
    pub use crate::recording::*;
}

pub use fixtures::*;
pub use generators::*;
pub use logging::*;
pub use recording::*;
