//! # worksession model
//!
//! Entity, identity and value types shared by every worksession crate.
//!
//! This crate provides:
//! - [`Value`] - dynamic field values
//! - [`EntityId`] and [`EntityKey`] - identity used for deduplication and attachment
//! - [`EntityState`] - lifecycle state of a tracked entity
//! - [`Entity`] - persistable fields plus derived (display-only) fields
//! - [`Row`] and [`FromRow`] - raw query results
//!
//! ## Example
//!
//! ```rust
//! use worksession_model::{Entity, EntityId, Value};
//!
//! let mut order = Entity::new("Order", EntityId::new());
//! order.set("total", Value::Integer(42));
//! assert_eq!(order.get("total"), Some(&Value::Integer(42)));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entity;
mod error;
mod id;
mod row;
mod state;
mod value;

pub use entity::{Entity, FieldMap};
pub use error::{ModelError, ModelResult};
pub use id::{EntityId, EntityKey};
pub use row::{FromRow, Row};
pub use state::EntityState;
pub use value::Value;
