//! Datastore key model for the Nimbess datastore
//!
//! This crate centralizes how watched cluster resources map onto the
//! hierarchical key space of the Nimbess datastore, and how their values are
//! encoded, so that the controller and any reader of the datastore agree on
//! both.
//!
//! ## Quick Start
//!
//! ```rust
//! use model::prelude::*;
//!
//! let key = NodeKey::new("h1");
//! assert_eq!(key.default_path().unwrap(), "/nimbess/host/h1");
//! ```
//!
//! ## Keys
//!
//! Every key variant implements [`Key`](key::Key): a storage path, a delete
//! path, the shape of the value stored under it and a display form. Paths are
//! derived only from identity fields, never from value content.
//!
//! ## Values
//!
//! The [`ValueShape`](key::ValueShape) of a key decides how its value is
//! encoded: structured records go through JSON, raw scalars are written as
//! bare text.

pub mod errors;
pub mod key;
pub mod node;
pub mod prelude;
pub mod ready;
pub mod unp;

/// Root of the Nimbess key space
pub const KEY_ROOT: &str = "/nimbess";
