//! # Prelude
//!
//! Re-exports commonly used types for convenience.
//!
//! ```rust
//! use model::prelude::*;
//!
//! let key = UnpKey::new("default/allow-web");
//! assert_eq!(key.to_string(), "UNP(name=default/allow-web)");
//! ```

pub use crate::errors::KeyError;
pub use crate::key::{parse_value, serialize_value, Key, KvPair, Value, ValueShape};
pub use crate::node::{HostConfigKey, Node, NodeKey};
pub use crate::ready::ReadyFlagKey;
pub use crate::unp::UnpKey;
