//! # Custom Resource Definitions
//!
//! CRD types watched by the controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `UnifiedNetworkPolicy` and its specification types
//! - `status.rs` - Status reported on the policy object

mod spec;
mod status;

pub use spec::{
    DefaultPolicy, L7Policy, LabelSelector, LabelSelectorRequirement, UnifiedNetworkPolicy,
    UnifiedNetworkPolicySpec, UrlFilter,
};
pub use status::UnifiedNetworkPolicyStatus;
