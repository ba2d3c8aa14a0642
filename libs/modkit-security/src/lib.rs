#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
pub mod context;
pub mod permission;
pub mod subject;

pub use context::{SecurityContext, SecurityContextBuilder};
pub use permission::{OwnershipScope, PermissionParseError, ScopedPermission};
pub use subject::Subject;
