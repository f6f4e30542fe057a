//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Request (identity resolved by the context layer)
//!     → authz.rs (role from request, longest-prefix rule match)
//!     → 403 JSON on rejection, otherwise on to dispatch
//! ```
//!
//! # Design Decisions
//! - Authorization only applies when client certificates are required
//! - Unmatched paths are denied

pub mod authz;

pub use authz::{Authz, AuthzError, PathAuthz, RoleMapper};
