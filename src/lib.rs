//! # Blog Rights
//!
//! A multi-tenant rights and roles authorization cache for a blog engine.
//!
//! Every blog instance ("tenant") has its own set of roles and its own
//! persisted grants of rights to those roles. The service keeps, per tenant,
//! an in-memory index of which roles hold which rights and answers
//! authorization questions from it without touching storage.
//!
//! ## Features
//!
//! - A fixed catalog of rights grouped into categories
//! - Per-tenant role to rights index rebuilt from the role and rights stores
//! - Stale grants (unknown roles or rights) dropped on every refresh
//! - Built-in defaults for the anonymous and editor roles
//! - The administrator role always holds every right
//! - Role creation, renaming and deletion that keep grants consistent
//! - "Any" and "all" checks and demands for the current caller
//! - Readers never see a half-applied refresh
//!
//! ## Quick Start
//!
//! ```rust
//! use blog_rights::{AuthorizationService, Principal, Rights, RoleStore, TenantId};
//!
//! let service = AuthorizationService::new();
//! let tenant = TenantId::new();
//!
//! // Create a role and give it some rights
//! service.create_role(&tenant, "Authors")?;
//! service.set_rights_for_role(&tenant, "Authors", &[Rights::CreateNewPosts, Rights::EditOwnPosts])?;
//! service
//!     .role_store()
//!     .add_users_to_roles(&tenant, &["alice".to_string()], &["Authors".to_string()])?;
//!
//! // Check the caller
//! let alice = Principal::authenticated("alice");
//! let security = service.security(&tenant, &alice)?;
//! assert!(security.is_authorized_to(Rights::CreateNewPosts)?);
//! assert!(!security.is_authorized_to(Rights::EditOtherUsersPosts)?);
//!
//! // Anonymous callers get the anonymous role's defaults
//! let visitor = Principal::anonymous();
//! let security = service.security(&tenant, &visitor)?;
//! assert!(security.is_authorized_to(Rights::ViewPublicPosts)?);
//! # Ok::<(), blog_rights::Error>(())
//! ```
//!
//! ## Audit Logging
//!
//! When the `audit` feature is enabled, refreshes, role changes and failed
//! demands are logged through the standard Rust logging framework. To enable
//! logging:
//!
//! ```rust
//! use blog_rights::init_audit_logger;
//!
//! // Initialize logging (must be called early in program execution)
//! init_audit_logger();
//!
//! // Configure log level through RUST_LOG environment variable:
//! // RUST_LOG=info,blog_rights=debug
//! ```
//!
//! The following events are logged:
//! - Rights refreshes and default rights being applied (info)
//! - Stale grants being dropped (debug)
//! - Role creation, renaming and deletion (info)
//! - Failed demands and unconfirmed role creation (warn)
//! - Sign in and sign out of sessions
//!
//! Logging can be switched off per service with
//! [`AuthorizationConfig::with_audit`]. Sessions started through
//! [`AuthorizationService::session`] follow the same switch; a bare
//! [`Session`] has its own [`Session::with_audit`].

#[cfg(feature = "audit")]
pub fn init_audit_logger() {
    env_logger::init();
}

/// Log through `log` when the `audit` feature is on and auditing is enabled
/// on `$config`, a service config or a session.
macro_rules! audit {
    ($config:expr, $level:ident, $($arg:tt)+) => {{
        #[cfg(feature = "audit")]
        {
            if $config.enable_audit {
                log::$level!($($arg)+);
            }
        }
    }};
}

pub mod config;
pub mod core;
pub mod error;
pub mod identity;
pub mod macros;
pub mod metrics;
pub mod registry;
pub mod right;
pub mod rights;
pub mod role;
pub mod security;
pub mod storage;
pub mod tenant;


#[cfg(feature = "async")]
pub mod async_support;

// Re-export main types for convenience
pub use crate::{
    config::AuthorizationConfig,
    core::{AuthorizationService, UnauthorizedHandler},
    error::{Error, Result},
    identity::{Identity, Membership, Principal, Session, SessionState},
    metrics::{AuthorizationMetrics, MetricsSummary},
    registry::RightRegistry,
    right::Right,
    rights::{RightCategory, Rights},
    role::{ANONYMOUS_DEFAULT_RIGHTS, EDITOR_DEFAULT_RIGHTS, SystemRole},
    security::{AccessResult, AuthorizationCheck, Security},
    storage::{MemoryRightsStore, MemoryRoleStore, PersistedRights, RightsStore, RoleStore},
    tenant::{RoleEntry, RoleIndex, TenantId},
};

#[cfg(feature = "persistence")]
pub use crate::storage::FileRightsStore;

#[cfg(feature = "async")]
pub use crate::async_support::AsyncAuthorizationService;
