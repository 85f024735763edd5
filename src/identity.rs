//! Caller identity and sign-in state.
//!
//! The service never caches role membership on an identity. Roles are looked
//! up in the role store on every authorization check since grants can change
//! while a session is alive.

use crate::error::Result;
use crate::tenant::TenantId;
use std::fmt::Debug;

/// Who is making the current request.
pub trait Identity: Send + Sync + Debug {
    /// Whether the caller has signed in.
    fn is_authenticated(&self) -> bool;

    /// Name of the signed in user, `None` for anonymous callers.
    fn user_name(&self) -> Option<&str>;
}

/// Validates credentials against the membership provider.
pub trait Membership: Send + Sync {
    /// Returns true if the credentials are valid for the tenant.
    fn validate_user(&self, tenant: &TenantId, user_name: &str, password: &str) -> Result<bool>;
}

/// A plain identity value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    user_name: Option<String>,
}

impl Principal {
    /// A caller that has not signed in.
    pub fn anonymous() -> Self {
        Self { user_name: None }
    }

    /// A signed in user.
    pub fn authenticated(user_name: impl Into<String>) -> Self {
        Self {
            user_name: Some(user_name.into()),
        }
    }
}

impl Identity for Principal {
    fn is_authenticated(&self) -> bool {
        self.user_name.is_some()
    }

    fn user_name(&self) -> Option<&str> {
        self.user_name.as_deref()
    }
}

/// Sign-in state of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated { user_name: String },
}

/// A per-tenant user session.
#[derive(Debug, Clone)]
pub struct Session {
    tenant: TenantId,
    state: SessionState,
    enable_audit: bool,
}

impl Session {
    /// Start an unauthenticated session. Sign-ins are audited when the
    /// `audit` feature is on; see [`with_audit`](Self::with_audit).
    pub fn new(tenant: TenantId) -> Self {
        Self {
            tenant,
            state: SessionState::Unauthenticated,
            enable_audit: true,
        }
    }

    /// Switch audit logging of sign-ins and sign-outs.
    pub fn with_audit(mut self, enabled: bool) -> Self {
        self.enable_audit = enabled;
        self
    }

    /// Whether sign-ins and sign-outs are audited.
    pub fn audit_enabled(&self) -> bool {
        self.enable_audit
    }

    /// The tenant this session belongs to.
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Current state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Validate credentials and move to `Authenticated` on success. A failed
    /// attempt leaves the session unchanged.
    pub fn sign_in(
        &mut self,
        membership: &dyn Membership,
        user_name: &str,
        password: &str,
    ) -> Result<bool> {
        let user_name = user_name.trim();
        if user_name.is_empty() || password.is_empty() {
            return Ok(false);
        }

        if !membership.validate_user(&self.tenant, user_name, password)? {
            audit!(self, warn, "Sign in failed for user '{user_name}' in tenant {}", self.tenant);
            return Ok(false);
        }

        audit!(self, info, "User '{user_name}' signed in to tenant {}", self.tenant);

        self.state = SessionState::Authenticated {
            user_name: user_name.to_string(),
        };
        Ok(true)
    }

    /// Return to `Unauthenticated`.
    pub fn sign_out(&mut self) {
        #[cfg(feature = "audit")]
        if let SessionState::Authenticated { user_name } = &self.state {
            audit!(self, info, "User '{user_name}' signed out of tenant {}", self.tenant);
        }

        self.state = SessionState::Unauthenticated;
    }
}

impl Identity for Session {
    fn is_authenticated(&self) -> bool {
        matches!(self.state, SessionState::Authenticated { .. })
    }

    fn user_name(&self) -> Option<&str> {
        match &self.state {
            SessionState::Authenticated { user_name } => Some(user_name),
            SessionState::Unauthenticated => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedMembership;

    impl Membership for FixedMembership {
        fn validate_user(&self, _tenant: &TenantId, user_name: &str, password: &str) -> Result<bool> {
            Ok(user_name == "alice" && password == "correct horse")
        }
    }

    #[test]
    fn test_principal() {
        assert!(!Principal::anonymous().is_authenticated());
        assert_eq!(Principal::anonymous().user_name(), None);

        let alice = Principal::authenticated("alice");
        assert!(alice.is_authenticated());
        assert_eq!(alice.user_name(), Some("alice"));
    }

    #[test]
    fn test_session_state_machine() {
        let mut session = Session::new(TenantId::new());
        assert_eq!(session.state(), &SessionState::Unauthenticated);

        assert!(!session.sign_in(&FixedMembership, "alice", "wrong").unwrap());
        assert!(!session.is_authenticated());

        assert!(session.sign_in(&FixedMembership, " alice ", "correct horse").unwrap());
        assert!(session.is_authenticated());
        assert_eq!(session.user_name(), Some("alice"));

        session.sign_out();
        assert_eq!(session.state(), &SessionState::Unauthenticated);
        assert_eq!(session.user_name(), None);
    }

    #[test]
    fn test_empty_credentials_are_rejected_without_lookup() {
        let mut session = Session::new(TenantId::new());
        assert!(!session.sign_in(&FixedMembership, "  ", "x").unwrap());
        assert!(!session.sign_in(&FixedMembership, "alice", "").unwrap());
    }

    #[test]
    fn test_session_audit_switch() {
        let session = Session::new(TenantId::new());
        assert!(session.audit_enabled());

        let mut quiet = session.with_audit(false);
        assert!(!quiet.audit_enabled());
        assert!(quiet.sign_in(&FixedMembership, "alice", "correct horse").unwrap());
        quiet.sign_out();
        assert!(!quiet.is_authenticated());
    }
}
