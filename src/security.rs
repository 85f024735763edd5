//! Authorization checks for the current caller.
//!
//! A [`Security`] value is created per request from the service, the tenant
//! being served and the caller's [`Identity`]. Creating it loads the tenant's
//! rights if this is the first request for that tenant.

use crate::{
    core::AuthorizationService,
    error::{Error, Result},
    identity::Identity,
    rights::Rights,
    role::roles_equal,
    storage::{RightsStore, RoleStore},
    tenant::TenantId,
};

/// How a set of rights is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationCheck {
    /// At least one of the rights must be held.
    HasAny,
    /// Every one of the rights must be held.
    HasAll,
}

/// The result of a demand.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessResult {
    /// Access is granted.
    Granted,
    /// Access is denied with a reason.
    Denied(String),
}

impl AccessResult {
    /// Returns true if access was granted.
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessResult::Granted)
    }

    /// Returns true if access was denied.
    pub fn is_denied(&self) -> bool {
        !self.is_granted()
    }

    /// Returns the denial reason if access was denied.
    pub fn denial_reason(&self) -> Option<&str> {
        match self {
            AccessResult::Denied(reason) => Some(reason),
            AccessResult::Granted => None,
        }
    }
}

impl From<bool> for AccessResult {
    fn from(granted: bool) -> Self {
        if granted {
            AccessResult::Granted
        } else {
            AccessResult::Denied("Access denied".to_string())
        }
    }
}

impl<R, S> AuthorizationService<R, S>
where
    R: RoleStore,
    S: RightsStore,
{
    /// Start answering authorization questions for one request.
    pub fn security<'a>(
        &'a self,
        tenant: &TenantId,
        identity: &'a dyn Identity,
    ) -> Result<Security<'a, R, S>> {
        self.ensure_tenant(tenant)?;
        Ok(Security {
            service: self,
            tenant: *tenant,
            identity,
        })
    }
}

/// Authorization facade bound to a tenant and a caller.
pub struct Security<'a, R, S>
where
    R: RoleStore,
    S: RightsStore,
{
    service: &'a AuthorizationService<R, S>,
    tenant: TenantId,
    identity: &'a dyn Identity,
}

impl<R, S> Security<'_, R, S>
where
    R: RoleStore,
    S: RightsStore,
{
    /// The tenant being served.
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Whether the caller has signed in.
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_authenticated()
    }

    /// Name of the caller if signed in.
    pub fn current_user_name(&self) -> Option<&str> {
        if self.identity.is_authenticated() {
            self.identity.user_name()
        } else {
            None
        }
    }

    /// Roles of the caller, looked up fresh on every call. Anonymous callers
    /// get a newly built list holding only the anonymous role.
    pub fn current_user_roles(&self) -> Result<Vec<String>> {
        match self.current_user_name() {
            Some(user) => self.service.role_store().get_roles_for_user(&self.tenant, user),
            None => Ok(vec![self.service.config().anonymous_role.clone()]),
        }
    }

    /// Whether the caller belongs to the administrator role.
    pub fn is_administrator(&self) -> Result<bool> {
        let admin = &self.service.config().administrator_role;
        Ok(self
            .current_user_roles()?
            .iter()
            .any(|role| roles_equal(role, admin)))
    }

    /// Whether the caller holds a right.
    pub fn is_authorized_to(&self, right: Rights) -> Result<bool> {
        self.is_authorized(AuthorizationCheck::HasAny, &[right])
    }

    /// Whether the caller holds any or all of `rights`. An empty list is
    /// never authorized.
    pub fn is_authorized(&self, check: AuthorizationCheck, rights: &[Rights]) -> Result<bool> {
        if rights.is_empty() {
            self.service.metrics().record_check(false);
            return Ok(false);
        }

        let roles = self.current_user_roles()?;
        let registry = self.service.registry();
        let mut granted = match check {
            AuthorizationCheck::HasAny => false,
            AuthorizationCheck::HasAll => true,
        };
        for right in rights {
            let held = registry.right_by_flag(*right)?.has_any_role(&self.tenant, roles.as_slice());
            match check {
                AuthorizationCheck::HasAny if held => {
                    granted = true;
                    break;
                }
                AuthorizationCheck::HasAll if !held => {
                    granted = false;
                    break;
                }
                _ => {}
            }
        }

        self.service.metrics().record_check(granted);
        Ok(granted)
    }

    /// Require the caller to hold any or all of `rights`.
    ///
    /// On failure, with `redirect` set the service's unauthorized handler is
    /// run and [`AccessResult::Denied`] is returned; otherwise the failure is
    /// returned as [`Error::SecurityViolation`].
    pub fn demand(
        &self,
        check: AuthorizationCheck,
        rights: &[Rights],
        redirect: bool,
    ) -> Result<AccessResult> {
        if self.is_authorized(check, rights)? {
            return Ok(AccessResult::Granted);
        }

        self.service.metrics().record_demand_failure();
        let user = self.current_user_name().unwrap_or("anonymous caller");
        let reason = format!("{user} lacks {check:?} of {rights:?}");

        audit!(
            self.service.config(),
            warn,
            "Authorization demand failed in tenant {}: {reason}",
            self.tenant
        );

        if redirect {
            self.service
                .notify_unauthorized(&self.tenant, self.current_user_name());
            Ok(AccessResult::Denied(reason))
        } else {
            Err(Error::SecurityViolation(reason))
        }
    }

    /// Require a single right. See [`demand`](Self::demand).
    pub fn demand_right(&self, right: Rights, redirect: bool) -> Result<AccessResult> {
        self.demand(AuthorizationCheck::HasAny, &[right], redirect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Principal;
    use crate::storage::MemoryRoleStore;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_access_result() {
        assert!(AccessResult::from(true).is_granted());
        let denied = AccessResult::from(false);
        assert!(denied.is_denied());
        assert_eq!(denied.denial_reason(), Some("Access denied"));
    }

    #[test]
    fn test_anonymous_roles_are_fresh_each_call() {
        let tenant = TenantId::new();
        let service = AuthorizationService::new();
        let anonymous = Principal::anonymous();
        let security = service.security(&tenant, &anonymous).unwrap();

        let mut first = security.current_user_roles().unwrap();
        first.push("Administrators".to_string());
        assert_eq!(security.current_user_roles().unwrap(), vec!["Anonymous"]);
        assert!(!security.is_administrator().unwrap());
    }

    #[test]
    fn test_empty_rights_are_never_authorized() {
        let tenant = TenantId::new();
        let service = AuthorizationService::new();
        let admin = Principal::authenticated("root");
        service.role_store().create_role(&tenant, "Administrators").unwrap();
        service
            .role_store()
            .add_users_to_roles(&tenant, &["root".to_string()], &["Administrators".to_string()])
            .unwrap();

        let security = service.security(&tenant, &admin).unwrap();
        assert!(security.is_administrator().unwrap());
        assert!(security.is_authorized_to(Rights::EditRoles).unwrap());
        assert!(!security.is_authorized(AuthorizationCheck::HasAll, &[]).unwrap());
        assert!(!security.is_authorized(AuthorizationCheck::HasAny, &[]).unwrap());
    }

    #[test]
    fn test_any_and_all() {
        let tenant = TenantId::new();
        let service = AuthorizationService::new();
        let anonymous = Principal::anonymous();
        let security = service.security(&tenant, &anonymous).unwrap();

        let mixed = [Rights::ViewPublicPosts, Rights::EditOtherUsers];
        assert!(security.is_authorized(AuthorizationCheck::HasAny, &mixed).unwrap());
        assert!(!security.is_authorized(AuthorizationCheck::HasAll, &mixed).unwrap());
        assert!(
            security
                .is_authorized(
                    AuthorizationCheck::HasAll,
                    &[Rights::ViewPublicPosts, Rights::CreateComments]
                )
                .unwrap()
        );
    }

    #[test]
    fn test_demand_redirects_or_fails() {
        let tenant = TenantId::new();
        let redirects = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&redirects);
        let service = AuthorizationService::with_stores(
            MemoryRoleStore::new(),
            crate::storage::MemoryRightsStore::new(),
            Default::default(),
        )
        .unwrap()
        .with_unauthorized_handler(move |_, user| {
            assert!(user.is_none());
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let anonymous = Principal::anonymous();
        let security = service.security(&tenant, &anonymous).unwrap();

        let granted = security.demand_right(Rights::ViewPublicPosts, false).unwrap();
        assert!(granted.is_granted());

        let denied = security.demand_right(Rights::AccessAdminPages, true).unwrap();
        assert!(denied.is_denied());
        assert_eq!(redirects.load(Ordering::SeqCst), 1);

        let error = security
            .demand(AuthorizationCheck::HasAll, &[Rights::AccessAdminPages], false)
            .unwrap_err();
        assert!(error.is_security());
        assert_eq!(redirects.load(Ordering::SeqCst), 1);
        assert_eq!(service.metrics().summary().demand_failures, 2);
    }
}
