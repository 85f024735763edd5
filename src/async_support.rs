//! Async support for the authorization service (requires 'async' feature).
//!
//! Operations that talk to the stores, or wait for the role store to confirm
//! a new role, run on tokio's blocking pool. Checks against an already loaded
//! tenant are answered inline.

use crate::{
    config::AuthorizationConfig,
    core::AuthorizationService,
    error::{Error, Result},
    rights::Rights,
    storage::{MemoryRightsStore, MemoryRoleStore, RightsStore, RoleStore},
    tenant::{RoleIndex, TenantId},
};
use std::sync::Arc;

/// Async wrapper around [`AuthorizationService`].
pub struct AsyncAuthorizationService<R = MemoryRoleStore, S = MemoryRightsStore>
where
    R: RoleStore + 'static,
    S: RightsStore + 'static,
{
    inner: Arc<AuthorizationService<R, S>>,
}

impl<R, S> Clone for AsyncAuthorizationService<R, S>
where
    R: RoleStore + 'static,
    S: RightsStore + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R, S> AsyncAuthorizationService<R, S>
where
    R: RoleStore + 'static,
    S: RightsStore + 'static,
{
    /// Wrap a service.
    pub fn new(service: AuthorizationService<R, S>) -> Self {
        Self {
            inner: Arc::new(service),
        }
    }

    /// Create a service on top of the given stores.
    pub fn with_stores(role_store: R, rights_store: S, config: AuthorizationConfig) -> Result<Self> {
        AuthorizationService::with_stores(role_store, rights_store, config).map(Self::new)
    }

    /// The wrapped service, for synchronous use.
    pub fn inner(&self) -> &AuthorizationService<R, S> {
        &self.inner
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&AuthorizationService<R, S>) -> Result<T> + Send + 'static,
    {
        let service = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&*service))
            .await
            .map_err(|e| Error::Storage(format!("background task failed: {e}")))?
    }

    /// Load the tenant unless that already happened.
    pub async fn ensure_tenant(&self, tenant: TenantId) -> Result<()> {
        self.blocking(move |service| service.ensure_tenant(&tenant))
            .await
    }

    /// Rebuild the tenant's index from the stores.
    pub async fn refresh_all_rights(&self, tenant: TenantId) -> Result<()> {
        self.blocking(move |service| service.refresh_all_rights(&tenant))
            .await
    }

    /// Persist the tenant's current grants.
    pub async fn save_rights(&self, tenant: TenantId) -> Result<()> {
        self.blocking(move |service| service.save_rights(&tenant))
            .await
    }

    /// Create a role and wait for the role store to confirm it.
    pub async fn create_role(&self, tenant: TenantId, role: impl Into<String>) -> Result<()> {
        let role = role.into();
        self.blocking(move |service| service.create_role(&tenant, &role))
            .await
    }

    /// Delete a role and its grants.
    pub async fn delete_role(&self, tenant: TenantId, role: impl Into<String>) -> Result<()> {
        let role = role.into();
        self.blocking(move |service| service.delete_role(&tenant, &role))
            .await
    }

    /// Rename a role, carrying over members and grants.
    pub async fn rename_role(
        &self,
        tenant: TenantId,
        old: impl Into<String>,
        new: impl Into<String>,
    ) -> Result<()> {
        let (old, new) = (old.into(), new.into());
        self.blocking(move |service| service.rename_role(&tenant, &old, &new))
            .await
    }

    /// Replace the rights of a role.
    pub async fn set_rights_for_role(
        &self,
        tenant: TenantId,
        role: impl Into<String>,
        rights: Vec<Rights>,
    ) -> Result<()> {
        let role = role.into();
        self.blocking(move |service| service.set_rights_for_role(&tenant, &role, &rights))
            .await
    }

    /// Whether any of `roles` holds `flag`.
    pub async fn has_right<T: AsRef<str>>(
        &self,
        tenant: TenantId,
        flag: Rights,
        roles: Option<&[T]>,
    ) -> Result<bool> {
        self.ensure_tenant(tenant).await?;
        self.inner.has_right(&tenant, flag, roles)
    }

    /// Snapshot of the tenant's role to rights index.
    pub async fn role_index(&self, tenant: TenantId) -> Result<Arc<RoleIndex>> {
        self.ensure_tenant(tenant).await?;
        self.inner.role_index(&tenant)
    }
}
