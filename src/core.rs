//! Core authorization service implementation.
//!
//! This module contains [`AuthorizationService`], which owns the rights
//! registry and the per-tenant role index, keeps both in sync with the role
//! and rights stores, and manages the role lifecycle.
//!
//! # Refreshing
//!
//! A tenant's index is built on first use and rebuilt in full whenever a role
//! is created, renamed or deleted, or rights are saved. The rebuild starts
//! from the roles in the role store and the persisted grants, drops grants
//! that refer to unknown roles or rights, falls back to built-in defaults for
//! the anonymous and editor roles when they hold nothing, and always grants
//! every right to the administrator role.
//!
//! # Thread Safety
//!
//! All writes to a tenant go through that tenant's lock. Readers never take
//! it: they read immutable snapshots that are swapped in once a write is
//! complete, so a reader sees either the old or the new grants, never a mix.

use crate::{
    config::AuthorizationConfig,
    error::{Error, Result},
    identity::Session,
    metrics::AuthorizationMetrics,
    registry::RightRegistry,
    right::Right,
    rights::Rights,
    role::{SystemRole, check_role_name, default_rights_for_role, is_system_role, roles_equal},
    storage::{MemoryRightsStore, MemoryRoleStore, PersistedRights, RightsStore, RoleStore},
    tenant::{RoleIndex, TenantId, TenantState, role_key},
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Called when a redirecting demand fails. Receives the tenant and the user
/// name of the caller, if signed in.
pub type UnauthorizedHandler = Arc<dyn Fn(&TenantId, Option<&str>) + Send + Sync>;

/// The multi-tenant rights cache.
pub struct AuthorizationService<R = MemoryRoleStore, S = MemoryRightsStore>
where
    R: RoleStore,
    S: RightsStore,
{
    role_store: R,
    rights_store: S,
    config: AuthorizationConfig,
    registry: RightRegistry,
    tenants: DashMap<TenantId, Arc<TenantState>>,
    metrics: AuthorizationMetrics,
    unauthorized_handler: Option<UnauthorizedHandler>,
}

impl AuthorizationService<MemoryRoleStore, MemoryRightsStore> {
    /// Create a service with default configuration and in-memory stores.
    pub fn new() -> Self {
        Self::build(
            MemoryRoleStore::new(),
            MemoryRightsStore::new(),
            AuthorizationConfig::default(),
        )
    }
}

impl Default for AuthorizationService<MemoryRoleStore, MemoryRightsStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, S> AuthorizationService<R, S>
where
    R: RoleStore,
    S: RightsStore,
{
    /// Create a service on top of the given stores.
    pub fn with_stores(role_store: R, rights_store: S, config: AuthorizationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(role_store, rights_store, config))
    }

    fn build(role_store: R, rights_store: S, config: AuthorizationConfig) -> Self {
        Self {
            role_store,
            rights_store,
            config,
            registry: RightRegistry::new(),
            tenants: DashMap::new(),
            metrics: AuthorizationMetrics::new(),
            unauthorized_handler: None,
        }
    }

    /// Install the side effect run when a redirecting demand fails, such as
    /// sending the caller to the login page.
    pub fn with_unauthorized_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&TenantId, Option<&str>) + Send + Sync + 'static,
    {
        self.unauthorized_handler = Some(Arc::new(handler));
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &AuthorizationConfig {
        &self.config
    }

    /// The rights registry.
    pub fn registry(&self) -> &RightRegistry {
        &self.registry
    }

    /// Service metrics.
    pub fn metrics(&self) -> &AuthorizationMetrics {
        &self.metrics
    }

    /// The role store.
    pub fn role_store(&self) -> &R {
        &self.role_store
    }

    /// The rights store.
    pub fn rights_store(&self) -> &S {
        &self.rights_store
    }

    /// Start an unauthenticated session that follows this service's audit
    /// switch.
    pub fn session(&self, tenant: TenantId) -> Session {
        Session::new(tenant).with_audit(self.config.enable_audit)
    }

    // Tenant lifecycle

    /// Load the tenant's index unless that already happened.
    pub fn ensure_tenant(&self, tenant: &TenantId) -> Result<()> {
        let state = self.state(tenant);
        if state.is_loaded() {
            return Ok(());
        }
        self.load(tenant, state)
    }

    /// Drop every piece of cached state held for a tenant.
    pub fn remove_tenant(&self, tenant: &TenantId) -> bool {
        let Some(state) = self.tenants.get(tenant).map(|state| Arc::clone(state.value())) else {
            return false;
        };
        let _guard = state.lock();
        if state.is_removed() {
            return false;
        }
        self.registry.forget_tenant(tenant);
        state.mark_removed();
        self.tenants
            .remove_if(tenant, |_, current| Arc::ptr_eq(current, &state));

        audit!(self.config, info, "Tenant {tenant} removed from the rights cache");

        true
    }

    /// Tenants with cached state.
    pub fn tenants(&self) -> Vec<TenantId> {
        self.tenants.iter().map(|entry| *entry.key()).collect()
    }

    /// When the tenant's index was last rebuilt.
    pub fn last_refreshed(&self, tenant: &TenantId) -> Option<DateTime<Utc>> {
        self.tenants
            .get(tenant)
            .and_then(|state| state.last_refreshed())
    }

    // Refreshing

    /// Rebuild the tenant's role to rights index from the stores.
    pub fn refresh_all_rights(&self, tenant: &TenantId) -> Result<()> {
        self.with_live_state(tenant, self.state(tenant), |state| self.rebuild(tenant, state))
    }

    /// Persist the tenant's current grants and rebuild its index.
    pub fn save_rights(&self, tenant: &TenantId) -> Result<()> {
        self.with_tenant_lock(tenant, |state| {
            let grants = self.current_grants(tenant);
            self.rights_store.save_rights(tenant, &grants)?;

            audit!(self.config, info, "Rights saved for tenant {tenant}");

            self.rebuild(tenant, state)
        })
    }

    /// Move every grant held by `old` to `new` and persist if anything moved.
    /// Returns whether any grant changed.
    pub fn on_role_renamed(&self, tenant: &TenantId, old: &str, new: &str) -> Result<bool> {
        let old = check_role_name(old)?;
        let new = check_role_name(new)?;
        self.with_tenant_lock(tenant, |state| self.move_grants(tenant, state, old, new))
    }

    /// Revoke every grant held by `role` and persist if anything changed.
    /// Returns whether any grant changed.
    ///
    /// [`delete_role`](Self::delete_role) runs this before removing the role
    /// from the role store; call it directly only when deleting roles through
    /// another path, and only before the role is gone.
    pub fn on_role_deleting(&self, tenant: &TenantId, role: &str) -> Result<bool> {
        let role = check_role_name(role)?;
        self.with_tenant_lock(tenant, |state| self.revoke_grants(tenant, state, role))
    }

    /// Built-in defaults of the editor and anonymous roles; empty otherwise.
    pub fn default_rights_for_role(&self, role: &str) -> Vec<Rights> {
        default_rights_for_role(role, &self.config)
    }

    /// Whether the role is one of the configured system roles.
    pub fn is_system_role(&self, role: &str) -> bool {
        is_system_role(role, &self.config)
    }

    // Role lifecycle

    /// Create a role, wait until the role store reports it and refresh.
    pub fn create_role(&self, tenant: &TenantId, role: &str) -> Result<()> {
        let role = check_role_name(role)?;
        if self.role_store.role_exists(tenant, role)? {
            return Err(Error::RoleAlreadyExists(role.to_string()));
        }

        self.with_tenant_lock(tenant, |state| {
            self.role_store.create_role(tenant, role)?;
            self.confirm_role_created(tenant, role)?;

            audit!(self.config, info, "Role '{role}' created in tenant {tenant}");

            self.rebuild(tenant, state)
        })
    }

    /// Delete a role. Its grants are revoked before it is removed from the
    /// role store.
    pub fn delete_role(&self, tenant: &TenantId, role: &str) -> Result<()> {
        let role = check_role_name(role)?;
        if self.is_system_role(role) {
            return Err(Error::SystemRole(role.to_string()));
        }
        if !self.role_store.role_exists(tenant, role)? {
            return Err(Error::RoleNotFound(role.to_string()));
        }

        self.with_tenant_lock(tenant, |state| {
            self.revoke_grants(tenant, state, role)?;
            self.role_store.delete_role(tenant, role)?;

            audit!(self.config, info, "Role '{role}' deleted from tenant {tenant}");

            self.rebuild(tenant, state)
        })
    }

    /// Rename a role, carrying over its members and grants.
    pub fn rename_role(&self, tenant: &TenantId, old: &str, new: &str) -> Result<()> {
        let old = check_role_name(old)?;
        let new = check_role_name(new)?;
        if self.is_system_role(old) {
            return Err(Error::SystemRole(old.to_string()));
        }
        if roles_equal(old, new) {
            return Ok(());
        }
        if !self.role_store.role_exists(tenant, old)? {
            return Err(Error::RoleNotFound(old.to_string()));
        }
        if self.role_store.role_exists(tenant, new)? || self.is_system_role(new) {
            return Err(Error::RoleAlreadyExists(new.to_string()));
        }

        self.with_tenant_lock(tenant, |state| {
            self.role_store.create_role(tenant, new)?;
            self.confirm_role_created(tenant, new)?;

            let members = self.role_store.get_users_in_role(tenant, old)?;
            if !members.is_empty() {
                self.role_store
                    .add_users_to_roles(tenant, &members, &[new.to_string()])?;
                self.role_store
                    .remove_users_from_roles(tenant, &members, &[old.to_string()])?;
            }

            self.move_grants(tenant, state, old, new)?;
            self.role_store.delete_role(tenant, old)?;

            audit!(self.config, info, "Role '{old}' renamed to '{new}' in tenant {tenant}");

            self.rebuild(tenant, state)
        })
    }

    // Rights editing and queries

    /// Replace the rights of a role, persist and refresh.
    pub fn set_rights_for_role(&self, tenant: &TenantId, role: &str, rights: &[Rights]) -> Result<()> {
        let role = check_role_name(role)?;
        if roles_equal(role, &self.config.administrator_role) {
            return Err(Error::SecurityViolation(format!(
                "the rights of the '{role}' role cannot be changed"
            )));
        }

        self.with_tenant_lock(tenant, |state| {
            let index = state.index();
            let Some(entry) = index.get(role) else {
                return Err(Error::RoleNotFound(role.to_string()));
            };

            let mut grants = self.current_grants(tenant);
            grants.retain(|name, _| !roles_equal(name, role));
            let names: Vec<String> = Rights::ALL
                .iter()
                .copied()
                .filter(|flag| !flag.is_none() && rights.contains(flag))
                .map(|flag| flag.name().to_string())
                .collect();
            grants.insert(entry.name().to_string(), names);
            self.rights_store.save_rights(tenant, &grants)?;

            audit!(
                self.config,
                info,
                "Rights of role '{role}' in tenant {tenant} set to {rights:?}"
            );

            self.rebuild(tenant, state)
        })
    }

    /// Rights currently granted to a role, in declaration order. Unknown
    /// roles have none.
    pub fn rights_for_role(&self, tenant: &TenantId, role: &str) -> Result<Vec<Rights>> {
        Ok(self
            .role_index(tenant)?
            .rights_of(role)
            .into_iter()
            .collect())
    }

    /// Roles currently granted a right.
    pub fn roles_for_right(&self, tenant: &TenantId, flag: Rights) -> Result<Arc<[String]>> {
        self.ensure_tenant(tenant)?;
        Ok(self.registry.right_by_flag(flag)?.roles(tenant))
    }

    /// Snapshot of the tenant's role to rights index.
    pub fn role_index(&self, tenant: &TenantId) -> Result<Arc<RoleIndex>> {
        self.ensure_tenant(tenant)?;
        Ok(self.state(tenant).index())
    }

    /// Whether any of `roles` holds `flag` in the tenant.
    ///
    /// `None` for `roles` is rejected with [`Error::InvalidArgument`]; an
    /// empty slice simply holds nothing.
    pub fn has_right<T: AsRef<str>>(
        &self,
        tenant: &TenantId,
        flag: Rights,
        roles: Option<&[T]>,
    ) -> Result<bool> {
        let roles = roles.ok_or_else(|| {
            Error::InvalidArgument("role list must be provided".to_string())
        })?;
        if roles.is_empty() {
            return Ok(false);
        }
        self.ensure_tenant(tenant)?;
        Ok(self.registry.right_by_flag(flag)?.has_any_role(tenant, roles))
    }

    pub(crate) fn notify_unauthorized(&self, tenant: &TenantId, user_name: Option<&str>) {
        if let Some(handler) = &self.unauthorized_handler {
            handler(tenant, user_name);
        }
    }

    // Internal implementation

    fn state(&self, tenant: &TenantId) -> Arc<TenantState> {
        if let Some(state) = self.tenants.get(tenant) {
            return Arc::clone(state.value());
        }
        Arc::clone(
            self.tenants
                .entry(*tenant)
                .or_insert_with(|| Arc::new(TenantState::new()))
                .value(),
        )
    }

    /// Run `f` holding the tenant lock, after making sure the tenant is loaded.
    fn with_tenant_lock<T>(
        &self,
        tenant: &TenantId,
        f: impl FnOnce(&TenantState) -> Result<T>,
    ) -> Result<T> {
        self.with_live_state(tenant, self.state(tenant), |state| {
            if !state.is_loaded() {
                self.rebuild(tenant, state)?;
            }
            f(state)
        })
    }

    /// First load of a tenant, starting from a state fetched earlier.
    fn load(&self, tenant: &TenantId, state: Arc<TenantState>) -> Result<()> {
        self.with_live_state(tenant, state, |state| {
            if state.is_loaded() {
                return Ok(());
            }
            self.rebuild(tenant, state)
        })
    }

    /// Run `f` holding the lock of the tenant's current state. A state removed
    /// while waiting for its lock is swapped for the live one.
    fn with_live_state<T>(
        &self,
        tenant: &TenantId,
        mut state: Arc<TenantState>,
        f: impl FnOnce(&TenantState) -> Result<T>,
    ) -> Result<T> {
        loop {
            let guard = state.lock();
            if state.is_removed() {
                drop(guard);
                state = self.state(tenant);
                continue;
            }
            return f(state.as_ref());
        }
    }

    /// The refresh algorithm. The caller must hold the tenant lock.
    ///
    /// Nothing is published until every store read has succeeded, so a
    /// failing store leaves the previous index in place.
    fn rebuild(&self, tenant: &TenantId, state: &TenantState) -> Result<()> {
        let admin = self.config.administrator_role.as_str();
        let mut index = RoleIndex::new();
        let mut grants: BTreeMap<Rights, Vec<String>> = BTreeMap::new();

        for role in self.role_store.get_all_roles(tenant)? {
            index.seed(&role);
        }
        for system in [SystemRole::Administrator, SystemRole::Anonymous, SystemRole::Editor] {
            index.seed(system.name(&self.config));
        }

        let admin_name = canonical_name(&index, admin);
        for right in self.registry.grantable_rights() {
            grants.insert(right.flag(), vec![admin_name.clone()]);
        }

        let persisted = self.rights_store.load_rights(tenant)?;
        let mut stale = 0u64;
        for (role, right_names) in &persisted {
            if roles_equal(role, admin) {
                continue;
            }
            let Some(entry) = index.get(role) else {
                audit!(
                    self.config,
                    debug,
                    "Dropping grants of unknown role '{role}' in tenant {tenant}"
                );
                stale += right_names.len() as u64;
                continue;
            };
            let role_name = entry.name().to_string();

            for right_name in right_names {
                match self.registry.right_by_name(right_name) {
                    Ok(right) if !right.flag().is_none() => {
                        grant(&mut index, &mut grants, &role_name, right.flag());
                    }
                    Ok(_) => {}
                    Err(_) => {
                        audit!(
                            self.config,
                            debug,
                            "Dropping unknown right '{right_name}' of role '{role_name}' in tenant {tenant}"
                        );
                        stale += 1;
                    }
                }
            }
        }

        let mut defaults_applied = false;
        for system in [SystemRole::Anonymous, SystemRole::Editor] {
            let role_name = canonical_name(&index, system.name(&self.config));
            if !index.rights_of(&role_name).is_empty() {
                continue;
            }
            for flag in system.default_rights() {
                grant(&mut index, &mut grants, &role_name, *flag);
            }
            defaults_applied = true;

            audit!(
                self.config,
                info,
                "Applied default rights to role '{role_name}' in tenant {tenant}"
            );
        }

        for right in self.registry.grantable_rights() {
            grant(&mut index, &mut grants, &admin_name, right.flag());
        }

        if defaults_applied {
            let persisted = collect_grants(
                grants.iter().map(|(flag, roles)| (*flag, roles.as_slice())),
                admin,
            );
            self.rights_store.save_rights(tenant, &persisted)?;
        }

        for right in self.registry.all_rights() {
            right.replace_roles(tenant, grants.remove(&right.flag()).unwrap_or_default());
        }
        state.publish(index);

        self.metrics.record_refresh(defaults_applied, stale);

        audit!(
            self.config,
            info,
            "Rights refreshed for tenant {tenant} ({stale} stale grants dropped)"
        );

        Ok(())
    }

    fn move_grants(&self, tenant: &TenantId, state: &TenantState, old: &str, new: &str) -> Result<bool> {
        self.protect_administrator(old)?;
        let planned: Vec<(&Right, Vec<String>)> = self
            .registry
            .grantable_rights()
            .filter_map(|right| {
                let roles = right.roles(tenant);
                if !roles.iter().any(|r| roles_equal(r, old)) {
                    return None;
                }
                let mut updated: Vec<String> = roles
                    .iter()
                    .filter(|r| !roles_equal(r, old))
                    .cloned()
                    .collect();
                if !updated.iter().any(|r| roles_equal(r, new)) {
                    updated.push(new.to_string());
                }
                Some((right, updated))
            })
            .collect();
        if planned.is_empty() {
            return Ok(false);
        }

        let mut index = (*state.index()).clone();
        index.rename(old, new);
        self.commit_grants(tenant, state, planned, index)?;
        Ok(true)
    }

    fn revoke_grants(&self, tenant: &TenantId, state: &TenantState, role: &str) -> Result<bool> {
        self.protect_administrator(role)?;
        let planned: Vec<(&Right, Vec<String>)> = self
            .registry
            .grantable_rights()
            .filter_map(|right| {
                let roles = right.roles(tenant);
                if !roles.iter().any(|r| roles_equal(r, role)) {
                    return None;
                }
                let kept: Vec<String> = roles
                    .iter()
                    .filter(|r| !roles_equal(r, role))
                    .cloned()
                    .collect();
                Some((right, kept))
            })
            .collect();
        if planned.is_empty() {
            return Ok(false);
        }

        let mut index = (*state.index()).clone();
        index.remove(role);
        self.commit_grants(tenant, state, planned, index)?;
        Ok(true)
    }

    fn protect_administrator(&self, role: &str) -> Result<()> {
        if roles_equal(role, &self.config.administrator_role) {
            return Err(Error::SecurityViolation(format!(
                "the grants of the '{role}' role cannot be moved or revoked"
            )));
        }
        Ok(())
    }

    /// Persist the grants as they stand after `planned`, then apply the new
    /// role lists and publish `index`. A failed save changes nothing.
    fn commit_grants(
        &self,
        tenant: &TenantId,
        state: &TenantState,
        planned: Vec<(&Right, Vec<String>)>,
        index: RoleIndex,
    ) -> Result<()> {
        let mut lists = self.grant_lists(tenant);
        for (right, roles) in &planned {
            lists.insert(right.flag(), Arc::from(roles.as_slice()));
        }
        let grants = collect_grants(
            lists.iter().map(|(flag, roles)| (*flag, &roles[..])),
            &self.config.administrator_role,
        );
        self.rights_store.save_rights(tenant, &grants)?;

        for (right, roles) in planned {
            right.replace_roles(tenant, roles);
        }
        state.publish(index);
        Ok(())
    }

    /// Snapshot of every grantable right's role list.
    fn grant_lists(&self, tenant: &TenantId) -> BTreeMap<Rights, Arc<[String]>> {
        self.registry
            .grantable_rights()
            .map(|right: &Right| (right.flag(), right.roles(tenant)))
            .collect()
    }

    /// Grants as they would be persisted, read from the rights' role lists.
    fn current_grants(&self, tenant: &TenantId) -> PersistedRights {
        let lists = self.grant_lists(tenant);
        collect_grants(
            lists.iter().map(|(flag, roles)| (*flag, &roles[..])),
            &self.config.administrator_role,
        )
    }

    /// Poll the role store until it reports the role, bounded by the
    /// configured timeout.
    fn confirm_role_created(&self, tenant: &TenantId, role: &str) -> Result<()> {
        let timeout = self.config.role_confirmation_timeout;
        let started = Instant::now();
        loop {
            if self.role_store.role_exists(tenant, role)? {
                return Ok(());
            }
            let waited = started.elapsed();
            if waited >= timeout {
                audit!(
                    self.config,
                    warn,
                    "Role '{role}' not confirmed by the role store of tenant {tenant} after {waited:?}"
                );
                return Err(Error::RoleConfirmationTimeout {
                    role: role.to_string(),
                    waited_ms: waited.as_millis(),
                });
            }
            std::thread::sleep(self.config.role_confirmation_poll_interval.min(timeout - waited));
        }
    }
}

/// Record a grant on both the index and the per-right role lists.
fn grant(
    index: &mut RoleIndex,
    grants: &mut BTreeMap<Rights, Vec<String>>,
    role: &str,
    flag: Rights,
) {
    index.grant(role, flag);
    let roles = grants.entry(flag).or_default();
    if !roles.iter().any(|r| roles_equal(r, role)) {
        roles.push(role.to_string());
    }
}

/// The name a role is listed under in the index, falling back to `role`.
fn canonical_name(index: &RoleIndex, role: &str) -> String {
    index
        .get(role)
        .map(|entry| entry.name().to_string())
        .unwrap_or_else(|| role.to_string())
}

/// Turn per-right role lists into the persisted role to right names form.
/// The administrator role and the `None` flag are never persisted; roles
/// without rights are left out.
fn collect_grants<'a>(
    grants: impl IntoIterator<Item = (Rights, &'a [String])>,
    administrator_role: &str,
) -> PersistedRights {
    let mut by_role: BTreeMap<String, (String, Vec<String>)> = BTreeMap::new();
    for (flag, roles) in grants {
        if flag.is_none() {
            continue;
        }
        for role in roles {
            if roles_equal(role, administrator_role) {
                continue;
            }
            let (_, names) = by_role
                .entry(role_key(role))
                .or_insert_with(|| (role.clone(), Vec::new()));
            if !names.iter().any(|name| name == flag.name()) {
                names.push(flag.name().to_string());
            }
        }
    }
    by_role.into_values().collect()
}
