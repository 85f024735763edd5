//! The per-flag `Right` wrapper and its per-tenant role lists.

use crate::error::{Error, Result};
use crate::rights::{RightCategory, Rights};
use crate::role::roles_equal;
use crate::tenant::TenantId;
use dashmap::DashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// One registered permission flag together with the roles granted it in each
/// tenant.
///
/// Role lists are handed out as immutable snapshots. Writers build a new list
/// and swap it in, so a reader never sees a partially updated list.
#[derive(Debug)]
pub struct Right {
    flag: Rights,
    display_name: String,
    roles: DashMap<TenantId, Arc<[String]>>,
    write_lock: Mutex<()>,
}

impl Right {
    pub(crate) fn new(flag: Rights) -> Self {
        Self {
            flag,
            display_name: flag.display_name(),
            roles: DashMap::new(),
            write_lock: Mutex::new(()),
        }
    }

    /// The wrapped flag.
    pub fn flag(&self) -> Rights {
        self.flag
    }

    /// The symbolic name of the flag.
    pub fn name(&self) -> &'static str {
        self.flag.name()
    }

    /// Label derived from the symbolic name.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Category of the flag.
    pub fn category(&self) -> RightCategory {
        self.flag.category()
    }

    /// Snapshot of the roles granted this right in a tenant.
    pub fn roles(&self, tenant: &TenantId) -> Arc<[String]> {
        self.roles
            .get(tenant)
            .map(|roles| Arc::clone(roles.value()))
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    /// Whether any of `roles` is granted this right in the tenant.
    pub fn has_any_role<R: AsRef<str>>(&self, tenant: &TenantId, roles: &[R]) -> bool {
        if roles.is_empty() {
            return false;
        }
        match self.roles.get(tenant) {
            Some(granted) => granted
                .iter()
                .any(|g| roles.iter().any(|r| roles_equal(g, r.as_ref()))),
            None => false,
        }
    }

    /// Grant this right to a role. Returns false if it was already granted.
    /// The `None` right is never granted.
    pub fn add_role(&self, tenant: &TenantId, role: &str) -> bool {
        if self.flag.is_none() {
            return false;
        }
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.roles(tenant);
        if current.iter().any(|r| roles_equal(r, role)) {
            return false;
        }
        let mut updated = current.to_vec();
        updated.push(role.to_string());
        self.roles.insert(*tenant, Arc::from(updated));
        true
    }

    /// Revoke this right from a role. Returns false if it was not granted.
    ///
    /// The administrator role cannot be removed; attempting it fails with
    /// [`Error::SecurityViolation`].
    pub fn remove_role(&self, tenant: &TenantId, role: &str, administrator_role: &str) -> Result<bool> {
        if roles_equal(role, administrator_role) {
            return Err(Error::SecurityViolation(format!(
                "the '{administrator_role}' role cannot lose the '{}' right",
                self.name()
            )));
        }

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.roles(tenant);
        if !current.iter().any(|r| roles_equal(r, role)) {
            return Ok(false);
        }
        let updated: Vec<String> = current
            .iter()
            .filter(|r| !roles_equal(r, role))
            .cloned()
            .collect();
        self.roles.insert(*tenant, Arc::from(updated));
        Ok(true)
    }

    /// Revoke this right from every role in the tenant except the
    /// administrator role, which keeps every grantable right.
    pub fn clear_roles(&self, tenant: &TenantId, administrator_role: &str) {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let kept: Vec<String> = self
            .roles(tenant)
            .iter()
            .filter(|r| roles_equal(r, administrator_role))
            .cloned()
            .collect();
        self.roles.insert(*tenant, Arc::from(kept));
    }

    /// Replace the tenant's role list in one step.
    pub(crate) fn replace_roles(&self, tenant: &TenantId, roles: Vec<String>) {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.roles.insert(*tenant, Arc::from(roles));
    }

    /// Drop all state held for a tenant.
    pub(crate) fn forget_tenant(&self, tenant: &TenantId) {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.roles.remove(tenant);
    }
}
