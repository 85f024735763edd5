//! Tenant ("blog instance") identifiers and per-tenant cached state.

use crate::rights::Rights;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use uuid::Uuid;

/// Identifies one blog instance. All role-grant state is partitioned by it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
pub struct TenantId(Uuid);

impl TenantId {
    /// Create a new random tenant id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for TenantId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl FromStr for TenantId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A role and the rights currently granted to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleEntry {
    name: String,
    rights: BTreeSet<Rights>,
}

impl RoleEntry {
    /// The role name as reported by the role store.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rights granted to the role.
    pub fn rights(&self) -> &BTreeSet<Rights> {
        &self.rights
    }
}

/// Case-insensitive role name to rights mapping for one tenant.
///
/// Always derived from the persisted grants plus built-in defaults; a
/// published index is never mutated, refreshes replace it wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleIndex {
    entries: BTreeMap<String, RoleEntry>,
}

impl RoleIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a role with no rights, unless it is already present.
    pub(crate) fn seed(&mut self, role: &str) {
        self.entries
            .entry(role_key(role))
            .or_insert_with(|| RoleEntry {
                name: role.to_string(),
                rights: BTreeSet::new(),
            });
    }

    /// Grant a right to a seeded role. Returns false if the role is unknown.
    pub(crate) fn grant(&mut self, role: &str, right: Rights) -> bool {
        match self.entries.get_mut(&role_key(role)) {
            Some(entry) => {
                entry.rights.insert(right);
                true
            }
            None => false,
        }
    }

    /// Drop a role. Returns false if it was not present.
    pub(crate) fn remove(&mut self, role: &str) -> bool {
        self.entries.remove(&role_key(role)).is_some()
    }

    /// Move the rights of `old` onto `new`, creating `new` if needed.
    pub(crate) fn rename(&mut self, old: &str, new: &str) {
        let moved = self
            .entries
            .remove(&role_key(old))
            .map(|entry| entry.rights)
            .unwrap_or_default();
        self.seed(new);
        if let Some(entry) = self.entries.get_mut(&role_key(new)) {
            entry.rights.extend(moved);
        }
    }

    /// Look up a role, ignoring case.
    pub fn get(&self, role: &str) -> Option<&RoleEntry> {
        self.entries.get(&role_key(role))
    }

    /// Whether the role is known to this index.
    pub fn contains(&self, role: &str) -> bool {
        self.entries.contains_key(&role_key(role))
    }

    /// Rights of a role, empty if the role is unknown.
    pub fn rights_of(&self, role: &str) -> BTreeSet<Rights> {
        self.get(role)
            .map(|entry| entry.rights.clone())
            .unwrap_or_default()
    }

    /// All roles ordered by their case-folded name.
    pub fn roles(&self) -> impl Iterator<Item = &RoleEntry> {
        self.entries.values()
    }

    /// Number of roles.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no roles.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Cached state of one tenant.
#[derive(Debug, Default)]
pub(crate) struct TenantState {
    /// Serializes refreshes and every other write to the tenant's grants.
    refresh_lock: Mutex<()>,
    /// Set once the first refresh has completed.
    loaded: AtomicBool,
    /// Set when the tenant is dropped from the cache. A removed state is
    /// never written again.
    removed: AtomicBool,
    index: RwLock<Arc<RoleIndex>>,
    last_refreshed: RwLock<Option<DateTime<Utc>>>,
}

impl TenantState {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, ()> {
        self.refresh_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub(crate) fn is_removed(&self) -> bool {
        self.removed.load(Ordering::Acquire)
    }

    /// Call with the state lock held.
    pub(crate) fn mark_removed(&self) {
        self.removed.store(true, Ordering::Release);
    }

    pub(crate) fn index(&self) -> Arc<RoleIndex> {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn publish(&self, index: RoleIndex) {
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(index);
        *self
            .last_refreshed
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
        self.loaded.store(true, Ordering::Release);
    }

    pub(crate) fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        *self
            .last_refreshed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Key used for case-insensitive role lookups.
pub(crate) fn role_key(role: &str) -> String {
    role.to_lowercase()
}
