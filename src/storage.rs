//! Storage abstractions for roles and persisted rights.
//!
//! Both stores are external collaborators: the service only needs the
//! operations below. Every call is scoped to a tenant and role names are
//! compared case-insensitively.

use crate::error::{Error, Result};
use crate::role::roles_equal;
use crate::tenant::{TenantId, role_key};
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

/// Persisted grants: role name to the symbolic names of its rights.
pub type PersistedRights = BTreeMap<String, Vec<String>>;

/// Source of truth for roles and role membership.
pub trait RoleStore: Send + Sync {
    /// Create a role.
    fn create_role(&self, tenant: &TenantId, role: &str) -> Result<()>;

    /// Delete a role. Returns false if it did not exist.
    fn delete_role(&self, tenant: &TenantId, role: &str) -> Result<bool>;

    /// Check if a role exists.
    fn role_exists(&self, tenant: &TenantId, role: &str) -> Result<bool>;

    /// List all role names.
    fn get_all_roles(&self, tenant: &TenantId) -> Result<Vec<String>>;

    /// Roles a user belongs to.
    fn get_roles_for_user(&self, tenant: &TenantId, user: &str) -> Result<Vec<String>>;

    /// Users belonging to a role.
    fn get_users_in_role(&self, tenant: &TenantId, role: &str) -> Result<Vec<String>>;

    /// Add every user to every role.
    fn add_users_to_roles(&self, tenant: &TenantId, users: &[String], roles: &[String]) -> Result<()>;

    /// Remove every user from every role.
    fn remove_users_from_roles(
        &self,
        tenant: &TenantId,
        users: &[String],
        roles: &[String],
    ) -> Result<()>;
}

/// Persistence for role grants. Right names are always stored by symbolic
/// name, never by numeric value.
pub trait RightsStore: Send + Sync {
    /// Load all persisted grants of a tenant.
    fn load_rights(&self, tenant: &TenantId) -> Result<PersistedRights>;

    /// Replace all persisted grants of a tenant.
    fn save_rights(&self, tenant: &TenantId, rights: &PersistedRights) -> Result<()>;
}

impl<T: RoleStore + ?Sized> RoleStore for Arc<T> {
    fn create_role(&self, tenant: &TenantId, role: &str) -> Result<()> {
        (**self).create_role(tenant, role)
    }

    fn delete_role(&self, tenant: &TenantId, role: &str) -> Result<bool> {
        (**self).delete_role(tenant, role)
    }

    fn role_exists(&self, tenant: &TenantId, role: &str) -> Result<bool> {
        (**self).role_exists(tenant, role)
    }

    fn get_all_roles(&self, tenant: &TenantId) -> Result<Vec<String>> {
        (**self).get_all_roles(tenant)
    }

    fn get_roles_for_user(&self, tenant: &TenantId, user: &str) -> Result<Vec<String>> {
        (**self).get_roles_for_user(tenant, user)
    }

    fn get_users_in_role(&self, tenant: &TenantId, role: &str) -> Result<Vec<String>> {
        (**self).get_users_in_role(tenant, role)
    }

    fn add_users_to_roles(&self, tenant: &TenantId, users: &[String], roles: &[String]) -> Result<()> {
        (**self).add_users_to_roles(tenant, users, roles)
    }

    fn remove_users_from_roles(
        &self,
        tenant: &TenantId,
        users: &[String],
        roles: &[String],
    ) -> Result<()> {
        (**self).remove_users_from_roles(tenant, users, roles)
    }
}

impl<T: RightsStore + ?Sized> RightsStore for Arc<T> {
    fn load_rights(&self, tenant: &TenantId) -> Result<PersistedRights> {
        (**self).load_rights(tenant)
    }

    fn save_rights(&self, tenant: &TenantId, rights: &PersistedRights) -> Result<()> {
        (**self).save_rights(tenant, rights)
    }
}

#[derive(Debug, Default, Clone)]
struct RoleTable {
    /// Case-folded name to the name as created.
    roles: BTreeMap<String, String>,
    /// Case-folded role name to case-folded user names.
    members: HashMap<String, BTreeSet<String>>,
    /// Case-folded user name to the name as first seen.
    users: HashMap<String, String>,
}

/// In-memory role store using DashMap for thread safety.
///
/// Clones share the same underlying data.
#[derive(Debug, Default, Clone)]
pub struct MemoryRoleStore {
    tenants: Arc<DashMap<TenantId, RoleTable>>,
}

impl MemoryRoleStore {
    /// Create a new, empty role store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store where the tenant already has the given roles.
    pub fn with_roles(tenant: &TenantId, roles: &[&str]) -> Result<Self> {
        let store = Self::new();
        for role in roles {
            store.create_role(tenant, role)?;
        }
        Ok(store)
    }

    /// Number of roles in a tenant.
    pub fn role_count(&self, tenant: &TenantId) -> usize {
        self.tenants
            .get(tenant)
            .map(|table| table.roles.len())
            .unwrap_or(0)
    }

    /// Drop everything stored for a tenant.
    pub fn remove_tenant(&self, tenant: &TenantId) {
        self.tenants.remove(tenant);
    }
}

impl RoleStore for MemoryRoleStore {
    fn create_role(&self, tenant: &TenantId, role: &str) -> Result<()> {
        self.tenants
            .entry(*tenant)
            .or_default()
            .roles
            .entry(role_key(role))
            .or_insert_with(|| role.to_string());
        Ok(())
    }

    fn delete_role(&self, tenant: &TenantId, role: &str) -> Result<bool> {
        let Some(mut table) = self.tenants.get_mut(tenant) else {
            return Ok(false);
        };
        let key = role_key(role);
        table.members.remove(&key);
        Ok(table.roles.remove(&key).is_some())
    }

    fn role_exists(&self, tenant: &TenantId, role: &str) -> Result<bool> {
        Ok(self
            .tenants
            .get(tenant)
            .is_some_and(|table| table.roles.contains_key(&role_key(role))))
    }

    fn get_all_roles(&self, tenant: &TenantId) -> Result<Vec<String>> {
        Ok(self
            .tenants
            .get(tenant)
            .map(|table| table.roles.values().cloned().collect())
            .unwrap_or_default())
    }

    fn get_roles_for_user(&self, tenant: &TenantId, user: &str) -> Result<Vec<String>> {
        let Some(table) = self.tenants.get(tenant) else {
            return Ok(Vec::new());
        };
        let user = role_key(user);
        Ok(table
            .members
            .iter()
            .filter(|(_, users)| users.contains(&user))
            .filter_map(|(role, _)| table.roles.get(role).cloned())
            .collect())
    }

    fn get_users_in_role(&self, tenant: &TenantId, role: &str) -> Result<Vec<String>> {
        let Some(table) = self.tenants.get(tenant) else {
            return Ok(Vec::new());
        };
        Ok(table
            .members
            .get(&role_key(role))
            .map(|users| {
                users
                    .iter()
                    .filter_map(|user| table.users.get(user).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    fn add_users_to_roles(&self, tenant: &TenantId, users: &[String], roles: &[String]) -> Result<()> {
        let mut table = self.tenants.entry(*tenant).or_default();
        for role in roles {
            let key = role_key(role);
            if !table.roles.contains_key(&key) {
                return Err(Error::RoleNotFound(role.clone()));
            }
            for user in users {
                let user_key = role_key(user);
                table.users.entry(user_key.clone()).or_insert_with(|| user.clone());
                table.members.entry(key.clone()).or_default().insert(user_key);
            }
        }
        Ok(())
    }

    fn remove_users_from_roles(
        &self,
        tenant: &TenantId,
        users: &[String],
        roles: &[String],
    ) -> Result<()> {
        let Some(mut table) = self.tenants.get_mut(tenant) else {
            return Ok(());
        };
        for role in roles {
            if let Some(members) = table.members.get_mut(&role_key(role)) {
                members.retain(|member| !users.iter().any(|user| roles_equal(member, user)));
            }
        }
        Ok(())
    }
}

/// In-memory rights store. Clones share the same underlying data.
#[derive(Debug, Default, Clone)]
pub struct MemoryRightsStore {
    rights: Arc<DashMap<TenantId, PersistedRights>>,
    saves: Arc<DashMap<TenantId, usize>>,
}

impl MemoryRightsStore {
    /// Create a new, empty rights store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed persisted grants for a tenant.
    pub fn with_rights(tenant: &TenantId, rights: PersistedRights) -> Self {
        let store = Self::new();
        store.rights.insert(*tenant, rights);
        store
    }

    /// Number of times grants were saved for a tenant.
    pub fn save_count(&self, tenant: &TenantId) -> usize {
        self.saves.get(tenant).map(|count| *count).unwrap_or(0)
    }

    /// The grants currently persisted for a tenant.
    pub fn snapshot(&self, tenant: &TenantId) -> PersistedRights {
        self.rights
            .get(tenant)
            .map(|rights| rights.clone())
            .unwrap_or_default()
    }

    /// Drop everything stored for a tenant.
    pub fn remove_tenant(&self, tenant: &TenantId) {
        self.rights.remove(tenant);
        self.saves.remove(tenant);
    }
}

impl RightsStore for MemoryRightsStore {
    fn load_rights(&self, tenant: &TenantId) -> Result<PersistedRights> {
        Ok(self.snapshot(tenant))
    }

    fn save_rights(&self, tenant: &TenantId, rights: &PersistedRights) -> Result<()> {
        self.rights.insert(*tenant, rights.clone());
        *self.saves.entry(*tenant).or_insert(0) += 1;
        Ok(())
    }
}

/// File-based rights storage (requires persistence feature).
#[cfg(feature = "persistence")]
pub mod file_storage {
    use super::*;
    use std::{
        fs::File,
        io::{BufReader, BufWriter, ErrorKind, Write},
        path::{Path, PathBuf},
        sync::Mutex,
    };

    /// Stores each tenant's grants as a pretty printed JSON file named after
    /// the tenant id.
    #[derive(Debug)]
    pub struct FileRightsStore {
        directory: PathBuf,
        write_lock: Mutex<()>,
    }

    impl FileRightsStore {
        /// Create a store rooted at `directory`, creating it if needed.
        pub fn new(directory: impl AsRef<Path>) -> Result<Self> {
            let directory = directory.as_ref().to_path_buf();
            std::fs::create_dir_all(&directory).map_err(|e| {
                Error::Storage(format!("Failed to create rights directory: {e}"))
            })?;
            Ok(Self {
                directory,
                write_lock: Mutex::new(()),
            })
        }

        /// Path of the file holding a tenant's grants.
        pub fn tenant_path(&self, tenant: &TenantId) -> PathBuf {
            self.directory.join(format!("{tenant}.json"))
        }

        /// Delete a tenant's file.
        pub fn remove_tenant(&self, tenant: &TenantId) -> Result<()> {
            match std::fs::remove_file(self.tenant_path(tenant)) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(Error::Storage(format!("Failed to remove rights file: {e}"))),
            }
        }
    }

    impl RightsStore for FileRightsStore {
        fn load_rights(&self, tenant: &TenantId) -> Result<PersistedRights> {
            let file = match File::open(self.tenant_path(tenant)) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::NotFound => return Ok(PersistedRights::new()),
                Err(e) => {
                    return Err(Error::Storage(format!("Failed to open rights file: {e}")));
                }
            };
            Ok(serde_json::from_reader(BufReader::new(file))?)
        }

        fn save_rights(&self, tenant: &TenantId, rights: &PersistedRights) -> Result<()> {
            let _guard = self
                .write_lock
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let path = self.tenant_path(tenant);
            let temp = path.with_extension("json.tmp");
            let written = write_json(&temp, rights).and_then(|()| {
                std::fs::rename(&temp, &path)
                    .map_err(|e| Error::Storage(format!("Failed to replace rights file: {e}")))
            });
            if written.is_err() {
                let _ = std::fs::remove_file(&temp);
            }
            written
        }
    }

    /// Write `rights` to `path` and sync it to disk.
    fn write_json(path: &Path, rights: &PersistedRights) -> Result<()> {
        let file = File::create(path)
            .map_err(|e| Error::Storage(format!("Failed to create rights file: {e}")))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, rights)?;
        writer
            .flush()
            .map_err(|e| Error::Storage(format!("Failed to write rights file: {e}")))?;
        writer
            .get_ref()
            .sync_all()
            .map_err(|e| Error::Storage(format!("Failed to sync rights file: {e}")))
    }
}

#[cfg(feature = "persistence")]
pub use file_storage::FileRightsStore;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_role_store() {
        let tenant = TenantId::new();
        let store = MemoryRoleStore::new();

        store.create_role(&tenant, "Editors").unwrap();
        store.create_role(&tenant, "editors").unwrap();
        assert_eq!(store.role_count(&tenant), 1);
        assert!(store.role_exists(&tenant, "EDITORS").unwrap());
        assert!(!store.role_exists(&TenantId::new(), "Editors").unwrap());

        store
            .add_users_to_roles(&tenant, &["Alice".to_string()], &["editors".to_string()])
            .unwrap();
        assert_eq!(store.get_roles_for_user(&tenant, "alice").unwrap(), vec!["Editors"]);
        assert_eq!(store.get_users_in_role(&tenant, "Editors").unwrap(), vec!["Alice"]);

        store
            .remove_users_from_roles(&tenant, &["ALICE".to_string()], &["Editors".to_string()])
            .unwrap();
        assert!(store.get_roles_for_user(&tenant, "Alice").unwrap().is_empty());

        assert!(store.delete_role(&tenant, "Editors").unwrap());
        assert!(!store.delete_role(&tenant, "Editors").unwrap());
    }

    #[test]
    fn test_add_users_to_missing_role_fails() {
        let tenant = TenantId::new();
        let store = MemoryRoleStore::new();
        let result = store.add_users_to_roles(&tenant, &["bob".to_string()], &["Ghosts".to_string()]);
        assert!(result.is_err());
    }

    #[test]
    fn test_memory_rights_store_counts_saves() {
        let tenant = TenantId::new();
        let store = MemoryRightsStore::new();
        assert!(store.load_rights(&tenant).unwrap().is_empty());

        let mut rights = PersistedRights::new();
        rights.insert("Editors".to_string(), vec!["CreateNewPosts".to_string()]);
        store.save_rights(&tenant, &rights).unwrap();

        assert_eq!(store.load_rights(&tenant).unwrap(), rights);
        assert_eq!(store.save_count(&tenant), 1);

        let shared = store.clone();
        shared.remove_tenant(&tenant);
        assert!(store.load_rights(&tenant).unwrap().is_empty());
    }

    #[cfg(feature = "persistence")]
    #[test]
    fn test_file_rights_store() {
        let directory = std::env::temp_dir().join(format!("blog-rights-{}", TenantId::new()));
        let tenant = TenantId::new();

        {
            let store = FileRightsStore::new(&directory).unwrap();
            assert!(store.load_rights(&tenant).unwrap().is_empty());

            let mut rights = PersistedRights::new();
            rights.insert(
                "Anonymous".to_string(),
                vec!["ViewPublicPosts".to_string(), "CreateComments".to_string()],
            );
            store.save_rights(&tenant, &rights).unwrap();
            assert!(store.tenant_path(&tenant).exists());
            assert!(!store.tenant_path(&tenant).with_extension("json.tmp").exists());
        }

        {
            let store = FileRightsStore::new(&directory).unwrap();
            let rights = store.load_rights(&tenant).unwrap();
            assert_eq!(rights["Anonymous"].len(), 2);
            store.remove_tenant(&tenant).unwrap();
            assert!(store.load_rights(&tenant).unwrap().is_empty());
        }

        let _ = std::fs::remove_dir_all(&directory);
    }

    #[cfg(feature = "persistence")]
    #[test]
    fn test_truncated_rights_file_is_an_error() {
        let directory = std::env::temp_dir().join(format!("blog-rights-{}", TenantId::new()));
        let tenant = TenantId::new();
        let store = FileRightsStore::new(&directory).unwrap();

        let mut rights = PersistedRights::new();
        rights.insert("Editors".to_string(), vec!["CreateNewPosts".to_string()]);
        store.save_rights(&tenant, &rights).unwrap();

        let path = store.tenant_path(&tenant);
        let contents = std::fs::read(&path).unwrap();
        std::fs::write(&path, &contents[..contents.len() / 2]).unwrap();
        assert!(matches!(store.load_rights(&tenant), Err(Error::Serialization(_))));

        // A later save replaces the damaged file whole
        store.save_rights(&tenant, &rights).unwrap();
        assert_eq!(store.load_rights(&tenant).unwrap(), rights);

        let _ = std::fs::remove_dir_all(&directory);
    }
}
