//! Registry holding one [`Right`] per permission flag.

use crate::error::{Error, Result};
use crate::right::Right;
use crate::rights::{RightCategory, Rights};
use crate::tenant::TenantId;
use std::collections::BTreeMap;

/// The fixed catalog of rights, in declaration order.
#[derive(Debug)]
pub struct RightRegistry {
    rights: Vec<Right>,
}

impl Default for RightRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RightRegistry {
    /// Build the registry from the compiled-in flag table.
    pub fn new() -> Self {
        Self {
            rights: Rights::ALL.iter().copied().map(Right::new).collect(),
        }
    }

    /// Every right, including the `None` sentinel, in declaration order.
    pub fn all_rights(&self) -> &[Right] {
        &self.rights
    }

    /// Every right except the `None` sentinel.
    pub fn grantable_rights(&self) -> impl Iterator<Item = &Right> {
        self.rights.iter().filter(|right| !right.flag().is_none())
    }

    /// Look up a right by its symbolic name. Whitespace is trimmed, case is
    /// significant.
    pub fn right_by_name(&self, name: &str) -> Result<&Right> {
        let trimmed = name.trim();
        self.rights
            .iter()
            .find(|right| right.name() == trimmed)
            .ok_or_else(|| Error::RightNotFound(name.to_string()))
    }

    /// Look up the right wrapping a flag.
    pub fn right_by_flag(&self, flag: Rights) -> Result<&Right> {
        // Declaration order matches the enum discriminants.
        match self.rights.get(flag as usize) {
            Some(right) if right.flag() == flag => Ok(right),
            _ => self
                .rights
                .iter()
                .find(|right| right.flag() == flag)
                .ok_or_else(|| Error::UnregisteredRight(flag.name().to_string())),
        }
    }

    /// Whether a right with this name exists.
    pub fn right_exists(&self, name: &str) -> bool {
        self.right_by_name(name).is_ok()
    }

    /// Grantable rights grouped by category.
    pub fn rights_by_category(&self) -> BTreeMap<RightCategory, Vec<&Right>> {
        let mut grouped: BTreeMap<RightCategory, Vec<&Right>> = BTreeMap::new();
        for right in self.grantable_rights() {
            grouped.entry(right.category()).or_default().push(right);
        }
        grouped
    }

    pub(crate) fn forget_tenant(&self, tenant: &TenantId) {
        for right in &self.rights {
            right.forget_tenant(tenant);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_right_per_flag_in_order() {
        let registry = RightRegistry::new();
        assert_eq!(registry.all_rights().len(), Rights::ALL.len());
        for (right, flag) in registry.all_rights().iter().zip(Rights::ALL) {
            assert_eq!(right.flag(), *flag);
        }
    }

    #[test]
    fn test_lookup_by_name() {
        let registry = RightRegistry::new();
        assert_eq!(
            registry.right_by_name(" ModerateComments").unwrap().flag(),
            Rights::ModerateComments
        );
        assert!(matches!(
            registry.right_by_name("moderatecomments"),
            Err(Error::RightNotFound(_))
        ));
        assert!(registry.right_exists("EditRoles"));
        assert!(!registry.right_exists("ObsoleteRight"));
    }

    #[test]
    fn test_lookup_by_flag() {
        let registry = RightRegistry::new();
        for flag in Rights::ALL {
            assert_eq!(registry.right_by_flag(*flag).unwrap().flag(), *flag);
        }
    }

    #[test]
    fn test_rights_by_category_skips_none() {
        let registry = RightRegistry::new();
        let grouped = registry.rights_by_category();
        assert!(!grouped.contains_key(&RightCategory::None));
        let comments: Vec<_> = grouped[&RightCategory::Comments]
            .iter()
            .map(|r| r.flag())
            .collect();
        assert_eq!(
            comments,
            vec![
                Rights::ViewPublicComments,
                Rights::ViewUnmoderatedComments,
                Rights::CreateComments,
                Rights::ModerateComments,
            ]
        );
    }
}
