//! Built-in roles and their default rights.

use crate::config::AuthorizationConfig;
use crate::error::{Error, Result};
use crate::rights::Rights;
use crate::tenant::role_key;

/// Rights given to the anonymous role whenever it ends up with none.
pub const ANONYMOUS_DEFAULT_RIGHTS: &[Rights] = &[
    Rights::CreateComments,
    Rights::ViewPublicComments,
    Rights::ViewPublicPosts,
    Rights::ViewPublicPages,
    Rights::ViewRatingsOnPosts,
    Rights::SubmitRatingsOnPosts,
];

/// Rights given to the editor role whenever it ends up with none.
pub const EDITOR_DEFAULT_RIGHTS: &[Rights] = &[
    Rights::AccessAdminPages,
    Rights::CreateComments,
    Rights::ViewPublicComments,
    Rights::ViewPublicPosts,
    Rights::ViewPublicPages,
    Rights::ViewRatingsOnPosts,
    Rights::SubmitRatingsOnPosts,
    Rights::ViewUnmoderatedComments,
    Rights::ModerateComments,
    Rights::ViewUnpublishedPages,
    Rights::ViewUnpublishedPosts,
    Rights::CreateNewPosts,
    Rights::EditOwnPosts,
    Rights::DeleteOwnPosts,
    Rights::PublishOwnPosts,
    Rights::EditOwnPages,
    Rights::EditOwnUser,
];

/// The three roles with built-in behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemRole {
    Administrator,
    Anonymous,
    Editor,
}

impl SystemRole {
    /// Configured name of this role.
    pub fn name(self, config: &AuthorizationConfig) -> &str {
        match self {
            SystemRole::Administrator => &config.administrator_role,
            SystemRole::Anonymous => &config.anonymous_role,
            SystemRole::Editor => &config.editor_role,
        }
    }

    /// Identify a system role by name, ignoring case.
    pub fn from_name(role: &str, config: &AuthorizationConfig) -> Option<Self> {
        [
            SystemRole::Administrator,
            SystemRole::Anonymous,
            SystemRole::Editor,
        ]
        .into_iter()
        .find(|system| roles_equal(system.name(config), role))
    }

    /// Hard-coded rights applied when the role holds nothing. The
    /// administrator has no defaults since its rights are always computed.
    pub fn default_rights(self) -> &'static [Rights] {
        match self {
            SystemRole::Administrator => &[],
            SystemRole::Anonymous => ANONYMOUS_DEFAULT_RIGHTS,
            SystemRole::Editor => EDITOR_DEFAULT_RIGHTS,
        }
    }
}

/// Whether the role is one of the configured system roles.
pub fn is_system_role(role: &str, config: &AuthorizationConfig) -> bool {
    SystemRole::from_name(role, config).is_some()
}

/// Default rights of a role by name; empty for anything but the editor and
/// anonymous roles.
pub fn default_rights_for_role(role: &str, config: &AuthorizationConfig) -> Vec<Rights> {
    SystemRole::from_name(role, config)
        .map(|system| system.default_rights().to_vec())
        .unwrap_or_default()
}

/// Case-insensitive role name comparison.
pub fn roles_equal(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b) || role_key(a) == role_key(b)
}

/// Validate a role name supplied by a caller.
pub(crate) fn check_role_name(role: &str) -> Result<&str> {
    let trimmed = role.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidArgument(
            "role name cannot be empty".to_string(),
        ));
    }
    if trimmed.contains('\0') {
        return Err(Error::InvalidArgument(format!(
            "role name cannot contain null characters: '{}'",
            trimmed.escape_default()
        )));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rights_for_role() {
        let config = AuthorizationConfig::default();
        assert_eq!(
            default_rights_for_role("anonymous", &config),
            ANONYMOUS_DEFAULT_RIGHTS.to_vec()
        );
        assert_eq!(
            default_rights_for_role("EDITORS", &config),
            EDITOR_DEFAULT_RIGHTS.to_vec()
        );
        assert!(default_rights_for_role("Administrators", &config).is_empty());
        assert!(default_rights_for_role("Contractor", &config).is_empty());
    }

    #[test]
    fn test_system_roles_follow_config() {
        let config = AuthorizationConfig::default().with_editor_role("Writers");
        assert_eq!(SystemRole::from_name("writers", &config), Some(SystemRole::Editor));
        assert!(!is_system_role("Editors", &config));
        assert!(is_system_role("administrators", &config));
    }

    #[test]
    fn test_check_role_name() {
        assert_eq!(check_role_name("  Authors ").unwrap(), "Authors");
        assert!(check_role_name("   ").is_err());
        assert!(check_role_name("bad\0name").is_err());
    }

    #[test]
    fn test_defaults_never_contain_none() {
        assert!(!ANONYMOUS_DEFAULT_RIGHTS.contains(&Rights::None));
        assert!(!EDITOR_DEFAULT_RIGHTS.contains(&Rights::None));
    }
}
