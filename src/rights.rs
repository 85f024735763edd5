//! The closed catalog of permission flags.
//!
//! Every flag carries compile-time metadata: its symbolic name (the only form
//! ever persisted), a [`RightCategory`] used to group rights in admin screens,
//! and a display key for localized labels. New flags may be appended in later
//! versions; persisted data always refers to flags by name so reordering is
//! harmless.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Grouping used when presenting rights to administrators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
pub enum RightCategory {
    /// Only used by [`Rights::None`].
    None,
    General,
    Comments,
    Posts,
    Pages,
    Users,
    Roles,
}

impl RightCategory {
    /// Name of the category as shown to users.
    pub fn as_str(self) -> &'static str {
        match self {
            RightCategory::None => "None",
            RightCategory::General => "General",
            RightCategory::Comments => "Comments",
            RightCategory::Posts => "Posts",
            RightCategory::Pages => "Pages",
            RightCategory::Users => "Users",
            RightCategory::Roles => "Roles",
        }
    }
}

macro_rules! right_table {
    ($($(#[$meta:meta])* $variant:ident => $category:ident),* $(,)?) => {
        /// A permission flag. `None` is the "no rights" sentinel and is never
        /// granted to anyone.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "persistence", derive(serde::Serialize, serde::Deserialize))]
        pub enum Rights {
            $($(#[$meta])* $variant,)*
        }

        impl Rights {
            /// Every flag in declaration order.
            pub const ALL: &'static [Rights] = &[$(Rights::$variant,)*];

            /// The symbolic name, e.g. `"EditOwnPosts"`.
            pub fn name(self) -> &'static str {
                match self {
                    $(Rights::$variant => stringify!($variant),)*
                }
            }

            /// The category this flag is listed under.
            pub fn category(self) -> RightCategory {
                match self {
                    $(Rights::$variant => RightCategory::$category,)*
                }
            }

            /// Key used to look up the localized label of this flag.
            pub fn display_key(self) -> &'static str {
                match self {
                    $(Rights::$variant => concat!("Right.", stringify!($variant)),)*
                }
            }
        }
    };
}

right_table! {
    None => None,

    ViewDetailedErrorMessages => General,
    AccessAdminPages => General,
    AccessAdminSettingsPages => General,
    ManageWidgets => General,
    ManagePackages => General,

    ViewPublicComments => Comments,
    ViewUnmoderatedComments => Comments,
    CreateComments => Comments,
    ModerateComments => Comments,

    ViewPublicPosts => Posts,
    ViewUnpublishedPosts => Posts,
    CreateNewPosts => Posts,
    EditOwnPosts => Posts,
    EditOtherUsersPosts => Posts,
    DeleteOwnPosts => Posts,
    DeleteOtherUsersPosts => Posts,
    PublishOwnPosts => Posts,
    PublishOtherUsersPosts => Posts,
    ViewRatingsOnPosts => Posts,
    SubmitRatingsOnPosts => Posts,

    ViewPublicPages => Pages,
    ViewUnpublishedPages => Pages,
    CreateNewPages => Pages,
    EditOwnPages => Pages,
    DeleteOwnPages => Pages,
    PublishOwnPages => Pages,

    CreateNewUsers => Users,
    DeleteUserSelf => Users,
    DeleteUsersOtherThanSelf => Users,
    EditOwnUser => Users,
    EditOtherUsers => Users,

    CreateNewRoles => Roles,
    EditRoles => Roles,
    DeleteRoles => Roles,
    EditOwnRoles => Roles,
    EditOtherUsersRoles => Roles,
}

impl Rights {
    /// Parse a symbolic name. Surrounding whitespace is ignored, case is not.
    pub fn from_name(name: &str) -> Option<Rights> {
        let name = name.trim();
        Rights::ALL.iter().copied().find(|right| right.name() == name)
    }

    /// Returns true for the "no rights" sentinel.
    pub fn is_none(self) -> bool {
        self == Rights::None
    }

    /// Human readable label derived from the symbolic name:
    /// `ViewPublicPosts` becomes `View Public Posts`.
    pub fn display_name(self) -> String {
        let name = self.name();
        let mut display = String::with_capacity(name.len() + 4);
        for (i, ch) in name.char_indices() {
            if i > 0 && ch.is_uppercase() {
                display.push(' ');
            }
            display.push(ch);
        }
        display
    }
}

impl fmt::Display for Rights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Rights {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Rights::from_name(s).ok_or_else(|| Error::RightNotFound(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_names_are_unique_and_round_trip() {
        let mut seen = HashSet::new();
        for right in Rights::ALL {
            assert!(seen.insert(right.name()), "duplicate name {}", right.name());
            assert_eq!(Rights::from_name(right.name()), Some(*right));
        }
        assert_eq!(Rights::ALL[0], Rights::None);
    }

    #[test]
    fn test_parse_trims_but_is_case_sensitive() {
        assert_eq!("  EditOwnPosts ".parse::<Rights>().unwrap(), Rights::EditOwnPosts);
        assert!(matches!(
            "editownposts".parse::<Rights>(),
            Err(Error::RightNotFound(_))
        ));
        assert!("ObsoleteRight".parse::<Rights>().is_err());
    }

    #[test]
    fn test_display_name() {
        assert_eq!(Rights::ViewPublicPosts.display_name(), "View Public Posts");
        assert_eq!(Rights::None.display_name(), "None");
    }

    #[test]
    fn test_metadata_table() {
        assert_eq!(Rights::None.category(), RightCategory::None);
        assert_eq!(Rights::ModerateComments.category(), RightCategory::Comments);
        assert_eq!(Rights::EditRoles.category(), RightCategory::Roles);
        assert_eq!(Rights::ManagePackages.display_key(), "Right.ManagePackages");
        assert!(
            Rights::ALL
                .iter()
                .filter(|r| !r.is_none())
                .all(|r| r.category() != RightCategory::None)
        );
    }
}
