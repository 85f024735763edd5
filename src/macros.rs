//! Convenience macros for working with rights.

/// Macro for listing rights without repeating the enum name.
///
/// # Examples
///
/// ```rust
/// use blog_rights::{rights, Rights};
///
/// let author = rights![CreateNewPosts, EditOwnPosts, DeleteOwnPosts];
/// assert_eq!(author[0], Rights::CreateNewPosts);
/// ```
#[macro_export]
macro_rules! rights {
    ($($right:ident),* $(,)?) => {
        vec![$($crate::rights::Rights::$right),*]
    };
}

/// Macro for building persisted grants, the role to right names form that
/// rights stores load and save.
///
/// # Examples
///
/// ```rust
/// use blog_rights::persisted_rights;
///
/// let grants = persisted_rights! {
///     "Editors" => [CreateNewPosts, EditOwnPosts],
///     "Anonymous" => [ViewPublicPosts],
/// };
/// assert_eq!(grants["Editors"], vec!["CreateNewPosts", "EditOwnPosts"]);
/// ```
#[macro_export]
macro_rules! persisted_rights {
    ($($role:expr => [$($right:ident),* $(,)?]),* $(,)?) => {{
        let mut grants = $crate::storage::PersistedRights::new();
        $(
            grants.insert(
                ::std::string::String::from($role),
                vec![$($crate::rights::Rights::$right.name().to_string()),*],
            );
        )*
        grants
    }};
}
