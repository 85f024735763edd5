//! Configuration for the authorization service.

use crate::error::{Error, Result};
use crate::tenant::role_key;
use std::time::Duration;

/// Configuration for the authorization service.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "persistence",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct AuthorizationConfig {
    /// Role that always holds every right.
    pub administrator_role: String,
    /// Role used for callers that are not signed in.
    pub anonymous_role: String,
    /// Built-in editor role with its own default rights.
    pub editor_role: String,
    /// How long to wait for the role store to report a newly created role.
    pub role_confirmation_timeout: Duration,
    /// Delay between role store reads while waiting for confirmation.
    pub role_confirmation_poll_interval: Duration,
    /// Whether to emit audit log records.
    pub enable_audit: bool,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            administrator_role: "Administrators".to_string(),
            anonymous_role: "Anonymous".to_string(),
            editor_role: "Editors".to_string(),
            role_confirmation_timeout: Duration::from_secs(5),
            role_confirmation_poll_interval: Duration::from_millis(50),
            enable_audit: true,
        }
    }
}

impl AuthorizationConfig {
    /// Set the administrator role name.
    pub fn with_administrator_role(mut self, role: impl Into<String>) -> Self {
        self.administrator_role = role.into();
        self
    }

    /// Set the anonymous role name.
    pub fn with_anonymous_role(mut self, role: impl Into<String>) -> Self {
        self.anonymous_role = role.into();
        self
    }

    /// Set the editor role name.
    pub fn with_editor_role(mut self, role: impl Into<String>) -> Self {
        self.editor_role = role.into();
        self
    }

    /// Set the timeout and poll interval used to confirm role creation.
    pub fn with_role_confirmation(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.role_confirmation_timeout = timeout;
        self.role_confirmation_poll_interval = poll_interval;
        self
    }

    /// Enable or disable audit logging.
    pub fn with_audit(mut self, enabled: bool) -> Self {
        self.enable_audit = enabled;
        self
    }

    /// Check the configuration for values the service cannot work with.
    pub fn validate(&self) -> Result<()> {
        let roles = [
            ("administrator_role", &self.administrator_role),
            ("anonymous_role", &self.anonymous_role),
            ("editor_role", &self.editor_role),
        ];

        for (field, role) in roles {
            if role.trim().is_empty() {
                return Err(Error::InvalidConfiguration(format!("{field} cannot be empty")));
            }
        }

        for (i, (field, role)) in roles.iter().enumerate() {
            for (other_field, other) in &roles[i + 1..] {
                if role_key(role) == role_key(other) {
                    return Err(Error::InvalidConfiguration(format!(
                        "{field} and {other_field} both name role '{role}'"
                    )));
                }
            }
        }

        if self.role_confirmation_poll_interval.is_zero() {
            return Err(Error::InvalidConfiguration(
                "role_confirmation_poll_interval must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Parse a JSON configuration document. Missing fields take their defaults.
    #[cfg(feature = "persistence")]
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}
