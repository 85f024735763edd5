//! Error types for the rights system.

use thiserror::Error;

/// The main error type for rights system operations.
#[derive(Error, Debug)]
pub enum Error {
    /// No right with the given symbolic name is registered.
    #[error("Right '{0}' not found")]
    RightNotFound(String),

    /// A flag value has no registered `Right`. Indicates a broken registry.
    #[error("Right flag '{0}' is not registered")]
    UnregisteredRight(String),

    /// An argument was rejected before any work was done.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An authorization demand failed or a protected grant was touched.
    #[error("Security violation: {0}")]
    SecurityViolation(String),

    /// Role with the given name was not found.
    #[error("Role '{0}' not found")]
    RoleNotFound(String),

    /// Role with the given name already exists.
    #[error("Role '{0}' already exists")]
    RoleAlreadyExists(String),

    /// System roles cannot be renamed or deleted.
    #[error("Role '{0}' is a system role")]
    SystemRole(String),

    /// The role store did not confirm a newly created role in time.
    #[error("Role '{role}' was not visible in the role store after {waited_ms} ms")]
    RoleConfirmationTimeout { role: String, waited_ms: u128 },

    /// Storage operation failed.
    #[error("Storage operation failed: {0}")]
    Storage(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Serialization error.
    #[cfg(feature = "persistence")]
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::RoleConfirmationTimeout { .. } | Error::Storage(_))
    }

    /// Whether this error is an authorization failure rather than an
    /// application error.
    pub fn is_security(&self) -> bool {
        matches!(self, Error::SecurityViolation(_))
    }
}

/// Result type alias for rights system operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let timeout = Error::RoleConfirmationTimeout {
            role: "Writers".to_string(),
            waited_ms: 5000,
        };
        assert!(timeout.is_retryable());
        assert!(!timeout.is_security());

        let denied = Error::SecurityViolation("nope".to_string());
        assert!(denied.is_security());
        assert!(!denied.is_retryable());

        assert!(!Error::RightNotFound("x".to_string()).is_retryable());
    }

    #[test]
    fn test_error_display() {
        let rendered = Error::RoleConfirmationTimeout {
            role: "Writers".to_string(),
            waited_ms: 250,
        }
        .to_string();
        assert!(rendered.contains("Writers"));
        assert!(rendered.contains("250"));
    }
}
