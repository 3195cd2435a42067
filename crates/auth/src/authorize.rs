use thiserror::Error;

use nominalroll_core::DomainError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("invalid scope: {0}")]
    InvalidScope(String),

    #[error("forbidden: {0}")]
    Forbidden(String),
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::Unauthenticated(_) | AuthzError::InvalidScope(_) => {
                DomainError::Unauthenticated
            }
            AuthzError::Forbidden(msg) => DomainError::Forbidden(msg),
        }
    }
}

/// Check a single capability flag.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn require(allowed: bool, action: &str) -> Result<(), AuthzError> {
    if allowed {
        Ok(())
    } else {
        tracing::debug!(action, "capability denied");
        Err(AuthzError::Forbidden(format!("role may not {action}")))
    }
}
