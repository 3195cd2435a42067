//! User accounts (actor identities with a role and scope).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nominalroll_core::{DomainError, DomainResult, Entity, UserId};

use crate::principal::{Scope, ScopeRef};
use crate::roles::Role;

/// A registered user.
///
/// # Invariants
/// - `scope` satisfies [`Scope::resolve`] for `role`.
/// - `username` is non-empty and unique (uniqueness enforced by the store).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: UserId,
    pub username: String,
    pub role: Role,
    pub scope: Option<ScopeRef>,
    #[serde(skip)]
    pub credential_hash: String,
    pub created_at: DateTime<Utc>,
}

impl UserAccount {
    pub fn new(
        username: impl Into<String>,
        role: Role,
        scope: Option<ScopeRef>,
        credential_hash: String,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let username = username.into().trim().to_string();
        if username.is_empty() {
            return Err(DomainError::validation("username cannot be empty"));
        }
        Scope::resolve(role, scope).map_err(|e| DomainError::validation(e.to_string()))?;
        Ok(Self {
            id: UserId::new(),
            username,
            role,
            scope,
            credential_hash,
            created_at,
        })
    }
}

impl Entity for UserAccount {
    type Id = UserId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn kind() -> &'static str {
        "user"
    }
}
