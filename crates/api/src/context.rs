use nominalroll_auth::{Principal, Role, Scope};
use nominalroll_core::UserId;

/// Authenticated caller for a request.
///
/// Inserted by the auth middleware; immutable and present on every protected
/// route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn user_id(&self) -> UserId {
        self.principal.user_id
    }

    pub fn role(&self) -> Role {
        self.principal.role
    }

    pub fn scope(&self) -> Scope {
        self.principal.scope
    }
}
