use serde::{Deserialize, Serialize};

use nominalroll_core::{FormationId, OfficeId, StaffId, UserId};

use crate::authorize::AuthzError;
use crate::capabilities::{Capabilities, ScopeKind};
use crate::roles::Role;

/// Scope reference as carried in tokens and stored on user accounts.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ScopeRef {
    Formation(FormationId),
    Office(OfficeId),
    Staff(StaffId),
}

/// Resolved visibility of a principal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Scope {
    Global,
    Formation(FormationId),
    Office(OfficeId),
    OwnRecord(StaffId),
}

impl Scope {
    /// Combine a role with its scope reference, enforcing the scope invariant:
    /// formation admins carry a formation, office admins an office, staff users
    /// their own staff record, and global admins nothing.
    pub fn resolve(role: Role, scope: Option<ScopeRef>) -> Result<Self, AuthzError> {
        match (role.capabilities().scope_kind, scope) {
            (ScopeKind::Global, None) => Ok(Scope::Global),
            (ScopeKind::Formation, Some(ScopeRef::Formation(id))) => Ok(Scope::Formation(id)),
            (ScopeKind::Office, Some(ScopeRef::Office(id))) => Ok(Scope::Office(id)),
            (ScopeKind::OwnRecord, Some(ScopeRef::Staff(id))) => Ok(Scope::OwnRecord(id)),
            (kind, scope) => Err(AuthzError::InvalidScope(format!(
                "role '{role}' requires {kind:?} scope, got {scope:?}"
            ))),
        }
    }
}

/// A fully resolved principal for authorization decisions.
///
/// Built once per request by the role gate and passed explicitly into every
/// operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
    pub scope: Scope,
}

impl Principal {
    pub fn new(user_id: UserId, role: Role, scope: Scope) -> Self {
        Self { user_id, role, scope }
    }

    pub fn capabilities(&self) -> &'static Capabilities {
        self.role.capabilities()
    }

    /// Whether a staff record at the given location is visible to this principal.
    pub fn covers_staff(
        &self,
        staff_id: StaffId,
        formation_id: FormationId,
        office_id: Option<OfficeId>,
    ) -> bool {
        match self.scope {
            Scope::Global => true,
            Scope::Formation(f) => f == formation_id,
            Scope::Office(o) => office_id == Some(o),
            Scope::OwnRecord(s) => s == staff_id,
        }
    }

    pub fn covers_office(&self, office_id: OfficeId, formation_id: FormationId) -> bool {
        match self.scope {
            Scope::Global => true,
            Scope::Formation(f) => f == formation_id,
            Scope::Office(o) => o == office_id,
            Scope::OwnRecord(_) => false,
        }
    }

    pub fn covers_formation(&self, formation_id: FormationId) -> bool {
        match self.scope {
            Scope::Global => true,
            Scope::Formation(f) => f == formation_id,
            Scope::Office(_) | Scope::OwnRecord(_) => false,
        }
    }

    /// The staff record this principal is bound to (staff users only).
    pub fn own_staff_id(&self) -> Option<StaffId> {
        match self.scope {
            Scope::OwnRecord(id) => Some(id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_invariant_is_enforced() {
        let f = FormationId::new();
        assert_eq!(Scope::resolve(Role::MainAdmin, None).unwrap(), Scope::Global);
        assert_eq!(
            Scope::resolve(Role::FormationAdmin, Some(ScopeRef::Formation(f))).unwrap(),
            Scope::Formation(f)
        );
        assert!(Scope::resolve(Role::FormationAdmin, None).is_err());
        assert!(Scope::resolve(Role::SpecialAdmin, Some(ScopeRef::Formation(f))).is_err());
        assert!(Scope::resolve(Role::OfficeAdmin, Some(ScopeRef::Formation(f))).is_err());
        assert!(Scope::resolve(Role::StaffUser, Some(ScopeRef::Staff(StaffId::new()))).is_ok());
    }

    #[test]
    fn office_scope_only_covers_its_office() {
        let office = OfficeId::new();
        let formation = FormationId::new();
        let p = Principal::new(UserId::new(), Role::OfficeAdmin, Scope::Office(office));
        assert!(p.covers_staff(StaffId::new(), formation, Some(office)));
        assert!(!p.covers_staff(StaffId::new(), formation, Some(OfficeId::new())));
        assert!(!p.covers_staff(StaffId::new(), formation, None));
        assert!(!p.covers_formation(formation));
    }

    #[test]
    fn scope_ref_wire_format() {
        let id = OfficeId::new();
        let json = serde_json::to_value(ScopeRef::Office(id)).unwrap();
        assert_eq!(json["kind"], "office");
        assert_eq!(json["id"], id.to_string());
    }
}
