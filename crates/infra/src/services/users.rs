use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use nominalroll_auth::{Principal, Role, Scope, ScopeRef, UserAccount, hash_password, require};
use nominalroll_core::{DomainError, FormationId, UserId};
use nominalroll_personnel::{AuditAction, AuditLogEntry, Formation, Office, Staff, StaffFilter, TargetKind};

use super::{PersonnelService, ServiceResult, forbidden, inbox, missing};
use crate::store::{ChangeSet, UserQuery};

#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub scope: Option<ScopeRef>,
}

/// New role and scope for an existing account.
#[derive(Debug, Clone, Deserialize)]
pub struct RoleChange {
    pub role: Role,
    #[serde(default)]
    pub scope: Option<ScopeRef>,
}

impl PersonnelService {
    /// Formation the referenced scope lives in; errors when it does not exist.
    async fn scope_formation(&self, scope: ScopeRef) -> ServiceResult<FormationId> {
        match scope {
            ScopeRef::Formation(id) => Ok(self
                .store
                .get_formation(id)
                .await?
                .ok_or_else(|| missing::<Formation>(id))?
                .id),
            ScopeRef::Office(id) => Ok(self
                .store
                .get_office(id)
                .await?
                .ok_or_else(|| missing::<Office>(id))?
                .formation_id),
            ScopeRef::Staff(id) => Ok(self
                .store
                .get_staff(id)
                .await?
                .ok_or_else(|| missing::<Staff>(id))?
                .formation_id),
        }
    }

    #[instrument(skip(self, principal, input), fields(user_id = %principal.user_id, role = %input.role), err)]
    pub async fn register_user(
        &self,
        principal: &Principal,
        input: NewUser,
        now: DateTime<Utc>,
    ) -> ServiceResult<UserAccount> {
        require(principal.capabilities().register_users, "register users")?;
        if input.role.outranks(principal.role) {
            return Err(forbidden(format!("a {} may not register a {}", principal.role, input.role)));
        }

        Scope::resolve(input.role, input.scope).map_err(|e| DomainError::validation(e.to_string()))?;
        let formation = match input.scope {
            Some(scope) => Some(self.scope_formation(scope).await?),
            None => None,
        };
        if let Scope::Formation(own) = principal.scope {
            if !principal.role.outranks(input.role) || formation != Some(own) {
                return Err(forbidden("users may only be registered below your role inside your formation"));
            }
        }

        if self.store.find_user_by_username(&input.username).await?.is_some() {
            return Err(DomainError::conflict(format!(
                "username '{}' is already taken",
                input.username.trim()
            ))
            .into());
        }

        let hash = hash_password(&input.password)?;
        let user = UserAccount::new(input.username, input.role, input.scope, hash, now)?;

        let audit = AuditLogEntry::new(principal, AuditAction::UserRegistered, TargetKind::User, user.id, now)
            .with_diff(json!({ "username": user.username, "role": user.role, "scope": user.scope }));
        self.commit(ChangeSet::new(audit).insert_user(user.clone()))
            .await?;
        Ok(user)
    }

    /// Accounts the caller may manage: everything for global admins, accounts
    /// scoped inside the formation for formation admins.
    pub async fn list_users(&self, principal: &Principal, role: Option<Role>) -> ServiceResult<Vec<UserAccount>> {
        require(principal.capabilities().register_users, "list users")?;
        let users = self.store.list_users(&UserQuery { role, scope: None }).await?;

        let Scope::Formation(own) = principal.scope else {
            return Ok(users);
        };
        let offices: HashSet<_> = self
            .store
            .list_offices(Some(own))
            .await?
            .into_iter()
            .map(|o| o.id)
            .collect();
        let staff: HashSet<_> = self
            .store
            .list_staff(&StaffFilter {
                formation_id: Some(own),
                ..StaffFilter::default()
            })
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();

        Ok(users
            .into_iter()
            .filter(|u| match u.scope {
                Some(ScopeRef::Formation(f)) => f == own,
                Some(ScopeRef::Office(o)) => offices.contains(&o),
                Some(ScopeRef::Staff(s)) => staff.contains(&s),
                None => false,
            })
            .collect())
    }

    /// Reassign an account. Neither the old nor the new role may outrank the
    /// caller; formation admins must also stay inside their own formation on
    /// both sides of the change.
    #[instrument(skip(self, principal, change), fields(user_id = %principal.user_id, target = %id, role = %change.role), err)]
    pub async fn change_user_role(
        &self,
        principal: &Principal,
        id: UserId,
        change: RoleChange,
        now: DateTime<Utc>,
    ) -> ServiceResult<UserAccount> {
        require(principal.capabilities().register_users, "change user roles")?;
        let mut account = self
            .store
            .get_user(id)
            .await?
            .ok_or_else(|| missing::<UserAccount>(id))?;
        if account.id == principal.user_id {
            return Err(forbidden("you may not change your own role"));
        }
        for role in [account.role, change.role] {
            if role.outranks(principal.role) {
                return Err(forbidden(format!("a {} may not assign or demote a {role}", principal.role)));
            }
        }

        Scope::resolve(change.role, change.scope).map_err(|e| DomainError::validation(e.to_string()))?;
        if let Scope::Formation(own) = principal.scope {
            let current = match account.scope {
                Some(scope) => Some(self.scope_formation(scope).await?),
                None => None,
            };
            let next = match change.scope {
                Some(scope) => Some(self.scope_formation(scope).await?),
                None => None,
            };
            let below = principal.role.outranks(account.role) && principal.role.outranks(change.role);
            if !below || current != Some(own) || next != Some(own) {
                return Err(forbidden("roles may only be changed below your role inside your formation"));
            }
        } else if let Some(scope) = change.scope {
            self.scope_formation(scope).await?;
        }

        if account.role == change.role && account.scope == change.scope {
            return Ok(account);
        }

        let audit = AuditLogEntry::new(principal, AuditAction::UserRoleChanged, TargetKind::User, account.id, now)
            .with_diff(json!({
                "from": { "role": account.role, "scope": account.scope },
                "to": { "role": change.role, "scope": change.scope },
            }));
        let message = format!("Your role was changed from {} to {}", account.role, change.role);
        let changes = ChangeSet::new(audit)
            .assign_user_role(account.id, change.role, change.scope)
            .notify(inbox(principal, [account.id], &message, None, now));
        self.commit(changes).await?;

        account.role = change.role;
        account.scope = change.scope;
        Ok(account)
    }
}
