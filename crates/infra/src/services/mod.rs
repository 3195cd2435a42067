//! Application workflows over the personnel store.
//!
//! ## Execution flow
//!
//! ```text
//! principal + request
//!   ↓
//! 1. Load current state from the store
//!   ↓
//! 2. Authorize (capability row + scope)
//!   ↓
//! 3. Decide with the pure domain types (no IO)
//!   ↓
//! 4. Commit one ChangeSet (entities + history + exactly one audit entry + inbox)
//!   ↓
//! 5. Hand committed notifications to the sink
//! ```
//!
//! Reads outside the caller's scope surface as `NotFound`; writes outside the
//! caller's scope surface as `Forbidden`. Every operation takes `now` from the
//! caller so workflows stay deterministic under test.

mod approvals;
mod audit;
mod directory;
mod export;
mod import;
mod leave;
mod movement;
mod notifications;
mod org;
mod retirement;
mod users;

#[cfg(test)]
mod tests;

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;

use nominalroll_auth::{AuthzError, Principal, Role, Scope, ScopeRef, UserAccount};
use nominalroll_core::{DomainError, Entity, FormationId, OfficeId, StaffId, UserId};
use nominalroll_personnel::{Notification, Staff, StaffFilter};

use crate::export::ExportError;
use crate::notify::NotificationSink;
use crate::store::{ChangeSet, Committed, PersonnelStore, StoreError, UserQuery};

pub use import::{ImportReport, ImportTarget, RowError};
pub use movement::{MoveOutcome, MoveTarget};
pub use org::{NewFormation, NewOffice, OfficePatch};
pub use users::{NewUser, RoleChange};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Export(#[from] ExportError),
}

impl From<AuthzError> for ServiceError {
    fn from(value: AuthzError) -> Self {
        ServiceError::Domain(value.into())
    }
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ServiceError::Domain(DomainError::NotFound(_)) | ServiceError::Store(StoreError::NotFound(_))
        )
    }

    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            ServiceError::Domain(DomainError::Conflict(_)) | ServiceError::Store(StoreError::Conflict(_))
        )
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, ServiceError::Domain(DomainError::Forbidden(_)))
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ServiceError::Domain(DomainError::Validation(_) | DomainError::InvalidId(_))
                | ServiceError::Store(StoreError::Invalid(_))
        )
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

fn missing<E: Entity>(id: impl core::fmt::Display) -> ServiceError {
    DomainError::not_found(format!("{} {id}", E::kind())).into()
}

fn forbidden(msg: impl Into<String>) -> ServiceError {
    DomainError::forbidden(msg).into()
}

/// Serialize a value into an audit diff.
fn to_diff<T: serde::Serialize>(value: &T) -> ServiceResult<serde_json::Value> {
    serde_json::to_value(value).map_err(|e| DomainError::invariant(e.to_string()).into())
}

/// Personnel workflows composed over a store and a notification sink.
#[derive(Clone)]
pub struct PersonnelService {
    store: Arc<dyn PersonnelStore>,
    sink: Arc<dyn NotificationSink>,
}

impl PersonnelService {
    pub fn new(store: Arc<dyn PersonnelStore>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { store, sink }
    }

    pub fn store(&self) -> &Arc<dyn PersonnelStore> {
        &self.store
    }

    /// Account behind a token subject, if one was registered.
    pub async fn find_user(&self, id: UserId) -> ServiceResult<Option<UserAccount>> {
        Ok(self.store.get_user(id).await?)
    }

    async fn commit(&self, changes: ChangeSet) -> ServiceResult<Committed> {
        let action = changes.audit().action;
        let committed = self.store.commit(changes).await?;
        tracing::info!(
            action = action.as_str(),
            audit_id = %committed.audit_id,
            notifications = committed.notifications.len(),
            "change committed"
        );
        for notification in &committed.notifications {
            self.sink.deliver(notification).await;
        }
        Ok(committed)
    }

    async fn load_staff(&self, id: StaffId) -> ServiceResult<Staff> {
        self.store
            .get_staff(id)
            .await?
            .ok_or_else(|| missing::<Staff>(id))
    }

    /// Load a staff record for reading; records outside scope do not exist.
    async fn visible_staff(&self, principal: &Principal, id: StaffId) -> ServiceResult<Staff> {
        let staff = self.load_staff(id).await?;
        if !principal.covers_staff(staff.id, staff.formation_id, staff.office_id) {
            return Err(missing::<Staff>(id));
        }
        Ok(staff)
    }

    /// Load a staff record for writing; records outside scope are forbidden.
    async fn writable_staff(&self, principal: &Principal, id: StaffId) -> ServiceResult<Staff> {
        let staff = self.load_staff(id).await?;
        if !principal.covers_staff(staff.id, staff.formation_id, staff.office_id) {
            tracing::warn!(user_id = %principal.user_id, staff_id = %id, "write outside scope");
            return Err(forbidden("staff record is outside your scope"));
        }
        Ok(staff)
    }

    /// Ids of every staff record the principal can see, or `None` for global scope.
    async fn visible_staff_ids(&self, principal: &Principal) -> ServiceResult<Option<HashSet<StaffId>>> {
        if principal.scope == Scope::Global {
            return Ok(None);
        }
        let Some(filter) = StaffFilter::default().scoped(principal) else {
            return Ok(Some(HashSet::new()));
        };
        let rows = self.store.list_staff(&filter).await?;
        Ok(Some(rows.into_iter().map(|s| s.id).collect()))
    }

    async fn users_with(&self, role: Role, scope: Option<ScopeRef>) -> ServiceResult<Vec<UserAccount>> {
        Ok(self.store.list_users(&UserQuery { role: Some(role), scope }).await?)
    }

    async fn formation_admins(&self, formation_id: FormationId) -> ServiceResult<Vec<UserAccount>> {
        self.users_with(Role::FormationAdmin, Some(ScopeRef::Formation(formation_id)))
            .await
    }

    async fn office_admins(&self, office_id: OfficeId) -> ServiceResult<Vec<UserAccount>> {
        self.users_with(Role::OfficeAdmin, Some(ScopeRef::Office(office_id)))
            .await
    }

    async fn global_admins(&self) -> ServiceResult<Vec<UserAccount>> {
        let mut admins = self.users_with(Role::MainAdmin, None).await?;
        admins.extend(self.users_with(Role::SpecialAdmin, None).await?);
        Ok(admins)
    }
}

/// One inbox row per distinct recipient, never addressed to the actor.
fn inbox(
    actor: &Principal,
    recipients: impl IntoIterator<Item = UserId>,
    message: &str,
    staff_id: Option<StaffId>,
    now: chrono::DateTime<chrono::Utc>,
) -> Vec<Notification> {
    let mut seen = HashSet::new();
    recipients
        .into_iter()
        .filter(|id| *id != actor.user_id && seen.insert(*id))
        .map(|id| Notification::new(id, message, staff_id, now))
        .collect()
}
