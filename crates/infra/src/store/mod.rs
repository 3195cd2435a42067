//! Persistence boundary for personnel state.
//!
//! Reads are plain lookups. Every write goes through [`PersonnelStore::commit`]
//! with a [`ChangeSet`], which carries exactly one audit entry together with all
//! entity writes, history rows and inbox rows of one operation. A change set is
//! applied completely or not at all.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use nominalroll_auth::{Role, ScopeRef, UserAccount};
use nominalroll_core::{
    AuditEntryId, DomainError, ExpectedVersion, FormationId, LeaveId, NotificationId, OfficeId,
    PendingEditId, StaffId, UserId,
};
use nominalroll_personnel::{
    AuditLogEntry, AuditQuery, EditStatus, Formation, LeaveRequest, LeaveStatus, MovementKind,
    MovementRecord, Notification, Office, PendingEdit, Staff, StaffFilter,
};

pub use in_memory::InMemoryPersonnelStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresPersonnelStore;

/// Store operation error.
///
/// `NotFound` and `Conflict` are detected by the store itself (missing rows,
/// uniqueness, stale state at commit). `Invalid` rejects query arguments the
/// backend cannot represent; `Backend` is everything else.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid query: {0}")]
    Invalid(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<DomainError> for StoreError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::NotFound(msg) => StoreError::NotFound(msg),
            DomainError::Conflict(msg) => StoreError::Conflict(msg),
            DomainError::Validation(msg) => StoreError::Invalid(msg),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaffWrite {
    Insert(Staff),
    /// Replace the stored record; `expected` is checked against the stored version.
    Update { staff: Staff, expected: ExpectedVersion },
    Delete(StaffId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormationWrite {
    Upsert(Formation),
    Delete(FormationId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfficeWrite {
    Upsert(Office),
    Delete(OfficeId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserWrite {
    Insert(UserAccount),
    /// Replace the role and scope of an existing account.
    Assign {
        id: UserId,
        role: Role,
        scope: Option<ScopeRef>,
    },
}

/// All writes produced by one mutating operation.
///
/// Pending edits and leave requests written in a resolved state are guarded:
/// the commit fails with a conflict unless the stored row is still pending.
#[derive(Debug, Clone)]
pub struct ChangeSet {
    audit: AuditLogEntry,
    pub staff: Vec<StaffWrite>,
    pub formations: Vec<FormationWrite>,
    pub offices: Vec<OfficeWrite>,
    pub users: Vec<UserWrite>,
    pub movements: Vec<MovementRecord>,
    pub pending_edits: Vec<PendingEdit>,
    pub leaves: Vec<LeaveRequest>,
    pub notifications: Vec<Notification>,
}

impl ChangeSet {
    pub fn new(audit: AuditLogEntry) -> Self {
        Self {
            audit,
            staff: Vec::new(),
            formations: Vec::new(),
            offices: Vec::new(),
            users: Vec::new(),
            movements: Vec::new(),
            pending_edits: Vec::new(),
            leaves: Vec::new(),
            notifications: Vec::new(),
        }
    }

    pub fn audit(&self) -> &AuditLogEntry {
        &self.audit
    }

    pub fn insert_staff(mut self, staff: Staff) -> Self {
        self.staff.push(StaffWrite::Insert(staff));
        self
    }

    pub fn update_staff(mut self, staff: Staff, expected: ExpectedVersion) -> Self {
        self.staff.push(StaffWrite::Update { staff, expected });
        self
    }

    pub fn delete_staff(mut self, id: StaffId) -> Self {
        self.staff.push(StaffWrite::Delete(id));
        self
    }

    pub fn put_formation(mut self, formation: Formation) -> Self {
        self.formations.push(FormationWrite::Upsert(formation));
        self
    }

    pub fn delete_formation(mut self, id: FormationId) -> Self {
        self.formations.push(FormationWrite::Delete(id));
        self
    }

    pub fn put_office(mut self, office: Office) -> Self {
        self.offices.push(OfficeWrite::Upsert(office));
        self
    }

    pub fn delete_office(mut self, id: OfficeId) -> Self {
        self.offices.push(OfficeWrite::Delete(id));
        self
    }

    pub fn insert_user(mut self, user: UserAccount) -> Self {
        self.users.push(UserWrite::Insert(user));
        self
    }

    pub fn assign_user_role(mut self, id: UserId, role: Role, scope: Option<ScopeRef>) -> Self {
        self.users.push(UserWrite::Assign { id, role, scope });
        self
    }

    pub fn record_movement(mut self, movement: MovementRecord) -> Self {
        self.movements.push(movement);
        self
    }

    pub fn put_pending_edit(mut self, edit: PendingEdit) -> Self {
        self.pending_edits.push(edit);
        self
    }

    pub fn put_leave(mut self, leave: LeaveRequest) -> Self {
        self.leaves.push(leave);
        self
    }

    pub fn notify(mut self, notifications: impl IntoIterator<Item = Notification>) -> Self {
        self.notifications.extend(notifications);
        self
    }
}

/// What a successful commit wrote, for post-commit side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Committed {
    pub audit_id: AuditEntryId,
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserQuery {
    pub role: Option<Role>,
    pub scope: Option<ScopeRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EditQuery {
    pub status: Option<EditStatus>,
    pub staff_id: Option<StaffId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct LeaveQuery {
    pub status: Option<LeaveStatus>,
    pub staff_id: Option<StaffId>,
}

/// Personnel persistence.
///
/// List operations return rows in a stable order: staff in nominal-roll order,
/// history and audit newest first.
#[async_trait]
pub trait PersonnelStore: Send + Sync {
    async fn get_staff(&self, id: StaffId) -> Result<Option<Staff>, StoreError>;
    async fn find_staff_by_nis(&self, nis_no: &str) -> Result<Option<Staff>, StoreError>;
    /// Filtered, roll-ordered and paged.
    async fn list_staff(&self, filter: &StaffFilter) -> Result<Vec<Staff>, StoreError>;

    async fn get_formation(&self, id: FormationId) -> Result<Option<Formation>, StoreError>;
    async fn list_formations(&self) -> Result<Vec<Formation>, StoreError>;
    async fn get_office(&self, id: OfficeId) -> Result<Option<Office>, StoreError>;
    async fn list_offices(&self, formation_id: Option<FormationId>) -> Result<Vec<Office>, StoreError>;

    async fn get_user(&self, id: UserId) -> Result<Option<UserAccount>, StoreError>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserAccount>, StoreError>;
    async fn list_users(&self, query: &UserQuery) -> Result<Vec<UserAccount>, StoreError>;

    async fn get_pending_edit(&self, id: PendingEditId) -> Result<Option<PendingEdit>, StoreError>;
    async fn list_pending_edits(&self, query: &EditQuery) -> Result<Vec<PendingEdit>, StoreError>;

    async fn list_movements(
        &self,
        staff_id: StaffId,
        kind: Option<MovementKind>,
    ) -> Result<Vec<MovementRecord>, StoreError>;

    async fn query_audit(&self, query: &AuditQuery) -> Result<Vec<AuditLogEntry>, StoreError>;

    async fn get_leave(&self, id: LeaveId) -> Result<Option<LeaveRequest>, StoreError>;
    async fn list_leaves(&self, query: &LeaveQuery) -> Result<Vec<LeaveRequest>, StoreError>;

    async fn list_notifications(
        &self,
        recipient_id: UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, StoreError>;
    /// Mark one of the recipient's notifications read. Other users' rows are
    /// reported as not found.
    async fn mark_notification_read(
        &self,
        id: NotificationId,
        recipient_id: UserId,
    ) -> Result<Notification, StoreError>;

    /// Atomically apply a change set.
    async fn commit(&self, changes: ChangeSet) -> Result<Committed, StoreError>;
}
