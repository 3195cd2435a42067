//! Append-only audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use nominalroll_auth::{Principal, Role};
use nominalroll_core::{AuditEntryId, DomainError, Entity, UserId};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    StaffCreated,
    StaffUpdated,
    StaffDeleted,
    StaffMoved,
    StaffRetired,
    EditSubmitted,
    EditApproved,
    EditRejected,
    FormationCreated,
    FormationUpdated,
    FormationDeleted,
    OfficeCreated,
    OfficeUpdated,
    OfficeDeleted,
    UserRegistered,
    UserRoleChanged,
    LeaveRequested,
    LeaveApproved,
    LeaveRejected,
}

impl AuditAction {
    pub const ALL: [AuditAction; 19] = [
        AuditAction::StaffCreated,
        AuditAction::StaffUpdated,
        AuditAction::StaffDeleted,
        AuditAction::StaffMoved,
        AuditAction::StaffRetired,
        AuditAction::EditSubmitted,
        AuditAction::EditApproved,
        AuditAction::EditRejected,
        AuditAction::FormationCreated,
        AuditAction::FormationUpdated,
        AuditAction::FormationDeleted,
        AuditAction::OfficeCreated,
        AuditAction::OfficeUpdated,
        AuditAction::OfficeDeleted,
        AuditAction::UserRegistered,
        AuditAction::UserRoleChanged,
        AuditAction::LeaveRequested,
        AuditAction::LeaveApproved,
        AuditAction::LeaveRejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::StaffCreated => "staff_created",
            AuditAction::StaffUpdated => "staff_updated",
            AuditAction::StaffDeleted => "staff_deleted",
            AuditAction::StaffMoved => "staff_moved",
            AuditAction::StaffRetired => "staff_retired",
            AuditAction::EditSubmitted => "edit_submitted",
            AuditAction::EditApproved => "edit_approved",
            AuditAction::EditRejected => "edit_rejected",
            AuditAction::FormationCreated => "formation_created",
            AuditAction::FormationUpdated => "formation_updated",
            AuditAction::FormationDeleted => "formation_deleted",
            AuditAction::OfficeCreated => "office_created",
            AuditAction::OfficeUpdated => "office_updated",
            AuditAction::OfficeDeleted => "office_deleted",
            AuditAction::UserRegistered => "user_registered",
            AuditAction::UserRoleChanged => "user_role_changed",
            AuditAction::LeaveRequested => "leave_requested",
            AuditAction::LeaveApproved => "leave_approved",
            AuditAction::LeaveRejected => "leave_rejected",
        }
    }
}

impl core::str::FromStr for AuditAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuditAction::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown audit action '{s}'")))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    Staff,
    PendingEdit,
    Formation,
    Office,
    User,
    Leave,
}

impl TargetKind {
    pub const ALL: [TargetKind; 6] = [
        TargetKind::Staff,
        TargetKind::PendingEdit,
        TargetKind::Formation,
        TargetKind::Office,
        TargetKind::User,
        TargetKind::Leave,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Staff => "staff",
            TargetKind::PendingEdit => "pending_edit",
            TargetKind::Formation => "formation",
            TargetKind::Office => "office",
            TargetKind::User => "user",
            TargetKind::Leave => "leave",
        }
    }
}

impl core::str::FromStr for TargetKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TargetKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown audit target kind '{s}'")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: AuditEntryId,
    pub actor_id: UserId,
    pub actor_role: Role,
    pub action: AuditAction,
    pub target_kind: TargetKind,
    pub target_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub diff: Option<serde_json::Value>,
}

impl AuditLogEntry {
    pub fn new(
        actor: &Principal,
        action: AuditAction,
        target_kind: TargetKind,
        target_id: impl Into<Uuid>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AuditEntryId::new(),
            actor_id: actor.user_id,
            actor_role: actor.role,
            action,
            target_kind,
            target_id: target_id.into(),
            occurred_at,
            diff: None,
        }
    }

    pub fn with_diff(mut self, diff: serde_json::Value) -> Self {
        self.diff = Some(diff);
        self
    }
}

impl Entity for AuditLogEntry {
    type Id = AuditEntryId;

    fn id(&self) -> &AuditEntryId {
        &self.id
    }

    fn kind() -> &'static str {
        "audit_entry"
    }
}

pub const DEFAULT_AUDIT_LIMIT: usize = 100;
pub const MAX_AUDIT_LIMIT: usize = 1000;

/// Audit log query. All criteria are conjunctive; results are newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AuditQuery {
    pub actor_id: Option<UserId>,
    pub target_kind: Option<TargetKind>,
    pub target_id: Option<Uuid>,
    pub action: Option<AuditAction>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl AuditQuery {
    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        self.actor_id.is_none_or(|a| a == entry.actor_id)
            && self.target_kind.is_none_or(|k| k == entry.target_kind)
            && self.target_id.is_none_or(|t| t == entry.target_id)
            && self.action.is_none_or(|a| a == entry.action)
            && self.from.is_none_or(|f| entry.occurred_at >= f)
            && self.to.is_none_or(|t| entry.occurred_at <= t)
    }

    pub fn effective_limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_AUDIT_LIMIT).min(MAX_AUDIT_LIMIT)
    }

    pub fn effective_offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }
}
