//! Pending-edit approval state machine.
//!
//! `pending → approved | rejected`. Both outcomes are terminal; any further
//! transition is a conflict.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nominalroll_auth::Role;
use nominalroll_core::{DomainError, DomainResult, Entity, PendingEditId, StaffId, UserId};

use crate::field::StaffDelta;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditStatus {
    Pending,
    Approved,
    Rejected,
}

impl EditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditStatus::Pending => "pending",
            EditStatus::Approved => "approved",
            EditStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        *self != EditStatus::Pending
    }
}

impl core::str::FromStr for EditStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EditStatus::Pending),
            "approved" => Ok(EditStatus::Approved),
            "rejected" => Ok(EditStatus::Rejected),
            _ => Err(DomainError::validation(format!("unknown edit status '{s}'"))),
        }
    }
}

/// Who resolved an edit and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub resolver_id: UserId,
    pub resolver_role: Role,
    pub resolved_at: DateTime<Utc>,
    pub note: Option<String>,
}

/// A proposed change to a staff record awaiting approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEdit {
    pub id: PendingEditId,
    pub staff_id: StaffId,
    pub delta: StaffDelta,
    pub submitter_id: UserId,
    pub submitter_role: Role,
    pub status: EditStatus,
    pub submitted_at: DateTime<Utc>,
    pub resolution: Option<Resolution>,
}

impl PendingEdit {
    pub fn submit(
        id: PendingEditId,
        staff_id: StaffId,
        delta: StaffDelta,
        submitter_id: UserId,
        submitter_role: Role,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if delta.is_empty() {
            return Err(DomainError::validation("pending edit must change at least one field"));
        }
        Ok(Self {
            id,
            staff_id,
            delta,
            submitter_id,
            submitter_role,
            status: EditStatus::Pending,
            submitted_at: now,
            resolution: None,
        })
    }

    fn resolve(&mut self, outcome: EditStatus, resolution: Resolution) -> DomainResult<()> {
        if self.status.is_terminal() {
            return Err(DomainError::conflict(format!(
                "pending edit {} is already {}",
                self.id,
                self.status.as_str()
            )));
        }
        self.status = outcome;
        self.resolution = Some(resolution);
        Ok(())
    }

    pub fn approve(&mut self, resolution: Resolution) -> DomainResult<()> {
        self.resolve(EditStatus::Approved, resolution)
    }

    pub fn reject(&mut self, resolution: Resolution) -> DomainResult<()> {
        self.resolve(EditStatus::Rejected, resolution)
    }
}

impl Entity for PendingEdit {
    type Id = PendingEditId;

    fn id(&self) -> &PendingEditId {
        &self.id
    }

    fn kind() -> &'static str {
        "pending_edit"
    }
}
