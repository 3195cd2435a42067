//! Leave requests.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use nominalroll_core::{DomainError, DomainResult, Entity, LeaveId, StaffId, UserId};

use crate::dates;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveType {
    Annual,
    Sick,
    Casual,
    Maternity,
    Study,
    Compassionate,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
}

impl LeaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaveStatus::Pending => "pending",
            LeaveStatus::Approved => "approved",
            LeaveStatus::Rejected => "rejected",
        }
    }
}

impl core::str::FromStr for LeaveStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LeaveStatus::Pending),
            "approved" => Ok(LeaveStatus::Approved),
            "rejected" => Ok(LeaveStatus::Rejected),
            _ => Err(DomainError::validation(format!("unknown leave status '{s}'"))),
        }
    }
}

impl LeaveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaveType::Annual => "annual",
            LeaveType::Sick => "sick",
            LeaveType::Casual => "casual",
            LeaveType::Maternity => "maternity",
            LeaveType::Study => "study",
            LeaveType::Compassionate => "compassionate",
        }
    }
}

impl core::str::FromStr for LeaveType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "annual" => Ok(LeaveType::Annual),
            "sick" => Ok(LeaveType::Sick),
            "casual" => Ok(LeaveType::Casual),
            "maternity" => Ok(LeaveType::Maternity),
            "study" => Ok(LeaveType::Study),
            "compassionate" => Ok(LeaveType::Compassionate),
            _ => Err(DomainError::validation(format!("unknown leave type '{s}'"))),
        }
    }
}

/// Input for a new leave request.
#[derive(Debug, Clone, Deserialize)]
pub struct NewLeave {
    pub staff_id: StaffId,
    pub leave_type: LeaveType,
    #[serde(with = "dates::flexible")]
    pub start_date: NaiveDate,
    #[serde(with = "dates::flexible")]
    pub end_date: NaiveDate,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub id: LeaveId,
    pub staff_id: StaffId,
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: Option<String>,
    pub status: LeaveStatus,
    pub requested_by: UserId,
    pub requested_at: DateTime<Utc>,
    pub decided_by: Option<UserId>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decision_note: Option<String>,
}

impl LeaveRequest {
    pub fn new(
        id: LeaveId,
        input: NewLeave,
        requested_by: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if input.end_date < input.start_date {
            return Err(DomainError::validation("leave end date is before its start date"));
        }
        Ok(Self {
            id,
            staff_id: input.staff_id,
            leave_type: input.leave_type,
            start_date: input.start_date,
            end_date: input.end_date,
            reason: input.reason.filter(|r| !r.trim().is_empty()),
            status: LeaveStatus::Pending,
            requested_by,
            requested_at: now,
            decided_by: None,
            decided_at: None,
            decision_note: None,
        })
    }

    /// Inclusive day count.
    pub fn days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }

    /// Same staff member and intersecting (inclusive) date ranges.
    pub fn overlaps(&self, other: &LeaveRequest) -> bool {
        self.staff_id == other.staff_id
            && self.start_date <= other.end_date
            && other.start_date <= self.end_date
    }

    /// Whether the staff member is on approved leave on `day`.
    pub fn covers(&self, day: NaiveDate) -> bool {
        self.status == LeaveStatus::Approved && self.start_date <= day && day <= self.end_date
    }

    fn decide(
        &mut self,
        outcome: LeaveStatus,
        by: UserId,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if self.status != LeaveStatus::Pending {
            return Err(DomainError::conflict(format!(
                "leave {} is already {}",
                self.id,
                self.status.as_str()
            )));
        }
        self.status = outcome;
        self.decided_by = Some(by);
        self.decided_at = Some(now);
        self.decision_note = note;
        Ok(())
    }

    pub fn approve(&mut self, by: UserId, note: Option<String>, now: DateTime<Utc>) -> DomainResult<()> {
        self.decide(LeaveStatus::Approved, by, note, now)
    }

    pub fn reject(&mut self, by: UserId, note: Option<String>, now: DateTime<Utc>) -> DomainResult<()> {
        self.decide(LeaveStatus::Rejected, by, note, now)
    }
}

impl Entity for LeaveRequest {
    type Id = LeaveId;

    fn id(&self) -> &LeaveId {
        &self.id
    }

    fn kind() -> &'static str {
        "leave"
    }
}
