use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::instrument;

use nominalroll_auth::{Principal, require};
use nominalroll_core::{DomainError, LeaveId};
use nominalroll_personnel::{
    AuditAction, AuditLogEntry, LeaveRequest, LeaveStatus, NewLeave, Staff, TargetKind,
};

use super::{PersonnelService, ServiceResult, inbox, missing, to_diff};
use crate::store::{ChangeSet, LeaveQuery};

impl PersonnelService {
    async fn ensure_no_overlap(&self, leave: &LeaveRequest) -> ServiceResult<()> {
        let approved = self
            .store
            .list_leaves(&LeaveQuery {
                status: Some(LeaveStatus::Approved),
                staff_id: Some(leave.staff_id),
            })
            .await?;
        if let Some(clash) = approved.iter().find(|l| l.id != leave.id && l.overlaps(leave)) {
            return Err(DomainError::conflict(format!(
                "leave overlaps approved leave {} ({} to {})",
                clash.id, clash.start_date, clash.end_date
            ))
            .into());
        }
        Ok(())
    }

    /// Staff users request for themselves; admins for anyone in scope.
    #[instrument(skip(self, principal, input), fields(user_id = %principal.user_id, staff_id = %input.staff_id), err)]
    pub async fn request_leave(
        &self,
        principal: &Principal,
        input: NewLeave,
        now: DateTime<Utc>,
    ) -> ServiceResult<LeaveRequest> {
        let staff = self.writable_staff(principal, input.staff_id).await?;
        let leave = LeaveRequest::new(LeaveId::new(), input, principal.user_id, now)?;
        self.ensure_no_overlap(&leave).await?;

        let mut recipients: Vec<_> = self
            .formation_admins(staff.formation_id)
            .await?
            .into_iter()
            .map(|u| u.id)
            .collect();
        if let Some(office_id) = staff.office_id {
            recipients.extend(self.office_admins(office_id).await?.into_iter().map(|u| u.id));
        }
        let message = format!(
            "{} requested {} leave from {} to {}",
            staff.display_name(),
            leave.leave_type.as_str(),
            leave.start_date,
            leave.end_date
        );

        let audit = AuditLogEntry::new(principal, AuditAction::LeaveRequested, TargetKind::Leave, leave.id, now)
            .with_diff(to_diff(&leave)?);
        let changes = ChangeSet::new(audit)
            .put_leave(leave.clone())
            .notify(inbox(principal, recipients, &message, Some(staff.id), now));
        self.commit(changes).await?;
        Ok(leave)
    }

    async fn decidable_leave(&self, principal: &Principal, id: LeaveId) -> ServiceResult<(LeaveRequest, Staff)> {
        require(principal.capabilities().decide_leave, "decide leave requests")?;
        let leave = self
            .store
            .get_leave(id)
            .await?
            .ok_or_else(|| missing::<LeaveRequest>(id))?;
        let staff = self.writable_staff(principal, leave.staff_id).await?;
        Ok((leave, staff))
    }

    #[instrument(skip(self, principal, note), fields(user_id = %principal.user_id, leave_id = %id), err)]
    pub async fn approve_leave(
        &self,
        principal: &Principal,
        id: LeaveId,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> ServiceResult<LeaveRequest> {
        let (mut leave, staff) = self.decidable_leave(principal, id).await?;
        leave.approve(principal.user_id, note, now)?;
        self.ensure_no_overlap(&leave).await?;
        self.record_decision(principal, leave, &staff, AuditAction::LeaveApproved, now)
            .await
    }

    #[instrument(skip(self, principal, note), fields(user_id = %principal.user_id, leave_id = %id), err)]
    pub async fn reject_leave(
        &self,
        principal: &Principal,
        id: LeaveId,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> ServiceResult<LeaveRequest> {
        let (mut leave, staff) = self.decidable_leave(principal, id).await?;
        leave.reject(principal.user_id, note, now)?;
        self.record_decision(principal, leave, &staff, AuditAction::LeaveRejected, now)
            .await
    }

    async fn record_decision(
        &self,
        principal: &Principal,
        leave: LeaveRequest,
        staff: &Staff,
        action: AuditAction,
        now: DateTime<Utc>,
    ) -> ServiceResult<LeaveRequest> {
        let message = format!(
            "Leave for {} from {} to {} was {}",
            staff.display_name(),
            leave.start_date,
            leave.end_date,
            leave.status.as_str()
        );
        let audit = AuditLogEntry::new(principal, action, TargetKind::Leave, leave.id, now)
            .with_diff(json!({ "staff_id": staff.id, "status": leave.status, "note": leave.decision_note }));
        let changes = ChangeSet::new(audit)
            .put_leave(leave.clone())
            .notify(inbox(principal, [leave.requested_by], &message, Some(staff.id), now));
        self.commit(changes).await?;
        Ok(leave)
    }

    /// Leave requests on staff the caller can see, newest first.
    pub async fn list_leaves(&self, principal: &Principal, mut query: LeaveQuery) -> ServiceResult<Vec<LeaveRequest>> {
        if let Some(own) = principal.own_staff_id() {
            if query.staff_id.is_some_and(|s| s != own) {
                return Ok(Vec::new());
            }
            query.staff_id = Some(own);
        }
        let leaves = self.store.list_leaves(&query).await?;
        Ok(match self.visible_staff_ids(principal).await? {
            None => leaves,
            Some(visible) => leaves
                .into_iter()
                .filter(|l| visible.contains(&l.staff_id))
                .collect(),
        })
    }
}
