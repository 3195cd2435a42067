use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::instrument;

use nominalroll_auth::{Principal, require};
use nominalroll_core::{DomainError, ExpectedVersion, PendingEditId, StaffId};
use nominalroll_personnel::{
    AuditAction, AuditLogEntry, PendingEdit, Resolution, Staff, StaffDelta, TargetKind,
};

use super::{PersonnelService, ServiceResult, forbidden, inbox, missing};
use crate::store::{ChangeSet, EditQuery};

impl PersonnelService {
    /// Queue a change that touches at least one field the submitter may not
    /// write directly.
    #[instrument(skip(self, principal, delta), fields(user_id = %principal.user_id, staff_id = %staff_id), err)]
    pub async fn submit_edit(
        &self,
        principal: &Principal,
        staff_id: StaffId,
        delta: StaffDelta,
        now: DateTime<Utc>,
    ) -> ServiceResult<PendingEdit> {
        let staff = self.writable_staff(principal, staff_id).await?;
        if delta.is_empty() {
            return Err(DomainError::validation("pending edit must change at least one field").into());
        }
        if delta.fields_above(principal.capabilities().write_tier).is_empty() {
            return Err(DomainError::validation(
                "every field in this change is directly writable; update the record instead",
            )
            .into());
        }
        // Reject deltas that could never be applied (e.g. blanking a required field).
        staff.clone().apply_delta(&delta, now)?;

        let diff = json!({ "staff_id": staff_id, "changes": staff.diff(&delta) });
        let edit = PendingEdit::submit(
            PendingEditId::new(),
            staff_id,
            delta,
            principal.user_id,
            principal.role,
            now,
        )?;

        let recipients = self
            .formation_admins(staff.formation_id)
            .await?
            .into_iter()
            .map(|u| u.id);
        let message = format!("An edit to {} is awaiting approval", staff.display_name());

        let audit = AuditLogEntry::new(principal, AuditAction::EditSubmitted, TargetKind::PendingEdit, edit.id, now)
            .with_diff(diff);
        let changes = ChangeSet::new(audit)
            .put_pending_edit(edit.clone())
            .notify(inbox(principal, recipients, &message, Some(staff_id), now));
        self.commit(changes).await?;
        Ok(edit)
    }

    /// Load an edit and its staff record, checking the resolver's authority.
    async fn resolvable_edit(&self, principal: &Principal, id: PendingEditId) -> ServiceResult<(PendingEdit, Staff)> {
        let edit = self
            .store
            .get_pending_edit(id)
            .await?
            .ok_or_else(|| missing::<PendingEdit>(id))?;
        let staff = self.writable_staff(principal, edit.staff_id).await?;

        require(principal.capabilities().approve_edits, "resolve pending edits")?;
        if !principal.role.outranks(edit.submitter_role) {
            return Err(forbidden(format!(
                "only a role above {} may resolve this edit",
                edit.submitter_role
            )));
        }
        let beyond = edit.delta.fields_above(principal.capabilities().write_tier);
        if !beyond.is_empty() {
            return Err(forbidden("edit touches fields your role may not write"));
        }
        Ok((edit, staff))
    }

    /// Apply a pending edit to the staff record.
    #[instrument(skip(self, principal, note), fields(user_id = %principal.user_id, edit_id = %id), err)]
    pub async fn approve_edit(
        &self,
        principal: &Principal,
        id: PendingEditId,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> ServiceResult<(PendingEdit, Staff)> {
        let (mut edit, mut staff) = self.resolvable_edit(principal, id).await?;
        edit.approve(Resolution {
            resolver_id: principal.user_id,
            resolver_role: principal.role,
            resolved_at: now,
            note,
        })?;

        let diff = json!({ "staff_id": staff.id, "changes": staff.diff(&edit.delta) });
        let loaded = staff.version;
        staff.apply_delta(&edit.delta, now)?;

        let message = format!("Your edit to {} was approved", staff.display_name());
        let audit = AuditLogEntry::new(principal, AuditAction::EditApproved, TargetKind::PendingEdit, id, now)
            .with_diff(diff);
        let changes = ChangeSet::new(audit)
            .update_staff(staff.clone(), ExpectedVersion::Exact(loaded))
            .put_pending_edit(edit.clone())
            .notify(inbox(principal, [edit.submitter_id], &message, Some(staff.id), now));
        self.commit(changes).await?;
        Ok((edit, staff))
    }

    /// Close a pending edit without touching the staff record.
    #[instrument(skip(self, principal, note), fields(user_id = %principal.user_id, edit_id = %id), err)]
    pub async fn reject_edit(
        &self,
        principal: &Principal,
        id: PendingEditId,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> ServiceResult<PendingEdit> {
        let (mut edit, staff) = self.resolvable_edit(principal, id).await?;
        edit.reject(Resolution {
            resolver_id: principal.user_id,
            resolver_role: principal.role,
            resolved_at: now,
            note: note.clone(),
        })?;

        let message = format!("Your edit to {} was rejected", staff.display_name());
        let audit = AuditLogEntry::new(principal, AuditAction::EditRejected, TargetKind::PendingEdit, id, now)
            .with_diff(json!({ "staff_id": staff.id, "note": note }));
        let changes = ChangeSet::new(audit)
            .put_pending_edit(edit.clone())
            .notify(inbox(principal, [edit.submitter_id], &message, Some(staff.id), now));
        self.commit(changes).await?;
        Ok(edit)
    }

    pub async fn get_pending_edit(&self, principal: &Principal, id: PendingEditId) -> ServiceResult<PendingEdit> {
        let edit = self
            .store
            .get_pending_edit(id)
            .await?
            .ok_or_else(|| missing::<PendingEdit>(id))?;
        let staff = self.load_staff(edit.staff_id).await?;
        if !principal.covers_staff(staff.id, staff.formation_id, staff.office_id) {
            return Err(missing::<PendingEdit>(id));
        }
        Ok(edit)
    }

    /// Edits on staff the caller can see, newest first.
    pub async fn list_pending_edits(&self, principal: &Principal, query: EditQuery) -> ServiceResult<Vec<PendingEdit>> {
        let edits = self.store.list_pending_edits(&query).await?;
        Ok(match self.visible_staff_ids(principal).await? {
            None => edits,
            Some(visible) => edits
                .into_iter()
                .filter(|e| visible.contains(&e.staff_id))
                .collect(),
        })
    }
}
