use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use tracing::instrument;

use nominalroll_auth::{Principal, require};
use nominalroll_core::{DomainError, ExpectedVersion, StaffId};
use nominalroll_personnel::{
    AuditAction, AuditLogEntry, DashboardSummary, Formation, LeaveStatus, NewStaff, Office, Staff,
    StaffDelta, StaffFilter, TargetKind,
};

use super::{PersonnelService, ServiceResult, forbidden, missing, to_diff};
use crate::store::{ChangeSet, LeaveQuery};

impl PersonnelService {
    #[instrument(skip(self, principal, input), fields(user_id = %principal.user_id), err)]
    pub async fn create_staff(
        &self,
        principal: &Principal,
        input: NewStaff,
        now: DateTime<Utc>,
    ) -> ServiceResult<Staff> {
        require(principal.capabilities().create_staff, "create staff")?;

        let id = StaffId::new();
        if !principal.covers_staff(id, input.formation_id, input.office_id) {
            return Err(forbidden("staff location is outside your scope"));
        }

        self.store
            .get_formation(input.formation_id)
            .await?
            .ok_or_else(|| missing::<Formation>(input.formation_id))?;
        if let Some(office_id) = input.office_id {
            let office = self
                .store
                .get_office(office_id)
                .await?
                .ok_or_else(|| missing::<Office>(office_id))?;
            if office.formation_id != input.formation_id {
                return Err(DomainError::validation(format!(
                    "office '{}' does not belong to the given formation",
                    office.name
                ))
                .into());
            }
        }

        let staff = Staff::create(id, input, now)?;
        if self.store.find_staff_by_nis(&staff.nis_no).await?.is_some() {
            return Err(DomainError::conflict(format!(
                "service number {} is already in use",
                staff.nis_no
            ))
            .into());
        }

        let audit = AuditLogEntry::new(principal, AuditAction::StaffCreated, TargetKind::Staff, staff.id, now)
            .with_diff(to_diff(&staff)?);
        self.commit(ChangeSet::new(audit).insert_staff(staff.clone()))
            .await?;
        Ok(staff)
    }

    pub async fn get_staff(&self, principal: &Principal, id: StaffId) -> ServiceResult<Staff> {
        self.visible_staff(principal, id).await
    }

    /// Roll-ordered staff within the principal's scope.
    pub async fn list_staff(&self, principal: &Principal, filter: StaffFilter) -> ServiceResult<Vec<Staff>> {
        match filter.scoped(principal) {
            Some(filter) => Ok(self.store.list_staff(&filter).await?),
            None => Ok(Vec::new()),
        }
    }

    /// Direct write. Every field of the delta must be within the caller's write
    /// tier; restricted changes by lower roles go through a pending edit instead.
    #[instrument(skip(self, principal, delta), fields(user_id = %principal.user_id, staff_id = %id), err)]
    pub async fn update_staff(
        &self,
        principal: &Principal,
        id: StaffId,
        delta: StaffDelta,
        expected: ExpectedVersion,
        now: DateTime<Utc>,
    ) -> ServiceResult<Staff> {
        let mut staff = self.writable_staff(principal, id).await?;
        if delta.is_empty() {
            return Err(DomainError::validation("update must change at least one field").into());
        }

        let denied = delta.fields_above(principal.capabilities().write_tier);
        if !denied.is_empty() {
            let names: Vec<&str> = denied.iter().map(|f| f.key()).collect();
            tracing::warn!(user_id = %principal.user_id, staff_id = %id, fields = ?names, "direct write denied");
            return Err(forbidden(format!(
                "role may not directly change: {}",
                names.join(", ")
            )));
        }
        expected.check(staff.version)?;
        let loaded = staff.version;

        let diff = staff.diff(&delta);
        staff.apply_delta(&delta, now)?;

        // The whole record is written back, so pin it to the version just read.
        let audit = AuditLogEntry::new(principal, AuditAction::StaffUpdated, TargetKind::Staff, id, now)
            .with_diff(diff);
        self.commit(ChangeSet::new(audit).update_staff(staff.clone(), ExpectedVersion::Exact(loaded)))
            .await?;
        Ok(staff)
    }

    #[instrument(skip(self, principal), fields(user_id = %principal.user_id, staff_id = %id), err)]
    pub async fn delete_staff(&self, principal: &Principal, id: StaffId, now: DateTime<Utc>) -> ServiceResult<()> {
        require(principal.capabilities().delete_staff, "delete staff")?;
        let staff = self.load_staff(id).await?;

        let audit = AuditLogEntry::new(principal, AuditAction::StaffDeleted, TargetKind::Staff, id, now)
            .with_diff(json!({ "nis_no": staff.nis_no, "name": staff.display_name() }));
        self.commit(ChangeSet::new(audit).delete_staff(id)).await?;
        Ok(())
    }

    /// Totals over the principal's visible staff.
    pub async fn dashboard(&self, principal: &Principal, today: NaiveDate) -> ServiceResult<DashboardSummary> {
        let staff = self.list_staff(principal, StaffFilter::default()).await?;
        let formations = self.store.list_formations().await?;
        let leaves = self
            .store
            .list_leaves(&LeaveQuery {
                status: Some(LeaveStatus::Approved),
                staff_id: None,
            })
            .await?;
        Ok(DashboardSummary::tally(&staff, &formations, &leaves, today))
    }
}
