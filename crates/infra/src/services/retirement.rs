use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use tracing::instrument;

use nominalroll_auth::{Principal, require};
use nominalroll_core::ExpectedVersion;
use nominalroll_personnel::{
    AuditAction, AuditLogEntry, DateRange, StaffFilter, StaffStatus, TargetKind, format_dmy,
};

use super::{PersonnelService, ServiceResult, inbox};
use crate::store::ChangeSet;

impl PersonnelService {
    /// Retire every active staff member whose exit date is on or before `on`.
    ///
    /// Each retirement is its own commit with its own audit entry. A record
    /// that changed underneath the run is skipped and left for the next run.
    #[instrument(skip(self, principal), fields(user_id = %principal.user_id), err)]
    pub async fn process_retirements(
        &self,
        principal: &Principal,
        on: NaiveDate,
        now: DateTime<Utc>,
    ) -> ServiceResult<usize> {
        require(principal.capabilities().process_retirements, "process retirements")?;

        let candidates = self
            .store
            .list_staff(&StaffFilter {
                status: Some(StaffStatus::Active),
                exit_date: DateRange { from: None, to: Some(on) },
                ..StaffFilter::default()
            })
            .await?;
        let global_admins: Vec<_> = self.global_admins().await?.into_iter().map(|u| u.id).collect();

        let mut processed = 0;
        for mut staff in candidates.into_iter().filter(|s| s.is_due_for_retirement(on)) {
            let expected = ExpectedVersion::Exact(staff.version);
            staff.retire(now)?;

            let mut recipients = global_admins.clone();
            recipients.extend(self.formation_admins(staff.formation_id).await?.into_iter().map(|u| u.id));
            if let Some(office_id) = staff.office_id {
                recipients.extend(self.office_admins(office_id).await?.into_iter().map(|u| u.id));
            }
            let exit = staff.exit_date.map(format_dmy).unwrap_or_default();
            let message = format!("{} ({}) has retired, exit date {exit}", staff.display_name(), staff.nis_no);

            let audit = AuditLogEntry::new(principal, AuditAction::StaffRetired, TargetKind::Staff, staff.id, now)
                .with_diff(json!({ "status": { "from": "active", "to": "retired" }, "exit_date": staff.exit_date }));
            let changes = ChangeSet::new(audit)
                .update_staff(staff.clone(), expected)
                .notify(inbox(principal, recipients, &message, Some(staff.id), now));

            match self.commit(changes).await {
                Ok(_) => processed += 1,
                Err(err) if err.is_conflict() => {
                    tracing::warn!(staff_id = %staff.id, error = %err, "retirement skipped");
                }
                Err(err) => return Err(err),
            }
        }
        tracing::info!(processed, on = %on, "retirements processed");
        Ok(processed)
    }
}
