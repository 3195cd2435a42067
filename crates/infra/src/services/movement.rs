use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use nominalroll_auth::{Principal, Scope, require};
use nominalroll_core::{DomainError, ExpectedVersion, FormationId, MovementId, OfficeId, StaffId};
use nominalroll_personnel::{
    AuditAction, AuditLogEntry, Formation, Location, MovementKind, MovementRecord, Office, Staff,
    TargetKind, classify_move,
};

use super::{PersonnelService, ServiceResult, inbox, missing};
use crate::store::ChangeSet;

/// Where a staff member should end up.
///
/// When only an office is given the formation is taken from it; when only a
/// formation is given the staff member is posted there without an office.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct MoveTarget {
    pub formation_id: Option<FormationId>,
    pub office_id: Option<OfficeId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved { staff: Staff, movement: MovementRecord },
    /// Target equals the current location; nothing was written.
    Unchanged(Staff),
}

impl MoveOutcome {
    pub fn staff(&self) -> &Staff {
        match self {
            MoveOutcome::Moved { staff, .. } | MoveOutcome::Unchanged(staff) => staff,
        }
    }
}

impl PersonnelService {
    async fn resolve_target(&self, target: MoveTarget) -> ServiceResult<Location> {
        let office = match target.office_id {
            Some(id) => Some(
                self.store
                    .get_office(id)
                    .await?
                    .ok_or_else(|| missing::<Office>(id))?,
            ),
            None => None,
        };

        let formation_id = match (target.formation_id, &office) {
            (Some(f), _) => {
                self.store
                    .get_formation(f)
                    .await?
                    .ok_or_else(|| missing::<Formation>(f))?;
                f
            }
            (None, Some(o)) => o.formation_id,
            (None, None) => {
                return Err(DomainError::validation("move needs a target office or formation").into());
            }
        };

        if let Some(o) = &office {
            if o.formation_id != formation_id {
                return Err(DomainError::validation(format!(
                    "office '{}' is not inside the target formation",
                    o.name
                ))
                .into());
            }
        }
        Ok(Location::new(formation_id, office.map(|o| o.id)))
    }

    /// Move a staff member to another office or formation.
    #[instrument(skip(self, principal), fields(user_id = %principal.user_id, staff_id = %staff_id), err)]
    pub async fn move_staff(
        &self,
        principal: &Principal,
        staff_id: StaffId,
        target: MoveTarget,
        now: DateTime<Utc>,
    ) -> ServiceResult<MoveOutcome> {
        let mut staff = self.writable_staff(principal, staff_id).await?;
        let to = self.resolve_target(target).await?;
        let from = staff.location();
        let caps = principal.capabilities();

        let Some(kind) = classify_move(from, to) else {
            require(caps.internal_move || caps.formation_posting, "move staff")?;
            return Ok(MoveOutcome::Unchanged(staff));
        };
        match kind {
            MovementKind::InternalMovement => require(caps.internal_move, "move staff between offices")?,
            MovementKind::FormationPosting => require(caps.formation_posting, "post staff to another formation")?,
        }
        if staff.is_exited() {
            return Err(DomainError::conflict(format!(
                "staff {} is {} and cannot be moved",
                staff.id,
                staff.status.as_str()
            ))
            .into());
        }

        let loaded = staff.version;
        staff.relocate(to, now);
        let movement = MovementRecord {
            id: MovementId::new(),
            staff_id,
            kind,
            from,
            to,
            occurred_at: now,
            actor_id: principal.user_id,
            actor_role: principal.role,
        };

        let mut recipients = Vec::new();
        if kind == MovementKind::FormationPosting {
            recipients.extend(self.formation_admins(to.formation_id).await?.into_iter().map(|u| u.id));
        }
        if let Some(office_id) = to.office_id {
            recipients.extend(self.office_admins(office_id).await?.into_iter().map(|u| u.id));
        }
        let message = match kind {
            MovementKind::InternalMovement => format!("{} has been moved into your office", staff.display_name()),
            MovementKind::FormationPosting => format!("{} has been posted to your formation", staff.display_name()),
        };

        let audit = AuditLogEntry::new(principal, AuditAction::StaffMoved, TargetKind::Staff, staff_id, now)
            .with_diff(json!({ "kind": kind, "from": from, "to": to }));
        let changes = ChangeSet::new(audit)
            .update_staff(staff.clone(), ExpectedVersion::Exact(loaded))
            .record_movement(movement.clone())
            .notify(inbox(principal, recipients, &message, Some(staff_id), now));
        self.commit(changes).await?;

        Ok(MoveOutcome::Moved { staff, movement })
    }

    /// Movement history, newest first. `kind` narrows to postings or internal moves.
    ///
    /// History outlives the staff record. Once the record is deleted only
    /// global readers can still reach it.
    pub async fn list_movements(
        &self,
        principal: &Principal,
        staff_id: StaffId,
        kind: Option<MovementKind>,
    ) -> ServiceResult<Vec<MovementRecord>> {
        if principal.scope != Scope::Global {
            self.visible_staff(principal, staff_id).await?;
        }
        Ok(self.store.list_movements(staff_id, kind).await?)
    }
}
