use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;

use nominalroll_auth::{Principal, Scope, require};
use nominalroll_core::{FormationId, OfficeId};
use nominalroll_personnel::{
    AuditAction, AuditLogEntry, Formation, FormationKind, FormationPatch, Office, TargetKind,
};

use super::{PersonnelService, ServiceResult, forbidden, missing, to_diff};
use crate::store::ChangeSet;

#[derive(Debug, Clone, Deserialize)]
pub struct NewFormation {
    pub name: String,
    pub code: String,
    pub kind: FormationKind,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewOffice {
    pub formation_id: FormationId,
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OfficePatch {
    pub name: Option<String>,
}

impl PersonnelService {
    /// The single formation a scoped principal belongs to (`None` for global).
    async fn home_formation(&self, principal: &Principal) -> ServiceResult<Option<FormationId>> {
        Ok(match principal.scope {
            Scope::Global => None,
            Scope::Formation(f) => Some(f),
            Scope::Office(o) => self.store.get_office(o).await?.map(|o| o.formation_id),
            Scope::OwnRecord(s) => self.store.get_staff(s).await?.map(|s| s.formation_id),
        })
    }

    async fn load_formation(&self, id: FormationId) -> ServiceResult<Formation> {
        self.store
            .get_formation(id)
            .await?
            .ok_or_else(|| missing::<Formation>(id))
    }

    async fn load_office(&self, id: OfficeId) -> ServiceResult<Office> {
        self.store
            .get_office(id)
            .await?
            .ok_or_else(|| missing::<Office>(id))
    }

    #[instrument(skip(self, principal, input), fields(user_id = %principal.user_id), err)]
    pub async fn create_formation(
        &self,
        principal: &Principal,
        input: NewFormation,
        now: DateTime<Utc>,
    ) -> ServiceResult<Formation> {
        require(principal.capabilities().manage_formations, "manage formations")?;
        let formation = Formation::new(
            FormationId::new(),
            &input.name,
            &input.code,
            input.kind,
            input.description,
            now,
        )?;
        let audit = AuditLogEntry::new(principal, AuditAction::FormationCreated, TargetKind::Formation, formation.id, now)
            .with_diff(to_diff(&formation)?);
        self.commit(ChangeSet::new(audit).put_formation(formation.clone()))
            .await?;
        Ok(formation)
    }

    #[instrument(skip(self, principal, patch), fields(user_id = %principal.user_id, formation_id = %id), err)]
    pub async fn update_formation(
        &self,
        principal: &Principal,
        id: FormationId,
        patch: FormationPatch,
        now: DateTime<Utc>,
    ) -> ServiceResult<Formation> {
        require(principal.capabilities().manage_formations, "manage formations")?;
        let mut formation = self.load_formation(id).await?;
        let before = to_diff(&formation)?;
        formation.apply(patch)?;

        let audit = AuditLogEntry::new(principal, AuditAction::FormationUpdated, TargetKind::Formation, id, now)
            .with_diff(json!({ "before": before, "after": to_diff(&formation)? }));
        self.commit(ChangeSet::new(audit).put_formation(formation.clone()))
            .await?;
        Ok(formation)
    }

    /// Fails with a conflict while the formation still has offices or staff.
    #[instrument(skip(self, principal), fields(user_id = %principal.user_id, formation_id = %id), err)]
    pub async fn delete_formation(&self, principal: &Principal, id: FormationId, now: DateTime<Utc>) -> ServiceResult<()> {
        require(principal.capabilities().manage_formations, "manage formations")?;
        let formation = self.load_formation(id).await?;
        let audit = AuditLogEntry::new(principal, AuditAction::FormationDeleted, TargetKind::Formation, id, now)
            .with_diff(json!({ "name": formation.name, "code": formation.code }));
        self.commit(ChangeSet::new(audit).delete_formation(id)).await?;
        Ok(())
    }

    pub async fn get_formation(&self, principal: &Principal, id: FormationId) -> ServiceResult<Formation> {
        let formation = self.load_formation(id).await?;
        if principal.scope != Scope::Global && self.home_formation(principal).await? != Some(id) {
            return Err(missing::<Formation>(id));
        }
        Ok(formation)
    }

    pub async fn list_formations(&self, principal: &Principal) -> ServiceResult<Vec<Formation>> {
        let all = self.store.list_formations().await?;
        if principal.scope == Scope::Global {
            return Ok(all);
        }
        let home = self.home_formation(principal).await?;
        Ok(all.into_iter().filter(|f| Some(f.id) == home).collect())
    }

    #[instrument(skip(self, principal, input), fields(user_id = %principal.user_id), err)]
    pub async fn create_office(&self, principal: &Principal, input: NewOffice, now: DateTime<Utc>) -> ServiceResult<Office> {
        require(principal.capabilities().manage_offices, "manage offices")?;
        self.load_formation(input.formation_id).await?;
        if !principal.covers_formation(input.formation_id) {
            return Err(forbidden("formation is outside your scope"));
        }
        let office = Office::new(OfficeId::new(), input.formation_id, &input.name, now)?;
        let audit = AuditLogEntry::new(principal, AuditAction::OfficeCreated, TargetKind::Office, office.id, now)
            .with_diff(to_diff(&office)?);
        self.commit(ChangeSet::new(audit).put_office(office.clone()))
            .await?;
        Ok(office)
    }

    async fn managed_office(&self, principal: &Principal, id: OfficeId) -> ServiceResult<Office> {
        require(principal.capabilities().manage_offices, "manage offices")?;
        let office = self.load_office(id).await?;
        if !principal.covers_formation(office.formation_id) {
            return Err(forbidden("office is outside your scope"));
        }
        Ok(office)
    }

    #[instrument(skip(self, principal, patch), fields(user_id = %principal.user_id, office_id = %id), err)]
    pub async fn update_office(
        &self,
        principal: &Principal,
        id: OfficeId,
        patch: OfficePatch,
        now: DateTime<Utc>,
    ) -> ServiceResult<Office> {
        let mut office = self.managed_office(principal, id).await?;
        let before = office.name.clone();
        if let Some(name) = patch.name.as_deref() {
            office.rename(name)?;
        }
        let audit = AuditLogEntry::new(principal, AuditAction::OfficeUpdated, TargetKind::Office, id, now)
            .with_diff(json!({ "name": { "from": before, "to": office.name } }));
        self.commit(ChangeSet::new(audit).put_office(office.clone()))
            .await?;
        Ok(office)
    }

    /// Fails with a conflict while staff are still assigned to the office.
    #[instrument(skip(self, principal), fields(user_id = %principal.user_id, office_id = %id), err)]
    pub async fn delete_office(&self, principal: &Principal, id: OfficeId, now: DateTime<Utc>) -> ServiceResult<()> {
        let office = self.managed_office(principal, id).await?;
        let audit = AuditLogEntry::new(principal, AuditAction::OfficeDeleted, TargetKind::Office, id, now)
            .with_diff(json!({ "name": office.name, "formation_id": office.formation_id }));
        self.commit(ChangeSet::new(audit).delete_office(id)).await?;
        Ok(())
    }

    fn office_visible(principal: &Principal, office: &Office, own_office: Option<OfficeId>) -> bool {
        principal.covers_office(office.id, office.formation_id) || own_office == Some(office.id)
    }

    /// A staff user's current office, if any.
    async fn own_office(&self, principal: &Principal) -> ServiceResult<Option<OfficeId>> {
        Ok(match principal.own_staff_id() {
            Some(id) => self.store.get_staff(id).await?.and_then(|s| s.office_id),
            None => None,
        })
    }

    pub async fn get_office(&self, principal: &Principal, id: OfficeId) -> ServiceResult<Office> {
        let office = self.load_office(id).await?;
        let own = self.own_office(principal).await?;
        if !Self::office_visible(principal, &office, own) {
            return Err(missing::<Office>(id));
        }
        Ok(office)
    }

    pub async fn list_offices(
        &self,
        principal: &Principal,
        formation_id: Option<FormationId>,
    ) -> ServiceResult<Vec<Office>> {
        let rows = self.store.list_offices(formation_id).await?;
        let own = self.own_office(principal).await?;
        Ok(rows
            .into_iter()
            .filter(|o| Self::office_visible(principal, o, own))
            .collect())
    }
}
