use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use nominalroll_auth::{Principal, Scope, require};
use nominalroll_core::{DomainError, FormationId, OfficeId};
use nominalroll_personnel::{Formation, NewStaff, Office};

use super::{PersonnelService, ServiceError, ServiceResult, forbidden, missing};
use crate::export::ExportedFile;
use crate::import::{self, ImportColumn, SheetRow};
use crate::store::StoreError;

/// Where imported rows land when they do not name an office.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ImportTarget {
    #[serde(default)]
    pub formation_id: Option<FormationId>,
    #[serde(default)]
    pub office_id: Option<OfficeId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    pub row: u32,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub created: usize,
    /// Rows without a service number.
    pub skipped: usize,
    pub errors: Vec<RowError>,
}

/// Failures that stop the whole import rather than one row.
fn aborts(err: &ServiceError) -> bool {
    matches!(
        err,
        ServiceError::Store(StoreError::Backend(_)) | ServiceError::Export(_)
    )
}

impl PersonnelService {
    pub fn import_template(&self) -> ServiceResult<ExportedFile> {
        Ok(import::template()?)
    }

    /// Create one staff record per sheet row. Each row goes through
    /// `create_staff` on its own, so a bad row is reported and the rest
    /// still land.
    #[instrument(skip(self, principal, bytes), fields(user_id = %principal.user_id, size = bytes.len()), err)]
    pub async fn import_staff(
        &self,
        principal: &Principal,
        bytes: &[u8],
        target: ImportTarget,
        now: DateTime<Utc>,
    ) -> ServiceResult<ImportReport> {
        require(principal.capabilities().create_staff, "import staff")?;
        let rows = import::read_sheet(bytes).map_err(|e| DomainError::validation(e.to_string()))?;
        let (formation, default_office) = self.import_placement(principal, target).await?;
        let offices = self.store.list_offices(Some(formation.id)).await?;

        let mut report = ImportReport::default();
        for row in rows {
            if row.get(ImportColumn::NisNo).is_none() {
                report.skipped += 1;
                continue;
            }
            let outcome = match row_input(&row, &formation, default_office, &offices) {
                Ok(input) => self.create_staff(principal, input, now).await.map(drop),
                Err(message) => Err(DomainError::validation(message).into()),
            };
            match outcome {
                Ok(()) => report.created += 1,
                Err(e) if aborts(&e) => return Err(e),
                Err(e) => report.errors.push(RowError { row: row.line, message: e.to_string() }),
            }
        }

        tracing::info!(
            formation_id = %formation.id,
            created = report.created,
            skipped = report.skipped,
            failed = report.errors.len(),
            "staff import finished"
        );
        Ok(report)
    }

    /// Formation (and optional default office) the import writes into. Falls
    /// back to the caller's own office or formation.
    async fn import_placement(
        &self,
        principal: &Principal,
        target: ImportTarget,
    ) -> ServiceResult<(Formation, Option<OfficeId>)> {
        let office_id = target.office_id.or(match principal.scope {
            Scope::Office(own) => Some(own),
            _ => None,
        });
        let office = match office_id {
            Some(id) => Some(self.store.get_office(id).await?.ok_or_else(|| missing::<Office>(id))?),
            None => None,
        };

        let formation_id = target
            .formation_id
            .or(office.as_ref().map(|o| o.formation_id))
            .or(match principal.scope {
                Scope::Formation(own) => Some(own),
                _ => None,
            })
            .ok_or_else(|| DomainError::validation("choose a formation to import into"))?;
        if let Some(office) = &office {
            if office.formation_id != formation_id {
                return Err(DomainError::validation(format!(
                    "office '{}' does not belong to the given formation",
                    office.name
                ))
                .into());
            }
        }
        let formation = self
            .store
            .get_formation(formation_id)
            .await?
            .ok_or_else(|| missing::<Formation>(formation_id))?;

        let covered = match &office {
            Some(office) => principal.covers_office(office.id, formation.id),
            None => principal.covers_formation(formation.id),
        };
        if !covered {
            return Err(forbidden("import target is outside your scope"));
        }
        Ok((formation, office.map(|o| o.id)))
    }
}

fn row_input(
    row: &SheetRow,
    formation: &Formation,
    default_office: Option<OfficeId>,
    offices: &[Office],
) -> Result<NewStaff, String> {
    let office_id = match row.get(ImportColumn::Office) {
        Some(name) => Some(
            offices
                .iter()
                .find(|o| o.same_name(name))
                .map(|o| o.id)
                .ok_or_else(|| format!("no office named '{name}' in {}", formation.name))?,
        ),
        None => default_office,
    };

    let mut fields = row.staff_fields();
    fields.insert("formation_id".into(), serde_json::to_value(formation.id).map_err(|e| e.to_string())?);
    if let Some(office_id) = office_id {
        fields.insert("office_id".into(), serde_json::to_value(office_id).map_err(|e| e.to_string())?);
    }
    serde_json::from_value(Value::Object(fields)).map_err(|e| e.to_string())
}
