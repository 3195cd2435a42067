use chrono::NaiveDate;
use tracing::instrument;

use nominalroll_auth::Principal;
use nominalroll_personnel::StaffFilter;

use super::{PersonnelService, ServiceResult};
use crate::export::{ExportFormat, ExportedFile, OrgNames, Report, select_columns};

impl PersonnelService {
    /// Render the caller's view of the nominal roll.
    ///
    /// Paging is ignored; an export always covers the whole filtered roll.
    #[instrument(skip(self, principal, filter, columns, heading), fields(user_id = %principal.user_id, format = %format, rows = tracing::field::Empty), err)]
    pub async fn export_staff(
        &self,
        principal: &Principal,
        filter: StaffFilter,
        columns: Option<&str>,
        format: ExportFormat,
        heading: &str,
        today: NaiveDate,
    ) -> ServiceResult<ExportedFile> {
        let filter = StaffFilter {
            limit: None,
            offset: None,
            ..filter
        };
        let (staff, office_id) = match filter.scoped(principal) {
            Some(filter) => (self.store.list_staff(&filter).await?, filter.office_id),
            None => (Vec::new(), None),
        };
        tracing::Span::current().record("rows", staff.len());

        let formations = self.store.list_formations().await?;
        let offices = self.store.list_offices(None).await?;
        let names = OrgNames::new(&formations, &offices);
        let office_heading = office_id.and_then(|id| names.office(id)).map(str::to_string);

        let columns = select_columns(columns, format, principal.capabilities().read_restricted);
        let report = Report::build(heading, office_heading, columns, &staff, &names, today);
        let bytes = format.renderer().render(&report)?;

        Ok(ExportedFile {
            filename: format.filename(),
            content_type: format.content_type(),
            bytes,
        })
    }
}
