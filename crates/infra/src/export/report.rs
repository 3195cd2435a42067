use std::collections::HashMap;

use chrono::NaiveDate;

use nominalroll_core::{FormationId, OfficeId};
use nominalroll_personnel::{Formation, Office, Staff, format_dmy};

use super::ExportColumn;

/// Formation/office names for rendering location columns.
#[derive(Debug, Clone, Default)]
pub struct OrgNames {
    formations: HashMap<FormationId, String>,
    offices: HashMap<OfficeId, String>,
}

impl OrgNames {
    pub fn new(formations: &[Formation], offices: &[Office]) -> Self {
        Self {
            formations: formations.iter().map(|f| (f.id, f.name.clone())).collect(),
            offices: offices.iter().map(|o| (o.id, o.name.clone())).collect(),
        }
    }

    pub fn office(&self, id: OfficeId) -> Option<&str> {
        self.offices.get(&id).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    /// 1-based position on the roll.
    pub serial: usize,
    pub cells: Vec<String>,
}

/// A format-independent nominal roll, ready for a renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub office_heading: Option<String>,
    pub heading: String,
    pub columns: Vec<ExportColumn>,
    pub rows: Vec<ReportRow>,
    pub generated_on: NaiveDate,
}

fn cell(column: ExportColumn, staff: &Staff, names: &OrgNames) -> String {
    let text = |v: &Option<String>| v.clone().unwrap_or_default();
    let date = |v: Option<NaiveDate>| v.map(format_dmy).unwrap_or_default();
    match column {
        ExportColumn::NisNo => staff.nis_no.clone(),
        ExportColumn::Surname => staff.surname.clone(),
        ExportColumn::OtherNames => staff.other_names.clone(),
        ExportColumn::Rank => staff.rank.code().to_string(),
        ExportColumn::Gender => staff.gender.map(|g| g.label().to_string()).unwrap_or_default(),
        ExportColumn::Formation => names
            .formations
            .get(&staff.formation_id)
            .cloned()
            .unwrap_or_default(),
        ExportColumn::Office => staff
            .office_id
            .and_then(|o| names.office(o))
            .unwrap_or_default()
            .to_string(),
        ExportColumn::State => text(&staff.state_of_origin),
        ExportColumn::Lga => text(&staff.lga),
        ExportColumn::Phone => text(&staff.phone),
        ExportColumn::Qualification => text(&staff.qualification),
        ExportColumn::Dob => date(staff.dob),
        ExportColumn::Dofa => date(staff.dofa),
        ExportColumn::Dopa => date(staff.dopa),
        ExportColumn::Dopp => date(staff.dopp),
        ExportColumn::ExitDate => date(staff.exit_date),
        ExportColumn::Status => staff.status.label().to_string(),
        ExportColumn::HomeTown => text(&staff.home_town),
        ExportColumn::NextOfKin => text(&staff.next_of_kin),
        ExportColumn::NokPhone => text(&staff.nok_phone),
        ExportColumn::Remark => text(&staff.remark),
    }
}

impl Report {
    /// Rows keep the order of `staff` (callers pass nominal-roll order).
    pub fn build(
        heading: impl Into<String>,
        office_heading: Option<String>,
        columns: Vec<ExportColumn>,
        staff: &[Staff],
        names: &OrgNames,
        generated_on: NaiveDate,
    ) -> Self {
        let rows = staff
            .iter()
            .enumerate()
            .map(|(i, s)| ReportRow {
                serial: i + 1,
                cells: columns.iter().map(|c| cell(*c, s, names)).collect(),
            })
            .collect();
        Self {
            office_heading,
            heading: heading.into(),
            columns,
            rows,
            generated_on,
        }
    }

    /// Header row including the leading `S/N` column.
    pub fn headers(&self) -> Vec<&'static str> {
        std::iter::once("S/N")
            .chain(self.columns.iter().map(|c| c.header()))
            .collect()
    }

    pub fn footer(&self) -> String {
        format!("Generated on {}", format_dmy(self.generated_on))
    }
}
