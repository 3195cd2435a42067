use super::ExportFormat;

/// A column that can appear on an exported nominal roll.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ExportColumn {
    NisNo,
    Surname,
    OtherNames,
    Rank,
    Gender,
    Formation,
    Office,
    State,
    Lga,
    Phone,
    Qualification,
    Dob,
    Dofa,
    Dopa,
    Dopp,
    ExitDate,
    Status,
    HomeTown,
    NextOfKin,
    NokPhone,
    Remark,
}

/// Used when a selection names no known column.
pub const FALLBACK_COLUMNS: [ExportColumn; 4] = [
    ExportColumn::NisNo,
    ExportColumn::Surname,
    ExportColumn::OtherNames,
    ExportColumn::Rank,
];

pub const XLSX_DEFAULT_COLUMNS: [ExportColumn; 16] = [
    ExportColumn::NisNo,
    ExportColumn::Surname,
    ExportColumn::OtherNames,
    ExportColumn::Rank,
    ExportColumn::Gender,
    ExportColumn::Office,
    ExportColumn::State,
    ExportColumn::Lga,
    ExportColumn::Phone,
    ExportColumn::Qualification,
    ExportColumn::Dob,
    ExportColumn::Dofa,
    ExportColumn::Dopa,
    ExportColumn::Dopp,
    ExportColumn::ExitDate,
    ExportColumn::Status,
];

/// Narrow enough to fit a landscape page.
pub const PDF_DEFAULT_COLUMNS: [ExportColumn; 9] = [
    ExportColumn::NisNo,
    ExportColumn::Surname,
    ExportColumn::OtherNames,
    ExportColumn::Rank,
    ExportColumn::Dopa,
    ExportColumn::Gender,
    ExportColumn::Office,
    ExportColumn::State,
    ExportColumn::Phone,
];

impl ExportColumn {
    pub const ALL: [ExportColumn; 21] = [
        ExportColumn::NisNo,
        ExportColumn::Surname,
        ExportColumn::OtherNames,
        ExportColumn::Rank,
        ExportColumn::Gender,
        ExportColumn::Formation,
        ExportColumn::Office,
        ExportColumn::State,
        ExportColumn::Lga,
        ExportColumn::Phone,
        ExportColumn::Qualification,
        ExportColumn::Dob,
        ExportColumn::Dofa,
        ExportColumn::Dopa,
        ExportColumn::Dopp,
        ExportColumn::ExitDate,
        ExportColumn::Status,
        ExportColumn::HomeTown,
        ExportColumn::NextOfKin,
        ExportColumn::NokPhone,
        ExportColumn::Remark,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            ExportColumn::NisNo => "nis_no",
            ExportColumn::Surname => "surname",
            ExportColumn::OtherNames => "other_names",
            ExportColumn::Rank => "rank",
            ExportColumn::Gender => "gender",
            ExportColumn::Formation => "formation",
            ExportColumn::Office => "office",
            ExportColumn::State => "state",
            ExportColumn::Lga => "lga",
            ExportColumn::Phone => "phone",
            ExportColumn::Qualification => "qualification",
            ExportColumn::Dob => "dob",
            ExportColumn::Dofa => "dofa",
            ExportColumn::Dopa => "dopa",
            ExportColumn::Dopp => "dopp",
            ExportColumn::ExitDate => "exit_date",
            ExportColumn::Status => "status",
            ExportColumn::HomeTown => "home_town",
            ExportColumn::NextOfKin => "next_of_kin",
            ExportColumn::NokPhone => "nok_phone",
            ExportColumn::Remark => "remark",
        }
    }

    pub fn header(&self) -> &'static str {
        match self {
            ExportColumn::NisNo => "NIS/No",
            ExportColumn::Surname => "Surname",
            ExportColumn::OtherNames => "Other Names",
            ExportColumn::Rank => "Rank",
            ExportColumn::Gender => "Gender",
            ExportColumn::Formation => "Formation",
            ExportColumn::Office => "Office",
            ExportColumn::State => "State",
            ExportColumn::Lga => "LGA",
            ExportColumn::Phone => "Phone",
            ExportColumn::Qualification => "Qualification",
            ExportColumn::Dob => "Date of Birth",
            ExportColumn::Dofa => "DOFA",
            ExportColumn::Dopa => "DOPA",
            ExportColumn::Dopp => "DOPP",
            ExportColumn::ExitDate => "Exit Date",
            ExportColumn::Status => "Status",
            ExportColumn::HomeTown => "Home Town",
            ExportColumn::NextOfKin => "Next of Kin",
            ExportColumn::NokPhone => "NOK Phone",
            ExportColumn::Remark => "Remark",
        }
    }

    /// Hidden from roles that cannot read restricted staff fields.
    pub fn is_restricted(&self) -> bool {
        matches!(
            self,
            ExportColumn::NisNo
                | ExportColumn::Rank
                | ExportColumn::Dob
                | ExportColumn::Dopa
                | ExportColumn::Dopp
                | ExportColumn::ExitDate
                | ExportColumn::Status
        )
    }

    /// Relative width in characters, shared by both renderers.
    pub(crate) fn width(&self) -> u16 {
        match self {
            ExportColumn::Dob
            | ExportColumn::Dofa
            | ExportColumn::Dopa
            | ExportColumn::Dopp
            | ExportColumn::ExitDate => 11,
            ExportColumn::Rank | ExportColumn::Gender | ExportColumn::Lga => 8,
            ExportColumn::NisNo | ExportColumn::Status | ExportColumn::State => 10,
            ExportColumn::Phone | ExportColumn::NokPhone => 13,
            ExportColumn::Surname | ExportColumn::HomeTown => 14,
            ExportColumn::OtherNames
            | ExportColumn::Formation
            | ExportColumn::Office
            | ExportColumn::Qualification
            | ExportColumn::NextOfKin => 18,
            ExportColumn::Remark => 22,
        }
    }

    /// Accepts the canonical key and `phone_no`.
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().to_ascii_lowercase();
        if key == "phone_no" {
            return Some(ExportColumn::Phone);
        }
        Self::ALL.into_iter().find(|c| c.key() == key)
    }
}

/// Resolve a comma-separated column selection.
///
/// Unknown keys and duplicates are dropped, as are restricted columns when
/// the caller cannot read them. No selection yields the format's defaults; a
/// selection with nothing usable yields the fallback set.
pub fn select_columns(requested: Option<&str>, format: ExportFormat, read_restricted: bool) -> Vec<ExportColumn> {
    let readable = |c: &ExportColumn| read_restricted || !c.is_restricted();

    let Some(requested) = requested.filter(|r| !r.trim().is_empty()) else {
        return format
            .default_columns()
            .iter()
            .copied()
            .filter(readable)
            .collect();
    };

    let mut chosen: Vec<ExportColumn> = Vec::new();
    for column in requested.split(',').filter_map(ExportColumn::from_key) {
        if readable(&column) && !chosen.contains(&column) {
            chosen.push(column);
        }
    }
    if chosen.is_empty() {
        chosen = FALLBACK_COLUMNS.into_iter().filter(readable).collect();
    }
    chosen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_selection_uses_format_defaults() {
        assert_eq!(select_columns(None, ExportFormat::Pdf, true), PDF_DEFAULT_COLUMNS.to_vec());
        assert_eq!(select_columns(Some("  "), ExportFormat::Xlsx, true), XLSX_DEFAULT_COLUMNS.to_vec());
    }

    #[test]
    fn unknown_keys_are_ignored_and_order_is_kept() {
        let cols = select_columns(Some("rank,bogus,surname,phone_no,rank"), ExportFormat::Xlsx, true);
        assert_eq!(cols, vec![ExportColumn::Rank, ExportColumn::Surname, ExportColumn::Phone]);
    }

    #[test]
    fn nothing_usable_falls_back() {
        assert_eq!(select_columns(Some("bogus,nope"), ExportFormat::Pdf, true), FALLBACK_COLUMNS.to_vec());
    }

    #[test]
    fn restricted_columns_are_dropped_for_staff() {
        let cols = select_columns(Some("nis_no,rank,surname,dob"), ExportFormat::Xlsx, false);
        assert_eq!(cols, vec![ExportColumn::Surname]);

        let fallback = select_columns(Some("rank"), ExportFormat::Pdf, false);
        assert_eq!(fallback, vec![ExportColumn::Surname, ExportColumn::OtherNames]);

        assert!(select_columns(None, ExportFormat::Xlsx, false).iter().all(|c| !c.is_restricted()));
    }

    #[test]
    fn every_key_resolves_to_itself() {
        for column in ExportColumn::ALL {
            assert_eq!(ExportColumn::from_key(column.key()), Some(column));
        }
    }
}
