//! Bulk staff import from a spreadsheet, and the blank template for it.
//!
//! The first worksheet is read; row 1 holds column titles, matched loosely
//! ("NIS/No", "nis_no" and "NIS" all name the service number). Columns with
//! unknown titles are ignored.

use std::collections::HashMap;
use std::io::Cursor;

use calamine::{Data, Reader, Xlsx, XlsxError, open_workbook_from_rs};
use rust_xlsxwriter::{Color, Format, Workbook};
use serde_json::{Map, Value};

use crate::export::{ExportError, ExportFormat, ExportedFile};

pub const TEMPLATE_FILENAME: &str = "staff_import_template.xlsx";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportColumn {
    NisNo,
    Surname,
    OtherNames,
    Rank,
    Gender,
    StateOfOrigin,
    Lga,
    Office,
    Phone,
    Qualification,
    HomeTown,
    NextOfKin,
    NokPhone,
    Remark,
    Dofa,
    Dopa,
    Dopp,
    Dob,
}

impl ImportColumn {
    /// Template order.
    pub const ALL: [ImportColumn; 18] = [
        ImportColumn::NisNo,
        ImportColumn::Surname,
        ImportColumn::OtherNames,
        ImportColumn::Rank,
        ImportColumn::Gender,
        ImportColumn::StateOfOrigin,
        ImportColumn::Lga,
        ImportColumn::Office,
        ImportColumn::Phone,
        ImportColumn::Qualification,
        ImportColumn::HomeTown,
        ImportColumn::NextOfKin,
        ImportColumn::NokPhone,
        ImportColumn::Remark,
        ImportColumn::Dofa,
        ImportColumn::Dopa,
        ImportColumn::Dopp,
        ImportColumn::Dob,
    ];

    pub const REQUIRED: [ImportColumn; 4] = [
        ImportColumn::NisNo,
        ImportColumn::Surname,
        ImportColumn::OtherNames,
        ImportColumn::Rank,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            ImportColumn::NisNo => "NIS/No",
            ImportColumn::Surname => "Surname",
            ImportColumn::OtherNames => "Other Names",
            ImportColumn::Rank => "Rank",
            ImportColumn::Gender => "Gender",
            ImportColumn::StateOfOrigin => "State of Origin",
            ImportColumn::Lga => "LGA",
            ImportColumn::Office => "Office",
            ImportColumn::Phone => "Phone No",
            ImportColumn::Qualification => "Qualification",
            ImportColumn::HomeTown => "Home Town",
            ImportColumn::NextOfKin => "Next of Kin",
            ImportColumn::NokPhone => "NOK Phone",
            ImportColumn::Remark => "Remark",
            ImportColumn::Dofa => "DOFA",
            ImportColumn::Dopa => "DOPA",
            ImportColumn::Dopp => "DOPP",
            ImportColumn::Dob => "DOB",
        }
    }

    /// Staff field the column feeds. `Office` is resolved by name instead.
    pub fn field_key(&self) -> Option<&'static str> {
        Some(match self {
            ImportColumn::NisNo => "nis_no",
            ImportColumn::Surname => "surname",
            ImportColumn::OtherNames => "other_names",
            ImportColumn::Rank => "rank",
            ImportColumn::Gender => "gender",
            ImportColumn::StateOfOrigin => "state_of_origin",
            ImportColumn::Lga => "lga",
            ImportColumn::Office => return None,
            ImportColumn::Phone => "phone",
            ImportColumn::Qualification => "qualification",
            ImportColumn::HomeTown => "home_town",
            ImportColumn::NextOfKin => "next_of_kin",
            ImportColumn::NokPhone => "nok_phone",
            ImportColumn::Remark => "remark",
            ImportColumn::Dofa => "dofa",
            ImportColumn::Dopa => "dopa",
            ImportColumn::Dopp => "dopp",
            ImportColumn::Dob => "dob",
        })
    }

    pub fn from_title(raw: &str) -> Option<Self> {
        let folded: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match folded.as_str() {
            "nis" | "nisno" | "serviceno" => Some(ImportColumn::NisNo),
            "phone" | "phoneno" => Some(ImportColumn::Phone),
            "state" | "stateoforigin" => Some(ImportColumn::StateOfOrigin),
            other => ImportColumn::ALL.into_iter().find(|c| {
                c.title()
                    .chars()
                    .filter(|ch| ch.is_ascii_alphanumeric())
                    .map(|ch| ch.to_ascii_lowercase())
                    .eq(other.chars())
            }),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ImportError {
    #[error("not a readable xlsx workbook: {0}")]
    Unreadable(String),

    #[error("workbook has no worksheet with a header row")]
    NoSheet,

    #[error("header row is missing required column(s): {0}")]
    MissingColumns(String),
}

impl From<XlsxError> for ImportError {
    fn from(value: XlsxError) -> Self {
        ImportError::Unreadable(value.to_string())
    }
}

/// One non-empty data row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetRow {
    /// 1-based row number as shown by spreadsheet programs.
    pub line: u32,
    cells: HashMap<ImportColumn, String>,
}

impl SheetRow {
    pub fn get(&self, column: ImportColumn) -> Option<&str> {
        self.cells.get(&column).map(String::as_str)
    }

    /// Staff fields keyed like `NewStaff`, without the placement.
    pub fn staff_fields(&self) -> Map<String, Value> {
        self.cells
            .iter()
            .filter_map(|(column, text)| Some((column.field_key()?.to_string(), Value::String(text.clone()))))
            .collect()
    }
}

fn cell_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        // Numeric service and phone numbers come back as floats.
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.as_datetime()?.date().format("%Y-%m-%d").to_string(),
        Data::Error(_) | Data::Empty => return None,
    };
    (!text.is_empty()).then_some(text)
}

/// Read the data rows of the first worksheet. Blank rows are dropped.
pub fn read_sheet(bytes: &[u8]) -> Result<Vec<SheetRow>, ImportError> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))?;
    let range = workbook.worksheet_range_at(0).ok_or(ImportError::NoSheet)??;
    let first_line = range.start().map_or(0, |(row, _)| row) + 1;

    let mut rows = range.rows();
    let header = rows.next().ok_or(ImportError::NoSheet)?;
    let columns: Vec<Option<ImportColumn>> = header
        .iter()
        .map(|cell| cell_text(cell).and_then(|t| ImportColumn::from_title(&t)))
        .collect();

    let missing: Vec<&str> = ImportColumn::REQUIRED
        .iter()
        .filter(|c| !columns.contains(&Some(**c)))
        .map(|c| c.title())
        .collect();
    if !missing.is_empty() {
        return Err(ImportError::MissingColumns(missing.join(", ")));
    }

    Ok(rows
        .enumerate()
        .filter_map(|(i, row)| {
            let cells: HashMap<_, _> = columns
                .iter()
                .zip(row)
                .filter_map(|(column, cell)| Some(((*column)?, cell_text(cell)?)))
                .collect();
            (!cells.is_empty()).then(|| SheetRow {
                line: first_line + 1 + i as u32,
                cells,
            })
        })
        .collect())
}

const SAMPLE_ROW: [&str; 18] = [
    "12345",
    "Doe",
    "John",
    "ASI 1",
    "Male",
    "Lagos",
    "Ikeja",
    "Visa Counter",
    "08012345678",
    "B.Sc",
    "Ikeja",
    "Jane Doe",
    "08098765432",
    "Sample entry",
    "01/01/2010",
    "01/01/2015",
    "01/01/2020",
    "15/05/1985",
];

/// Header row plus one sample row, every cell written as text.
pub fn template() -> Result<ExportedFile, ExportError> {
    let fail = |e: rust_xlsxwriter::XlsxError| ExportError::render(ExportFormat::Xlsx, e);
    let header = Format::new()
        .set_bold()
        .set_background_color(Color::RGB(0xCCCCCC));

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Staff Import Template").map_err(fail)?;
    for (col, column) in ImportColumn::ALL.iter().enumerate() {
        let col = col as u16;
        sheet.set_column_width(col, 16).map_err(fail)?;
        sheet
            .write_string_with_format(0, col, column.title(), &header)
            .map_err(fail)?;
        sheet.write_string(1, col, SAMPLE_ROW[col as usize]).map_err(fail)?;
    }

    Ok(ExportedFile {
        filename: TEMPLATE_FILENAME.to_string(),
        content_type: ExportFormat::Xlsx.content_type(),
        bytes: workbook.save_to_buffer().map_err(fail)?,
    })
}
