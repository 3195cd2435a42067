//! Nominal-roll export: column selection, a format-neutral [`Report`], and
//! the spreadsheet/PDF renderers.

mod columns;
mod pdf;
pub mod report;
mod xlsx;

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

pub use columns::{ExportColumn, FALLBACK_COLUMNS, PDF_DEFAULT_COLUMNS, XLSX_DEFAULT_COLUMNS, select_columns};
pub use pdf::PdfRenderer;
pub use report::{OrgNames, Report};
pub use xlsx::XlsxRenderer;

/// Printed under the office heading when no other heading is configured.
pub const DEFAULT_HEADING: &str = "Visa/Residency Directorate";

#[derive(Debug, Clone, thiserror::Error)]
pub enum ExportError {
    #[error("failed to render {format} export: {message}")]
    Render { format: ExportFormat, message: String },
}

impl ExportError {
    pub fn render(format: ExportFormat, err: impl fmt::Display) -> Self {
        Self::Render {
            format,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Xlsx,
    Pdf,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Pdf => "pdf",
        }
    }

    pub fn default_columns(&self) -> &'static [ExportColumn] {
        match self {
            ExportFormat::Xlsx => &XLSX_DEFAULT_COLUMNS,
            ExportFormat::Pdf => &PDF_DEFAULT_COLUMNS,
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Xlsx => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            ExportFormat::Pdf => "application/pdf",
        }
    }

    pub fn filename(&self) -> String {
        format!("staff_list.{}", self.as_str())
    }

    pub fn renderer(&self) -> Box<dyn ReportRenderer> {
        match self {
            ExportFormat::Xlsx => Box::new(XlsxRenderer),
            ExportFormat::Pdf => Box::new(PdfRenderer),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xlsx" | "excel" => Ok(ExportFormat::Xlsx),
            "pdf" => Ok(ExportFormat::Pdf),
            other => Err(format!("unsupported export format: {other}")),
        }
    }
}

/// Turns a [`Report`] into file bytes.
pub trait ReportRenderer: Send + Sync {
    fn render(&self, report: &Report) -> Result<Vec<u8>, ExportError>;
}

/// A rendered file ready to hand to a client.
#[derive(Debug, Clone)]
pub struct ExportedFile {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}
