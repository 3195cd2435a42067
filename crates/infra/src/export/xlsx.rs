use rust_xlsxwriter::{Color, Format, FormatAlign, Workbook, XlsxError};

use super::{ExportError, ExportFormat, Report, ReportRenderer};

const FONT: &str = "Liberation Sans";

fn render_error(err: XlsxError) -> ExportError {
    ExportError::render(ExportFormat::Xlsx, err)
}

/// Single-sheet workbook: optional office heading, global heading, grey
/// header row, banded body rows and a "Generated on" page footer.
#[derive(Debug, Clone, Copy, Default)]
pub struct XlsxRenderer;

impl ReportRenderer for XlsxRenderer {
    fn render(&self, report: &Report) -> Result<Vec<u8>, ExportError> {
        let headers = report.headers();
        let last_col = (headers.len() - 1) as u16;

        let office_heading = Format::new()
            .set_font_name(FONT)
            .set_bold()
            .set_font_size(14)
            .set_align(FormatAlign::Center);
        let heading = Format::new()
            .set_font_name(FONT)
            .set_bold()
            .set_font_size(11)
            .set_align(FormatAlign::Center);
        let header = Format::new()
            .set_font_name(FONT)
            .set_bold()
            .set_background_color(Color::RGB(0xCCCCCC));
        let odd = Format::new()
            .set_font_name(FONT)
            .set_background_color(Color::White)
            .set_align(FormatAlign::Left);
        let even = Format::new()
            .set_font_name(FONT)
            .set_background_color(Color::RGB(0xD9D9D9))
            .set_align(FormatAlign::Left);

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name("Staff List").map_err(render_error)?;
        sheet
            .set_footer(&format!("&L{}", report.footer()))
            .set_column_width(0, 6)
            .map_err(render_error)?;
        for (i, column) in report.columns.iter().enumerate() {
            sheet
                .set_column_width(i as u16 + 1, column.width())
                .map_err(render_error)?;
        }

        let mut row: u32 = 0;
        if let Some(office) = &report.office_heading {
            sheet
                .merge_range(row, 0, row, last_col, office, &office_heading)
                .map_err(render_error)?;
            row += 1;
        }
        sheet
            .merge_range(row, 0, row, last_col, &report.heading, &heading)
            .map_err(render_error)?;
        row += 1;

        for (col, title) in headers.iter().enumerate() {
            sheet
                .write_string_with_format(row, col as u16, *title, &header)
                .map_err(render_error)?;
        }
        row += 1;

        for entry in &report.rows {
            let band = if entry.serial % 2 == 1 { &odd } else { &even };
            sheet
                .write_number_with_format(row, 0, entry.serial as f64, band)
                .map_err(render_error)?;
            for (col, value) in entry.cells.iter().enumerate() {
                sheet
                    .write_string_with_format(row, col as u16 + 1, value, band)
                    .map_err(render_error)?;
            }
            row += 1;
        }

        workbook.save_to_buffer().map_err(render_error)
    }
}
