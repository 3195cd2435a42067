use lopdf::content::{Content, Operation};
use lopdf::{Document, Object, ObjectId, Stream, dictionary};

use super::{ExportError, ExportFormat, Report, ReportRenderer};

// US letter, landscape, in points.
const PAGE_WIDTH: i64 = 792;
const PAGE_HEIGHT: i64 = 612;
const MARGIN: i64 = 36;
const FOOTER_Y: i64 = 36;
const TABLE_BOTTOM: i64 = 56;
const ROW_HEIGHT: i64 = 14;
const SERIAL_WIDTH: u16 = 4;
const HEADER_SIZE: i64 = 8;
const BODY_SIZE: i64 = 7;

fn render_error(err: impl core::fmt::Display) -> ExportError {
    ExportError::render(ExportFormat::Pdf, err)
}

/// Approximate Helvetica advance: half the font size per character.
fn text_width(text: &str, size: i64) -> i64 {
    text.chars().count() as i64 * size / 2
}

/// Cut `text` so it fits `width` points at `size`.
fn fit(text: &str, width: i64, size: i64) -> String {
    let max = ((width - 4) * 2 / size).max(1) as usize;
    text.chars().take(max).collect()
}

fn gray(level: f32) -> Operation {
    Operation::new("g", vec![Object::Real(level)])
}

fn text(font: &str, size: i64, x: i64, y: i64, body: &str) -> Vec<Operation> {
    vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![font.into(), size.into()]),
        Operation::new("Td", vec![x.into(), y.into()]),
        Operation::new("Tj", vec![Object::string_literal(body)]),
        Operation::new("ET", vec![]),
    ]
}

fn centered(font: &str, size: i64, y: i64, body: &str) -> Vec<Operation> {
    let x = ((PAGE_WIDTH - text_width(body, size)) / 2).max(MARGIN);
    text(font, size, x, y, body)
}

fn rect(op: &str, x: i64, y: i64, w: i64, h: i64) -> Vec<Operation> {
    vec![
        Operation::new("re", vec![x.into(), y.into(), w.into(), h.into()]),
        Operation::new(op, vec![]),
    ]
}

/// Column widths in points, scaled to the printable width.
fn column_widths(report: &Report) -> Vec<i64> {
    let weights: Vec<i64> = std::iter::once(SERIAL_WIDTH)
        .chain(report.columns.iter().map(|c| c.width()))
        .map(i64::from)
        .collect();
    let total: i64 = weights.iter().sum();
    let printable = PAGE_WIDTH - 2 * MARGIN;
    weights.iter().map(|w| w * printable / total).collect()
}

#[derive(Clone, Copy)]
struct RowStyle {
    font: &'static str,
    size: i64,
    fill: Option<f32>,
    ink: f32,
}

const HEADER_ROW: RowStyle = RowStyle {
    font: "F2",
    size: HEADER_SIZE,
    fill: Some(0.5),
    ink: 0.96,
};

struct Table<'a> {
    widths: &'a [i64],
}

impl Table<'_> {
    fn row(&self, ops: &mut Vec<Operation>, y: i64, cells: &[String], style: RowStyle) {
        let width: i64 = self.widths.iter().sum();
        if let Some(level) = style.fill {
            ops.push(gray(level));
            ops.extend(rect("f", MARGIN, y, width, ROW_HEIGHT));
        }
        ops.push(gray(style.ink));
        let mut x = MARGIN;
        for (cell, w) in cells.iter().zip(self.widths) {
            ops.extend(text(style.font, style.size, x + 3, y + 4, &fit(cell, *w, style.size)));
            x += w;
        }
        ops.push(gray(0.0));
        ops.push(Operation::new("w", vec![Object::Real(0.5)]));
        let mut x = MARGIN;
        for w in self.widths {
            ops.extend(rect("S", x, y, *w, ROW_HEIGHT));
            x += w;
        }
    }
}

/// Landscape letter pages with the header row repeated on every page.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfRenderer;

impl PdfRenderer {
    fn pages(&self, report: &Report) -> Vec<Vec<Operation>> {
        let widths = column_widths(report);
        let table = Table { widths: &widths };
        let headers: Vec<String> = report.headers().into_iter().map(String::from).collect();
        let footer = report.footer();

        let mut pages = Vec::new();
        let mut ops = Vec::new();
        let mut y = PAGE_HEIGHT - MARGIN;

        if let Some(office) = &report.office_heading {
            y -= 14;
            ops.extend(centered("F2", 14, y, office));
            y -= 6;
        }
        y -= 11;
        ops.extend(centered("F2", 11, y, &report.heading));
        y -= 12 + ROW_HEIGHT;
        table.row(&mut ops, y, &headers, HEADER_ROW);

        for entry in &report.rows {
            if y - ROW_HEIGHT < TABLE_BOTTOM {
                ops.extend(text("F1", 9, MARGIN * 2, FOOTER_Y, &footer));
                pages.push(std::mem::take(&mut ops));
                y = PAGE_HEIGHT - MARGIN - ROW_HEIGHT;
                table.row(&mut ops, y, &headers, HEADER_ROW);
            }
            y -= ROW_HEIGHT;
            let cells: Vec<String> = std::iter::once(entry.serial.to_string())
                .chain(entry.cells.iter().cloned())
                .collect();
            let style = RowStyle {
                font: "F1",
                size: BODY_SIZE,
                fill: (entry.serial % 2 == 0).then_some(0.85),
                ink: 0.0,
            };
            table.row(&mut ops, y, &cells, style);
        }

        ops.extend(text("F1", 9, MARGIN * 2, FOOTER_Y, &footer));
        pages.push(ops);
        pages
    }
}

impl ReportRenderer for PdfRenderer {
    fn render(&self, report: &Report) -> Result<Vec<u8>, ExportError> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let regular = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
        });
        let bold = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica-Bold",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => regular,
                "F2" => bold,
            },
        });

        let mut kids: Vec<Object> = Vec::new();
        for operations in self.pages(report) {
            let content = Content { operations };
            let stream = Stream::new(dictionary! {}, content.encode().map_err(render_error)?);
            let content_id = doc.add_object(stream);
            let page_id: ObjectId = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).map_err(render_error)?;
        Ok(bytes)
    }
}
