//! PDF rendering for the consultation report, laid out as wrapped text
//! lines over A4 pages with the builtin Helvetica faces.

use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};
use std::io::BufWriter;

use super::markdown::{inline_plain, Block};
use super::{ReportError, ReportSections, DISCLAIMER, NOT_SPECIFIED};
use crate::patient::PatientProfile;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const TOP: f32 = 280.0;
const BOTTOM_MARGIN: f32 = 20.0;
const WRAP_COLUMNS: usize = 90;

pub fn render(
    patient: &PatientProfile,
    sections: &ReportSections,
    blocks: &[Block],
) -> Result<Vec<u8>, ReportError> {
    let (doc, page, layer) = PdfDocument::new(
        "Medical Consultation Report",
        Mm(PAGE_WIDTH),
        Mm(PAGE_HEIGHT),
        "Layer 1",
    );
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| ReportError::Pdf(e.to_string()))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| ReportError::Pdf(e.to_string()))?;

    let mut cursor = Cursor {
        doc: &doc,
        layer: doc.get_page(page).get_layer(layer),
        y: TOP,
    };

    cursor.line("Medical Consultation Report", 16.0, &bold, 0.0);
    cursor.line(
        &format!("Date: {}", chrono::Local::now().date_naive()),
        9.0,
        &font,
        0.0,
    );
    cursor.space(6.0);

    cursor.line("PATIENT INFORMATION", 11.0, &bold, 0.0);
    cursor.line(&format!("Name: {}", patient.nickname), 9.0, &font, 5.0);
    cursor.line(
        &format!("Date of birth: {}", patient.date_of_birth),
        9.0,
        &font,
        5.0,
    );
    cursor.line(&format!("Gender: {}", patient.gender), 9.0, &font, 5.0);
    let chief = if sections.chief_complaint.is_empty() {
        NOT_SPECIFIED
    } else {
        sections.chief_complaint.as_str()
    };
    cursor.wrapped(&format!("Chief complaint: {chief}"), 9.0, &font, 5.0);
    cursor.space(6.0);

    for block in blocks {
        match block {
            Block::Heading { level, text } => {
                let size = match level {
                    1 => 13.0,
                    2 => 11.5,
                    _ => 10.0,
                };
                cursor.space(3.0);
                cursor.wrapped(&inline_plain(text), size, &bold, 0.0);
            }
            Block::ListItem(text) => {
                cursor.wrapped(&format!("· {}", inline_plain(text)), 9.0, &font, 5.0);
            }
            Block::Paragraph(text) => {
                cursor.wrapped(&inline_plain(text), 9.0, &font, 0.0);
                cursor.space(2.0);
            }
        }
    }

    cursor.space(8.0);
    cursor.wrapped(DISCLAIMER, 7.5, &font, 0.0);

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| ReportError::Pdf(e.to_string()))?;
    buf.into_inner()
        .map_err(|e| ReportError::Pdf(e.to_string()))
}

struct Cursor<'a> {
    doc: &'a printpdf::PdfDocumentReference,
    layer: PdfLayerReference,
    y: f32,
}

impl Cursor<'_> {
    fn line(&mut self, text: &str, size: f32, font: &IndirectFontRef, indent: f32) {
        self.break_page_if_needed();
        self.layer
            .use_text(text, size, Mm(20.0 + indent), Mm(self.y), font);
        self.y -= size * 0.5;
    }

    fn wrapped(&mut self, text: &str, size: f32, font: &IndirectFontRef, indent: f32) {
        for line in wrap_text(text, WRAP_COLUMNS) {
            self.line(&line, size, font, indent);
        }
    }

    fn space(&mut self, mm: f32) {
        self.y -= mm;
    }

    fn break_page_if_needed(&mut self) {
        if self.y < BOTTOM_MARGIN {
            let (page, layer) = self
                .doc
                .add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = TOP;
        }
    }
}

fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.len() + word.len() + 1 > max_chars && !current.is_empty() {
            lines.push(current.clone());
            current.clear();
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn patient() -> PatientProfile {
        PatientProfile {
            id: "p-1".to_string(),
            nickname: "Jane".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 1, 1).expect("valid date"),
            gender: "female".to_string(),
            medical_history: None,
            allergies: None,
            current_medications: None,
        }
    }

    fn sections() -> ReportSections {
        ReportSections {
            chief_complaint: "headache".to_string(),
            diagnosis_notes: Vec::new(),
            treatment_notes: Vec::new(),
            follow_up_notes: Vec::new(),
        }
    }

    #[test]
    fn renders_valid_pdf_bytes() {
        let blocks = vec![
            Block::Heading {
                level: 1,
                text: "Report".to_string(),
            },
            Block::Paragraph("All fine.".to_string()),
        ];
        let bytes = render(&patient(), &sections(), &blocks).expect("pdf");
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn long_reports_spill_onto_further_pages() {
        let blocks: Vec<Block> = (0..200)
            .map(|i| Block::Paragraph(format!("Paragraph number {i} with some running text.")))
            .collect();
        let bytes = render(&patient(), &sections(), &blocks).expect("pdf");
        assert!(bytes.starts_with(b"%PDF"));
        assert!(bytes.len() > 2000);
    }

    #[test]
    fn wrap_text_respects_column_limit() {
        let lines = wrap_text("one two three four five", 10);
        assert!(lines.iter().all(|l| l.len() <= 10));
        assert_eq!(lines.join(" "), "one two three four five");
    }
}
