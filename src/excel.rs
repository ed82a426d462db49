use rust_xlsxwriter::{
    ConditionalFormatCell, ConditionalFormatCellRule, ConditionalFormatFormula, Format,
    FormatAlign, Workbook, Worksheet, XlsxError,
};

use crate::confidence::{thresholds, ConfidenceBand};
use crate::error::PipelineError;
use crate::types::{DocumentReport, FieldValue};

/// Header text for the three report columns, in order.
pub const REPORT_HEADERS: [&str; 3] = ["Field", "Text Entered", "Confidence"];

#[derive(Debug, Clone)]
pub struct ReportOptions {
    pub sheet_name: String,
    /// Leading 0-based row index column with a blank header, the layout a dataframe export produces.
    pub index_column: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            sheet_name: "Sheet1".to_string(),
            index_column: false,
        }
    }
}

impl ReportOptions {
    fn first_data_col(&self) -> u16 {
        if self.index_column {
            1
        } else {
            0
        }
    }

    /// 0-based column holding the confidence values.
    pub fn confidence_col(&self) -> u16 {
        self.first_data_col() + 2
    }
}

/// Column index to Excel letter (0→A, 1→B, 25→Z, 26→AA).
fn col_index_to_letter(index: u16) -> String {
    let mut n = index as u32;
    let mut s = String::new();
    loop {
        let r = (n % 26) as u8;
        s.insert(0, (b'A' + r) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    s
}

/// Drop characters that are invalid in sheet XML (keeps tab, newline, CR).
fn sanitize_cell(s: &str) -> String {
    s.chars()
        .filter(|&c| {
            let u = c as u32;
            c == '\t' || c == '\n' || c == '\r' || !(u < 0x20 || u == 0x7F || u == 0xFFFE || u == 0xFFFF)
        })
        .collect()
}

/// Estimate column width from text length (char count × 1.2, clamped 10–50).
fn estimate_text_width(text: &str) -> f64 {
    let w = text.chars().count() as f64 * 1.2;
    w.clamp(10.0, 50.0)
}

fn column_widths(report: &DocumentReport) -> [f64; 3] {
    let mut widths = REPORT_HEADERS.map(estimate_text_width);
    for row in &report.rows {
        widths[0] = widths[0].max(estimate_text_width(&row.name));
        widths[1] = widths[1].max(estimate_text_width(&row.entered_text.to_string()));
    }
    widths
}

fn write_value(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    value: &FieldValue,
    text_format: &Format,
) -> Result<(), XlsxError> {
    match value {
        FieldValue::Text(s) => worksheet
            .write_string_with_format(row, col, sanitize_cell(s), text_format)
            .map(|_| ()),
        FieldValue::Number(n) => worksheet.write_number(row, col, *n).map(|_| ()),
        FieldValue::Boolean(b) => worksheet.write_boolean(row, col, *b).map(|_| ()),
        FieldValue::Empty => Ok(()),
    }
}

fn band_format(band: ConfidenceBand) -> Format {
    Format::new()
        .set_background_color(band.fill())
        .set_font_color(band.font())
}

/// Three disjoint rules over rows 1..=last_row of the confidence column.
fn add_confidence_rules(
    worksheet: &mut Worksheet,
    last_row: u32,
    col: u16,
) -> Result<(), XlsxError> {
    let low = ConditionalFormatCell::new()
        .set_rule(ConditionalFormatCellRule::LessThanOrEqualTo(thresholds::LOW_MAX))
        .set_format(band_format(ConfidenceBand::Low));
    worksheet.add_conditional_format(1, col, last_row, col, &low)?;

    // Excel's "between" is inclusive on both ends, so the open interval needs a formula.
    let cell = format!("${}2", col_index_to_letter(col));
    let rule = format!(
        "=AND({cell}>{},{cell}<{})",
        thresholds::LOW_MAX,
        thresholds::HIGH_MIN
    );
    let medium = ConditionalFormatFormula::new()
        .set_rule(rule.as_str())
        .set_format(band_format(ConfidenceBand::Medium));
    worksheet.add_conditional_format(1, col, last_row, col, &medium)?;

    let high = ConditionalFormatCell::new()
        .set_rule(ConditionalFormatCellRule::GreaterThanOrEqualTo(thresholds::HIGH_MIN))
        .set_format(band_format(ConfidenceBand::High));
    worksheet.add_conditional_format(1, col, last_row, col, &high)?;
    Ok(())
}

/// Render the report into an in-memory xlsx workbook.
pub fn build_report(
    report: &DocumentReport,
    options: &ReportOptions,
) -> Result<Vec<u8>, PipelineError> {
    if report.is_empty() {
        return Err(PipelineError::EmptyReport);
    }

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(&options.sheet_name)?;

    let header_format = Format::new().set_bold().set_align(FormatAlign::Center);
    let text_format = Format::new().set_text_wrap();
    let first = options.first_data_col();

    if options.index_column {
        worksheet.write_string_with_format(0, 0, "", &header_format)?;
    }
    for (i, header) in REPORT_HEADERS.iter().enumerate() {
        worksheet.write_string_with_format(0, first + i as u16, *header, &header_format)?;
    }
    for (i, width) in column_widths(report).iter().enumerate() {
        worksheet.set_column_width(first + i as u16, *width)?;
    }

    for (idx, field) in report.rows.iter().enumerate() {
        let row = (idx + 1) as u32;
        if options.index_column {
            worksheet.write_number_with_format(row, 0, idx as f64, &header_format)?;
        }
        worksheet.write_string_with_format(row, first, sanitize_cell(&field.name), &text_format)?;
        write_value(worksheet, row, first + 1, &field.entered_text, &text_format)?;
        worksheet.write_number(row, options.confidence_col(), field.confidence)?;
    }

    add_confidence_rules(worksheet, report.len() as u32, options.confidence_col())?;
    worksheet.set_freeze_panes(1, 0)?;

    let buffer = workbook.save_to_buffer()?;
    tracing::debug!(rows = report.len(), bytes = buffer.len(), "Rendered report workbook");
    Ok(buffer)
}

/// Band each row will be painted with, in row order.
pub fn classify_rendered(report: &DocumentReport) -> Vec<ConfidenceBand> {
    report
        .rows
        .iter()
        .map(|r| ConfidenceBand::classify(r.confidence))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExtractedField;
    use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
    use std::io::{Cursor, Read};

    fn sample() -> DocumentReport {
        DocumentReport {
            rows: vec![
                ExtractedField {
                    name: "Name".into(),
                    entered_text: FieldValue::text("Alice"),
                    confidence: 0.95,
                },
                ExtractedField {
                    name: "Amount".into(),
                    entered_text: FieldValue::Number(100.0),
                    confidence: 0.75,
                },
                ExtractedField {
                    name: "Date".into(),
                    entered_text: FieldValue::text("2023-04-01"),
                    confidence: 0.85,
                },
            ],
        }
    }

    fn sheet_xml(bytes: &[u8]) -> String {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut entry = archive.by_name("xl/worksheets/sheet1.xml").unwrap();
        let mut xml = String::new();
        entry.read_to_string(&mut xml).unwrap();
        xml
    }

    #[test]
    fn empty_report_is_refused() {
        let err = build_report(&DocumentReport::default(), &ReportOptions::default()).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyReport));
    }

    #[test]
    fn cells_read_back_in_order() {
        let bytes = build_report(&sample(), &ReportOptions::default()).unwrap();
        let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes)).unwrap();
        let range = workbook.worksheet_range("Sheet1").unwrap();

        assert_eq!(range.height(), 4);
        assert_eq!(range.get_value((0, 0)), Some(&Data::String("Field".into())));
        assert_eq!(range.get_value((0, 1)), Some(&Data::String("Text Entered".into())));
        assert_eq!(range.get_value((0, 2)), Some(&Data::String("Confidence".into())));
        assert_eq!(range.get_value((1, 0)), Some(&Data::String("Name".into())));
        assert_eq!(range.get_value((1, 1)), Some(&Data::String("Alice".into())));
        assert_eq!(range.get_value((1, 2)), Some(&Data::Float(0.95)));
        assert_eq!(range.get_value((2, 1)), Some(&Data::Float(100.0)));
        assert_eq!(range.get_value((3, 2)), Some(&Data::Float(0.85)));
    }

    #[test]
    fn three_rules_cover_confidence_rows() {
        let bytes = build_report(&sample(), &ReportOptions::default()).unwrap();
        let xml = sheet_xml(&bytes);
        assert!(xml.contains("sqref=\"C2:C4\""));
        assert_eq!(xml.matches("<cfRule").count(), 3);
        assert!(xml.contains("operator=\"lessThanOrEqual\""));
        assert!(xml.contains("operator=\"greaterThanOrEqual\""));
        assert!(xml.contains("AND($C2&gt;0.8,$C2&lt;0.9)"));
        assert!(!xml.contains("operator=\"between\""));
    }

    #[test]
    fn index_column_shifts_confidence_to_d() {
        let options = ReportOptions {
            index_column: true,
            ..ReportOptions::default()
        };
        assert_eq!(options.confidence_col(), 3);
        let bytes = build_report(&sample(), &options).unwrap();
        let xml = sheet_xml(&bytes);
        assert!(xml.contains("sqref=\"D2:D4\""));

        let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes)).unwrap();
        let range = workbook.worksheet_range("Sheet1").unwrap();
        assert_eq!(range.get_value((1, 0)), Some(&Data::Float(0.0)));
        assert_eq!(range.get_value((3, 0)), Some(&Data::Float(2.0)));
        assert_eq!(range.get_value((0, 1)), Some(&Data::String("Field".into())));
        assert_eq!(range.get_value((2, 3)), Some(&Data::Float(0.75)));
    }

    #[test]
    fn rendering_is_repeatable() {
        let report = sample();
        let a = build_report(&report, &ReportOptions::default()).unwrap();
        let b = build_report(&report, &ReportOptions::default()).unwrap();
        assert_eq!(sheet_xml(&a), sheet_xml(&b));
        assert_eq!(classify_rendered(&report), classify_rendered(&report));
    }

    #[test]
    fn classification_per_row() {
        assert_eq!(
            classify_rendered(&sample()),
            vec![ConfidenceBand::High, ConfidenceBand::Low, ConfidenceBand::Medium]
        );
    }

    #[test]
    fn control_characters_are_dropped() {
        assert_eq!(sanitize_cell("a\u{0}b\u{7}c\nd"), "abc\nd");
    }

    #[test]
    fn column_letters() {
        assert_eq!(col_index_to_letter(0), "A");
        assert_eq!(col_index_to_letter(3), "D");
        assert_eq!(col_index_to_letter(26), "AA");
    }
}
