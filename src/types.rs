use serde::{Deserialize, Serialize};
use std::fmt;

/// Recognized value of one field, kept in the shape the analysis service reported it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Boolean(bool),
    Empty,
}

impl FieldValue {
    pub fn text(s: impl Into<String>) -> Self {
        FieldValue::Text(s.into())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Boolean(b) => write!(f, "{}", b),
            FieldValue::Empty => Ok(()),
        }
    }
}

/// One field as returned by the analysis service, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawField {
    pub value: FieldValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// One document result. `fields` keeps the service's field order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedDocument {
    pub doc_type: String,
    pub fields: Vec<(String, RawField)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeResult {
    pub documents: Vec<AnalyzedDocument>,
}

/// One report row: Field, Text Entered, Confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedField {
    pub name: String,
    pub entered_text: FieldValue,
    pub confidence: f64,
}

/// Rows in the document's canonical field order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentReport {
    pub rows: Vec<ExtractedField>,
}

impl DocumentReport {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    Pending,
    Analyzed,
    Reported,
    Relocated,
    Failed,
}

impl DocumentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentState::Pending => "pending",
            DocumentState::Analyzed => "analyzed",
            DocumentState::Reported => "reported",
            DocumentState::Relocated => "relocated",
            DocumentState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DocumentState::Pending),
            "analyzed" => Some(DocumentState::Analyzed),
            "reported" => Some(DocumentState::Reported),
            "relocated" => Some(DocumentState::Relocated),
            "failed" => Some(DocumentState::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentState::Relocated | DocumentState::Failed)
    }
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A document moving through raw → processed. Only the pipeline mutates it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub name: String,
    pub source_url: String,
    pub report_name: String,
    pub state: DocumentState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DocumentRecord {
    pub fn discovered(name: &str, source_url: String) -> Self {
        Self {
            name: name.to_string(),
            source_url,
            report_name: report_name_for(name),
            state: DocumentState::Pending,
            error: None,
        }
    }

    pub(crate) fn advance(&mut self, next: DocumentState) {
        debug_assert!(!self.state.is_terminal(), "terminal record advanced");
        self.state = next;
    }

    pub(crate) fn fail(&mut self, message: String) {
        self.state = DocumentState::Failed;
        self.error = Some(message);
    }
}

const REPORT_SUFFIX: &str = "_results.xlsx";
const STRIPPED_EXTENSION_CHARS: usize = 4;

/// Report blob name: source name minus its last 4 characters, plus `_results.xlsx`.
pub fn report_name_for(source_name: &str) -> String {
    let keep = source_name
        .chars()
        .count()
        .saturating_sub(STRIPPED_EXTENSION_CHARS);
    let stem: String = source_name.chars().take(keep).collect();
    format!("{}{}", stem, REPORT_SUFFIX)
}

/// Outcome of a bulk pass over the raw tier.
#[derive(Debug, Default, Serialize)]
pub struct ScanSummary {
    pub relocated: Vec<DocumentRecord>,
    pub failed: Vec<DocumentRecord>,
}

impl ScanSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_name_strips_extension_and_appends_suffix() {
        assert_eq!(report_name_for("docket0001.pdf"), "docket0001_results.xlsx");
        assert_eq!(report_name_for("scans/d-17.jpg"), "scans/d-17_results.xlsx");
    }

    #[test]
    fn report_name_always_strips_four_characters() {
        // Not extension-aware: a 5-character extension loses only 4 chars.
        assert_eq!(report_name_for("docket.tiff"), "docket._results.xlsx");
        assert_eq!(report_name_for(".pdf"), "_results.xlsx");
        assert_eq!(report_name_for("ab"), "_results.xlsx");
    }

    #[test]
    fn report_name_counts_characters_not_bytes() {
        assert_eq!(report_name_for("фактура.pdf"), "фактура_results.xlsx");
    }

    #[test]
    fn discovered_record_is_pending() {
        let rec = DocumentRecord::discovered("a.pdf", "https://x/raw/a.pdf".into());
        assert_eq!(rec.state, DocumentState::Pending);
        assert_eq!(rec.report_name, "a_results.xlsx");
        assert!(rec.error.is_none());
    }

    #[test]
    fn state_strings_round_trip() {
        for state in [
            DocumentState::Pending,
            DocumentState::Analyzed,
            DocumentState::Reported,
            DocumentState::Relocated,
            DocumentState::Failed,
        ] {
            assert_eq!(DocumentState::parse(state.as_str()), Some(state));
        }
        assert_eq!(DocumentState::parse("deleted"), None);
    }

    #[test]
    fn field_value_display() {
        assert_eq!(FieldValue::text("Alice").to_string(), "Alice");
        assert_eq!(FieldValue::Number(100.5).to_string(), "100.5");
        assert_eq!(FieldValue::Empty.to_string(), "");
    }
}
