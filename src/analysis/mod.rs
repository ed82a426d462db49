//! Document-analysis capability: submit a document URL to a model, poll until done.

pub mod azure;

pub use azure::AzureDocumentAnalyzer;

use serde_json::Value;
use thiserror::Error;

use crate::types::{AnalyzeResult, AnalyzedDocument, FieldValue, RawField};

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Request to analysis service failed: {0}")]
    Request(String),

    #[error("Analysis service rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Analysis failed: {0}")]
    Failed(String),

    #[error("Analysis did not finish after {attempts} polls")]
    TimedOut { attempts: u32 },

    #[error("Malformed analysis response: {0}")]
    MalformedResponse(String),

    #[error("No document detected in analysis result")]
    NoDocumentDetected,
}

/// Handle to a long-running analysis, returned by `submit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub location: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisStatus {
    Running,
    Succeeded(AnalyzeResult),
    Failed(String),
}

pub trait DocumentAnalyzer: Send + Sync {
    /// Start analysing the document at `document_url` with `model_id`.
    fn submit(&self, model_id: &str, document_url: &str) -> Result<Operation, AnalysisError>;

    /// Check on a submitted analysis.
    fn poll(&self, operation: &Operation) -> Result<AnalysisStatus, AnalysisError>;
}

/// Map an operation status document (`{"status": ..., "analyzeResult": ...}`) to a status.
pub fn parse_operation_status(body: &Value) -> Result<AnalysisStatus, AnalysisError> {
    let status = body.get("status").and_then(|s| s.as_str()).unwrap_or("");
    match status {
        "notStarted" | "running" => Ok(AnalysisStatus::Running),
        "succeeded" => {
            let result = body
                .get("analyzeResult")
                .ok_or_else(|| AnalysisError::MalformedResponse("no analyzeResult".into()))?;
            Ok(AnalysisStatus::Succeeded(parse_analyze_result(result)?))
        }
        "failed" | "canceled" => {
            let message = body
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("Unknown error");
            Ok(AnalysisStatus::Failed(message.to_string()))
        }
        other => Err(AnalysisError::MalformedResponse(format!(
            "unexpected status '{}'",
            other
        ))),
    }
}

/// Parse `analyzeResult.documents[*].fields`, keeping field order.
pub fn parse_analyze_result(result: &Value) -> Result<AnalyzeResult, AnalysisError> {
    let docs = match result.get("documents") {
        None | Some(Value::Null) => return Ok(AnalyzeResult::default()),
        Some(d) => d
            .as_array()
            .ok_or_else(|| AnalysisError::MalformedResponse("documents is not an array".into()))?,
    };

    let mut documents = Vec::with_capacity(docs.len());
    for doc in docs {
        let doc_type = doc
            .get("docType")
            .and_then(|t| t.as_str())
            .unwrap_or("")
            .to_string();
        let fields_obj = match doc.get("fields") {
            None | Some(Value::Null) => None,
            Some(f) => Some(f.as_object().ok_or_else(|| {
                AnalysisError::MalformedResponse("fields is not an object".into())
            })?),
        };
        let fields = fields_obj
            .map(|obj| {
                obj.iter()
                    .map(|(name, field)| {
                        let raw = RawField {
                            value: extract_field_value(field),
                            confidence: field.get("confidence").and_then(|c| c.as_f64()),
                        };
                        (name.clone(), raw)
                    })
                    .collect()
            })
            .unwrap_or_default();
        documents.push(AnalyzedDocument { doc_type, fields });
    }
    Ok(AnalyzeResult { documents })
}

/// Value of one field, preferring the typed `value*` property for its declared type and falling back to raw `content`.
fn extract_field_value(obj: &Value) -> FieldValue {
    if obj.is_null() {
        return FieldValue::Empty;
    }

    fn get_str(obj: &Value, key: &str) -> Option<String> {
        obj.get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.to_string())
    }

    let field_type = obj.get("type").and_then(|t| t.as_str());
    let primary = match field_type {
        Some("string") => get_str(obj, "valueString").map(FieldValue::Text),
        Some("date") => get_str(obj, "valueDate").map(FieldValue::Text),
        Some("time") => get_str(obj, "valueTime").map(FieldValue::Text),
        Some("phoneNumber") => get_str(obj, "valuePhoneNumber").map(FieldValue::Text),
        Some("countryRegion") => get_str(obj, "valueCountryRegion").map(FieldValue::Text),
        Some("selectionMark") => get_str(obj, "valueSelectionMark").map(FieldValue::Text),
        Some("number") => obj
            .get("valueNumber")
            .and_then(|v| v.as_f64())
            .map(FieldValue::Number),
        Some("integer") => obj
            .get("valueInteger")
            .and_then(|v| v.as_f64())
            .map(FieldValue::Number),
        Some("boolean") => obj
            .get("valueBoolean")
            .and_then(|v| v.as_bool())
            .map(FieldValue::Boolean),
        // Structured values (currency, address, arrays, objects) keep the text the service read.
        _ => None,
    };

    primary
        .or_else(|| get_str(obj, "content").map(FieldValue::Text))
        .unwrap_or(FieldValue::Empty)
}
