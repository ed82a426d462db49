//! Analysis output → ordered report rows.

use crate::analysis::AnalysisError;
use crate::error::PipelineError;
use crate::types::{AnalyzeResult, DocumentReport, ExtractedField};

/// Build the report rows from the first document of an analysis result.
/// Field order is the service's order; nothing is sorted, dropped or defaulted.
pub fn normalize(result: &AnalyzeResult) -> Result<DocumentReport, PipelineError> {
    let document = result
        .documents
        .first()
        .ok_or(AnalysisError::NoDocumentDetected)?;
    if result.documents.len() > 1 {
        tracing::warn!(
            documents = result.documents.len(),
            "Analysis returned more than one document; only the first is reported"
        );
    }

    let mut rows = Vec::with_capacity(document.fields.len());
    for (name, field) in &document.fields {
        let confidence = field
            .confidence
            .ok_or_else(|| PipelineError::MissingConfidence {
                field: name.clone(),
            })?;
        if !(0.0..=1.0).contains(&confidence) {
            return Err(PipelineError::InvalidConfidence {
                field: name.clone(),
                value: confidence,
            });
        }
        rows.push(ExtractedField {
            name: name.clone(),
            entered_text: field.value.clone(),
            confidence,
        });
    }
    Ok(DocumentReport { rows })
}
