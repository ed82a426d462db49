use rust_xlsxwriter::XlsxError;
use thiserror::Error;

use crate::analysis::AnalysisError;
use crate::storage::StorageError;

/// Everything that can stop one document short of Relocated.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Analysis failed: {0}")]
    AnalysisFailure(#[from] AnalysisError),

    #[error("Field '{field}' has no confidence score")]
    MissingConfidence { field: String },

    #[error("Field '{field}' has confidence {value} outside [0, 1]")]
    InvalidConfidence { field: String, value: f64 },

    #[error("Report has no rows")]
    EmptyReport,

    #[error("Report rendering failed: {0}")]
    Render(#[from] XlsxError),

    #[error("Storage failure: {0}")]
    StorageFailure(#[from] StorageError),
}

impl PipelineError {
    pub fn is_no_document(&self) -> bool {
        matches!(
            self,
            PipelineError::AnalysisFailure(AnalysisError::NoDocumentDetected)
        )
    }
}
