//! Per-document state machine: raw blob → analysis → report → relocation.
//!
//! Pending → Analyzed → Reported → Relocated, or Failed from any step. The
//! source is deleted from the raw container only after the report and the
//! source copy are both stored, so an interrupted or failed run can always
//! be re-driven from Pending.

use std::thread;

use crate::analysis::{AnalysisError, AnalysisStatus, DocumentAnalyzer};
use crate::confidence::ConfidenceBand;
use crate::config::PipelineConfig;
use crate::db::Db;
use crate::error::PipelineError;
use crate::excel::{build_report, classify_rendered};
use crate::normalizer::normalize;
use crate::storage::{BlobStore, StorageError};
use crate::types::{AnalyzeResult, DocumentRecord, DocumentState, ScanSummary};

pub struct Pipeline {
    config: PipelineConfig,
    analyzer: Box<dyn DocumentAnalyzer>,
    store: Box<dyn BlobStore>,
    ledger: Option<Db>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        analyzer: Box<dyn DocumentAnalyzer>,
        store: Box<dyn BlobStore>,
    ) -> Self {
        Self {
            config,
            analyzer,
            store,
            ledger: None,
        }
    }

    /// Record every state transition in `ledger`.
    pub fn with_ledger(mut self, ledger: Db) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub fn ledger(&self) -> Option<&Db> {
        self.ledger.as_ref()
    }

    /// Run one raw-tier document to a terminal state.
    pub fn process(&self, name: &str) -> Result<DocumentRecord, PipelineError> {
        self.run(name).map_err(|(_, e)| e)
    }

    /// Process every document currently in the raw tier, one after another.
    /// A failed document does not stop the pass.
    pub fn scan(&self) -> Result<ScanSummary, PipelineError> {
        let names = self.store.list(&self.config.containers.raw)?;
        tracing::info!(
            container = %self.config.containers.raw,
            documents = names.len(),
            "Scanning raw container"
        );
        let mut summary = ScanSummary::default();
        for name in names {
            match self.run(&name) {
                Ok(record) => summary.relocated.push(record),
                Err((record, _)) => summary.failed.push(record),
            }
        }
        Ok(summary)
    }

    fn run(&self, name: &str) -> Result<DocumentRecord, (DocumentRecord, PipelineError)> {
        let _span = tracing::info_span!("document", name = %name).entered();
        let raw = &self.config.containers.raw;
        let mut record = DocumentRecord::discovered(name, self.store.url(raw, name));
        self.note(&record);

        match self.drive(&mut record) {
            Ok(()) => {
                tracing::info!(report = %record.report_name, "Document relocated");
                Ok(record)
            }
            Err(e) => {
                tracing::error!(state = %record.state, error = %e, "Document failed; left in raw container");
                record.fail(e.to_string());
                self.note(&record);
                Err((record, e))
            }
        }
    }

    fn drive(&self, record: &mut DocumentRecord) -> Result<(), PipelineError> {
        let raw = &self.config.containers.raw;
        let result = self.analyze(&self.store.access_url(raw, &record.name))?;
        record.advance(DocumentState::Analyzed);
        self.note(record);

        let report = normalize(&result)?;
        if let Some(exporter) = report.rows.get(1) {
            tracing::info!(exporter = %exporter.entered_text, fields = report.len(), "Fields extracted");
        }
        let bands = classify_rendered(&report);
        let count = |band: ConfidenceBand| bands.iter().filter(|b| **b == band).count();
        tracing::info!(
            low = count(ConfidenceBand::Low),
            medium = count(ConfidenceBand::Medium),
            high = count(ConfidenceBand::High),
            "Confidence bands"
        );
        let bytes = build_report(&report, &self.config.report)?;
        record.advance(DocumentState::Reported);
        self.note(record);

        self.relocate(record, &bytes)?;
        record.advance(DocumentState::Relocated);
        self.note(record);
        Ok(())
    }

    /// Submit and poll until the analysis reaches a terminal status or the poll budget runs out.
    fn analyze(&self, document_url: &str) -> Result<AnalyzeResult, AnalysisError> {
        let model_id = &self.config.analysis.model_id;
        tracing::info!(model_id = %model_id, "Submitting document for analysis");
        let operation = self.analyzer.submit(model_id, document_url)?;

        for attempt in 1..=self.config.max_polls {
            thread::sleep(self.config.poll_interval);
            match self.analyzer.poll(&operation)? {
                AnalysisStatus::Running => {
                    tracing::debug!(attempt, "Analysis still running");
                }
                AnalysisStatus::Succeeded(result) => {
                    tracing::info!(attempt, documents = result.documents.len(), "Analysis succeeded");
                    return Ok(result);
                }
                AnalysisStatus::Failed(message) => return Err(AnalysisError::Failed(message)),
            }
        }
        tracing::warn!(
            attempts = self.config.max_polls,
            waited_secs = self.config.analysis_timeout().as_secs(),
            "Analysis did not finish in time"
        );
        Err(AnalysisError::TimedOut {
            attempts: self.config.max_polls,
        })
    }

    /// Store the report, archive the source, then delete the source from raw. Deletion stays last.
    fn relocate(&self, record: &DocumentRecord, report: &[u8]) -> Result<(), StorageError> {
        let containers = &self.config.containers;

        self.store
            .put(&containers.report, &record.report_name, report, true)?;
        tracing::info!(container = %containers.report, blob = %record.report_name, "Report uploaded");

        let source = self.store.get(&containers.raw, &record.name)?;
        self.store
            .put(&containers.processed, &record.name, &source, true)?;
        tracing::info!(container = %containers.processed, "Source archived");

        self.store.delete(&containers.raw, &record.name)?;
        tracing::info!(container = %containers.raw, "Source removed from raw container");
        Ok(())
    }

    fn note(&self, record: &DocumentRecord) {
        tracing::debug!(state = %record.state, "State transition");
        if let Some(ledger) = &self.ledger {
            if let Err(e) = ledger.record(record) {
                tracing::warn!(error = %e, state = %record.state, "Could not write ledger entry");
            }
        }
    }
}
