//! In-memory doubles for the analysis and storage capabilities.

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::analysis::{AnalysisError, AnalysisStatus, DocumentAnalyzer, Operation};
use crate::config::{AnalysisSettings, Containers, PipelineConfig, StorageBackend};
use crate::excel::ReportOptions;
use crate::storage::{BlobStore, StorageError};
use crate::types::{AnalyzeResult, AnalyzedDocument, FieldValue, RawField};

/// Config with zero poll interval and a three-poll budget.
pub fn config() -> PipelineConfig {
    PipelineConfig {
        storage: StorageBackend::Local {
            root: PathBuf::from("unused"),
        },
        analysis: AnalysisSettings {
            endpoint: "https://analysis.test".into(),
            key: "key".into(),
            model_id: "docket-model".into(),
            api_version: "2024-11-30".into(),
        },
        containers: Containers::default(),
        poll_interval: Duration::ZERO,
        max_polls: 3,
        request_timeout: Duration::from_secs(5),
        report: ReportOptions::default(),
        ledger_path: None,
    }
}

/// One-document result with the given fields, in order.
pub fn fields_result(fields: &[(&str, FieldValue, Option<f64>)]) -> AnalyzeResult {
    AnalyzeResult {
        documents: vec![AnalyzedDocument {
            doc_type: "docket".into(),
            fields: fields
                .iter()
                .map(|(name, value, confidence)| {
                    (
                        name.to_string(),
                        RawField {
                            value: value.clone(),
                            confidence: *confidence,
                        },
                    )
                })
                .collect(),
        }],
    }
}

#[derive(Default)]
struct AnalyzerState {
    reject_status: Option<u16>,
    script: VecDeque<AnalysisStatus>,
    /// Returned once the script is exhausted.
    last: Option<AnalysisStatus>,
    submitted: Vec<String>,
    polls: usize,
}

/// Analyzer that replays a fixed sequence of poll statuses for every submission.
#[derive(Clone, Default)]
pub struct FakeAnalyzer {
    state: Arc<Mutex<AnalyzerState>>,
}

impl FakeAnalyzer {
    fn scripted(running: usize, last: AnalysisStatus) -> Self {
        let analyzer = Self::default();
        {
            let mut state = analyzer.state.lock().unwrap();
            state.script = std::iter::repeat(AnalysisStatus::Running)
                .take(running)
                .collect();
            state.last = Some(last);
        }
        analyzer
    }

    pub fn succeeding_after(running: usize, result: AnalyzeResult) -> Self {
        Self::scripted(running, AnalysisStatus::Succeeded(result))
    }

    pub fn failing(message: &str) -> Self {
        Self::scripted(0, AnalysisStatus::Failed(message.to_string()))
    }

    pub fn never_finishing() -> Self {
        Self::scripted(0, AnalysisStatus::Running)
    }

    pub fn rejecting(status: u16) -> Self {
        let analyzer = Self::default();
        analyzer.state.lock().unwrap().reject_status = Some(status);
        analyzer
    }

    pub fn submitted(&self) -> Vec<String> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn polls(&self) -> usize {
        self.state.lock().unwrap().polls
    }
}

impl DocumentAnalyzer for FakeAnalyzer {
    fn submit(&self, _model_id: &str, document_url: &str) -> Result<Operation, AnalysisError> {
        let mut state = self.state.lock().unwrap();
        if let Some(status) = state.reject_status {
            return Err(AnalysisError::Rejected {
                status,
                body: "Access denied".into(),
            });
        }
        state.submitted.push(document_url.to_string());
        Ok(Operation {
            location: format!("fake://operations/{}", state.submitted.len()),
        })
    }

    fn poll(&self, _operation: &Operation) -> Result<AnalysisStatus, AnalysisError> {
        let mut state = self.state.lock().unwrap();
        state.polls += 1;
        if let Some(status) = state.script.pop_front() {
            return Ok(status);
        }
        Ok(state.last.clone().unwrap_or(AnalysisStatus::Running))
    }
}

/// A storage call as seen by `MemoryBlobStore`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    List(String),
    Get(String, String),
    Put(String, String),
    Delete(String, String),
}

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    log: Mutex<Vec<StoreOp>>,
    fail_on: Mutex<Option<StoreOp>>,
}

impl MemoryBlobStore {
    /// Add a blob without logging an operation.
    pub fn seed(&self, container: &str, name: &str, bytes: &[u8]) {
        self.blobs
            .lock()
            .unwrap()
            .insert((container.to_string(), name.to_string()), bytes.to_vec());
    }

    /// Make the matching call fail until `clear_failure`.
    pub fn fail_on(&self, op: StoreOp) {
        *self.fail_on.lock().unwrap() = Some(op);
    }

    pub fn clear_failure(&self) {
        *self.fail_on.lock().unwrap() = None;
    }

    pub fn operations(&self) -> Vec<StoreOp> {
        self.log.lock().unwrap().clone()
    }

    pub fn blob(&self, container: &str, name: &str) -> Option<Vec<u8>> {
        self.blobs
            .lock()
            .unwrap()
            .get(&(container.to_string(), name.to_string()))
            .cloned()
    }

    pub fn contains(&self, container: &str, name: &str) -> bool {
        self.blob(container, name).is_some()
    }

    pub fn blobs_in(&self, container: &str) -> Vec<String> {
        self.blobs
            .lock()
            .unwrap()
            .keys()
            .filter(|(c, _)| c == container)
            .map(|(_, n)| n.clone())
            .collect()
    }

    fn enter(&self, op: StoreOp) -> Result<(), StorageError> {
        self.log.lock().unwrap().push(op.clone());
        if self.fail_on.lock().unwrap().as_ref() == Some(&op) {
            return Err(StorageError::Status {
                status: 503,
                body: format!("injected failure on {:?}", op),
            });
        }
        Ok(())
    }
}

impl BlobStore for MemoryBlobStore {
    fn list(&self, container: &str) -> Result<Vec<String>, StorageError> {
        self.enter(StoreOp::List(container.to_string()))?;
        Ok(self.blobs_in(container))
    }

    fn url(&self, container: &str, name: &str) -> String {
        format!("mem://{}/{}", container, name)
    }

    fn access_url(&self, container: &str, name: &str) -> String {
        format!("{}?sig=test", self.url(container, name))
    }

    fn get(&self, container: &str, name: &str) -> Result<Vec<u8>, StorageError> {
        self.enter(StoreOp::Get(container.to_string(), name.to_string()))?;
        self.blob(container, name).ok_or_else(|| StorageError::NotFound {
            container: container.to_string(),
            name: name.to_string(),
        })
    }

    fn put(
        &self,
        container: &str,
        name: &str,
        bytes: &[u8],
        overwrite: bool,
    ) -> Result<(), StorageError> {
        self.enter(StoreOp::Put(container.to_string(), name.to_string()))?;
        if !overwrite && self.contains(container, name) {
            return Err(StorageError::AlreadyExists {
                container: container.to_string(),
                name: name.to_string(),
            });
        }
        self.seed(container, name, bytes);
        Ok(())
    }

    fn delete(&self, container: &str, name: &str) -> Result<(), StorageError> {
        self.enter(StoreOp::Delete(container.to_string(), name.to_string()))?;
        self.blobs
            .lock()
            .unwrap()
            .remove(&(container.to_string(), name.to_string()))
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound {
                container: container.to_string(),
                name: name.to_string(),
            })
    }
}

/// Lets a test keep a handle on the store it gave the pipeline.
impl BlobStore for Arc<MemoryBlobStore> {
    fn list(&self, container: &str) -> Result<Vec<String>, StorageError> {
        self.as_ref().list(container)
    }

    fn url(&self, container: &str, name: &str) -> String {
        self.as_ref().url(container, name)
    }

    fn access_url(&self, container: &str, name: &str) -> String {
        self.as_ref().access_url(container, name)
    }

    fn get(&self, container: &str, name: &str) -> Result<Vec<u8>, StorageError> {
        self.as_ref().get(container, name)
    }

    fn put(
        &self,
        container: &str,
        name: &str,
        bytes: &[u8],
        overwrite: bool,
    ) -> Result<(), StorageError> {
        self.as_ref().put(container, name, bytes, overwrite)
    }

    fn delete(&self, container: &str, name: &str) -> Result<(), StorageError> {
        self.as_ref().delete(container, name)
    }
}
