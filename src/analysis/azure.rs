use reqwest::blocking::Client;
use reqwest::Url;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use super::{parse_operation_status, AnalysisError, AnalysisStatus, DocumentAnalyzer, Operation};

/// Azure Document Intelligence REST client (analyze from URL).
pub struct AzureDocumentAnalyzer {
    client: Client,
    endpoint: String,
    key: String,
    api_version: String,
}

impl AzureDocumentAnalyzer {
    pub fn new(
        endpoint: &str,
        key: &str,
        api_version: &str,
        timeout: Duration,
    ) -> Result<Self, AnalysisError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AnalysisError::Request(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            key: key.to_string(),
            api_version: api_version.to_string(),
        })
    }

    fn analyze_url(&self, model_id: &str) -> String {
        format!(
            "{}/documentintelligence/documentModels/{}:analyze?api-version={}",
            self.endpoint, model_id, self.api_version
        )
    }
}

fn local_path(document_url: &str) -> Option<PathBuf> {
    Url::parse(document_url)
        .ok()
        .filter(|u| u.scheme() == "file")
        .and_then(|u| u.to_file_path().ok())
}

fn request_error(e: reqwest::Error) -> AnalysisError {
    let msg = if e.is_connect() || e.is_timeout() {
        format!("could not reach analysis service: {}", e)
    } else {
        format!("network error: {}", e)
    };
    AnalysisError::Request(msg)
}

impl DocumentAnalyzer for AzureDocumentAnalyzer {
    fn submit(&self, model_id: &str, document_url: &str) -> Result<Operation, AnalysisError> {
        tracing::debug!(model_id, "Submitting document for analysis");
        let request = self
            .client
            .post(self.analyze_url(model_id))
            .header("Ocp-Apim-Subscription-Key", &self.key);
        // The service cannot fetch local files, so those are uploaded as the request body.
        let request = match local_path(document_url) {
            Some(path) => {
                let bytes = fs::read(&path).map_err(|e| {
                    AnalysisError::Request(format!("could not read {}: {}", path.display(), e))
                })?;
                request
                    .header("Content-Type", "application/octet-stream")
                    .body(bytes)
            }
            None => request.json(&serde_json::json!({ "urlSource": document_url })),
        };
        let response = request.send().map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AnalysisError::Rejected {
                status: status.as_u16(),
                body: if body.is_empty() {
                    "Invalid key or endpoint?".to_string()
                } else {
                    body
                },
            });
        }

        let location = response
            .headers()
            .get("Operation-Location")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AnalysisError::MalformedResponse("no Operation-Location in response".into())
            })?
            .to_string();
        Ok(Operation { location })
    }

    fn poll(&self, operation: &Operation) -> Result<AnalysisStatus, AnalysisError> {
        let response = self
            .client
            .get(&operation.location)
            .header("Ocp-Apim-Subscription-Key", &self.key)
            .send()
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AnalysisError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        let body: serde_json::Value = response
            .json()
            .map_err(|e| AnalysisError::MalformedResponse(format!("invalid JSON: {}", e)))?;
        parse_operation_status(&body)
    }
}
