//! Pipeline configuration.
//!
//! Everything the pipeline needs (endpoints, credentials, model, container
//! names, polling bounds) lives in one `PipelineConfig` that is built once and
//! handed to the pipeline. Values come from the environment, after loading a
//! `.env` file from the working directory if one exists:
//!
//! - `DOCKET_STORAGE_BACKEND`: `azure` (default) or `local`
//! - `AZURE_STORAGE_ACCOUNT_URL`, `AZURE_STORAGE_SAS_TOKEN`: blob account (azure backend)
//! - `DOCKET_LOCAL_ROOT`: store root (local backend)
//! - `AZURE_OCR_ENDPOINT`, `AZURE_OCR_KEY`: Document Intelligence resource
//! - `DOCKET_MODEL_ID`, `DOCKET_API_VERSION`: analysis model and API version
//! - `DOCKET_RAW_CONTAINER`, `DOCKET_PROCESSED_CONTAINER`, `DOCKET_REPORT_CONTAINER`
//! - `DOCKET_POLL_INTERVAL_SECS`, `DOCKET_ANALYSIS_TIMEOUT_SECS`, `DOCKET_REQUEST_TIMEOUT_SECS`
//! - `DOCKET_REPORT_INDEX_COLUMN`: `true` for a leading row index column
//! - `DOCKET_LEDGER_PATH`: SQLite ledger file (ledger disabled when unset)

use regex::Regex;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::excel::ReportOptions;
use crate::storage::LocalBlobStore;

const DEFAULT_API_VERSION: &str = "2024-11-30";
const DEFAULT_RAW_CONTAINER: &str = "raw";
const DEFAULT_PROCESSED_CONTAINER: &str = "processed";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;
const DEFAULT_ANALYSIS_TIMEOUT_SECS: u64 = 120;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} not set in environment or .env")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },

    #[error("Invalid container name '{0}' (3-63 lowercase letters, digits and single hyphens)")]
    InvalidContainer(String),
}

#[derive(Clone)]
pub enum StorageBackend {
    Azure {
        account_url: String,
        sas_token: Option<String>,
    },
    Local {
        root: PathBuf,
    },
}

impl fmt::Debug for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Azure {
                account_url,
                sas_token,
            } => f
                .debug_struct("Azure")
                .field("account_url", account_url)
                .field("sas_token", &sas_token.as_ref().map(|_| "<redacted>"))
                .finish(),
            StorageBackend::Local { root } => f.debug_struct("Local").field("root", root).finish(),
        }
    }
}

#[derive(Clone)]
pub struct AnalysisSettings {
    pub endpoint: String,
    pub key: String,
    pub model_id: String,
    pub api_version: String,
}

impl fmt::Debug for AnalysisSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisSettings")
            .field("endpoint", &self.endpoint)
            .field("key", &"<redacted>")
            .field("model_id", &self.model_id)
            .field("api_version", &self.api_version)
            .finish()
    }
}

/// Container names for the three tiers. `report` may equal `processed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Containers {
    pub raw: String,
    pub processed: String,
    pub report: String,
}

impl Default for Containers {
    fn default() -> Self {
        Self {
            raw: DEFAULT_RAW_CONTAINER.to_string(),
            processed: DEFAULT_PROCESSED_CONTAINER.to_string(),
            report: DEFAULT_PROCESSED_CONTAINER.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub storage: StorageBackend,
    pub analysis: AnalysisSettings,
    pub containers: Containers,
    pub poll_interval: Duration,
    /// Polls before an analysis counts as timed out.
    pub max_polls: u32,
    pub request_timeout: Duration,
    pub report: ReportOptions,
    pub ledger_path: Option<PathBuf>,
}

impl PipelineConfig {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));
        let seconds = |key: &'static str, default: u64| -> Result<u64, ConfigError> {
            match get(key) {
                None => Ok(default),
                Some(v) => v
                    .parse::<u64>()
                    .map_err(|_| ConfigError::Invalid { key, value: v }),
            }
        };

        let storage = match get("DOCKET_STORAGE_BACKEND").as_deref() {
            None | Some("azure") => StorageBackend::Azure {
                account_url: require("AZURE_STORAGE_ACCOUNT_URL")?,
                sas_token: get("AZURE_STORAGE_SAS_TOKEN"),
            },
            Some("local") => StorageBackend::Local {
                root: get("DOCKET_LOCAL_ROOT")
                    .map(PathBuf::from)
                    .unwrap_or_else(LocalBlobStore::default_root),
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "DOCKET_STORAGE_BACKEND",
                    value: other.to_string(),
                })
            }
        };

        let analysis = AnalysisSettings {
            endpoint: require("AZURE_OCR_ENDPOINT")?,
            key: require("AZURE_OCR_KEY")?,
            model_id: require("DOCKET_MODEL_ID")?,
            api_version: get("DOCKET_API_VERSION").unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
        };

        let processed =
            get("DOCKET_PROCESSED_CONTAINER").unwrap_or_else(|| DEFAULT_PROCESSED_CONTAINER.to_string());
        let containers = Containers {
            raw: get("DOCKET_RAW_CONTAINER").unwrap_or_else(|| DEFAULT_RAW_CONTAINER.to_string()),
            report: get("DOCKET_REPORT_CONTAINER").unwrap_or_else(|| processed.clone()),
            processed,
        };

        let poll_secs = seconds("DOCKET_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS)?;
        if poll_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "DOCKET_POLL_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }
        let timeout_secs = seconds("DOCKET_ANALYSIS_TIMEOUT_SECS", DEFAULT_ANALYSIS_TIMEOUT_SECS)?;
        let max_polls = poll_budget(timeout_secs, poll_secs).ok_or_else(|| ConfigError::Invalid {
            key: "DOCKET_ANALYSIS_TIMEOUT_SECS",
            value: timeout_secs.to_string(),
        })?;
        let request_timeout = Duration::from_secs(seconds(
            "DOCKET_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?);

        let index_column = match get("DOCKET_REPORT_INDEX_COLUMN").as_deref() {
            None => false,
            Some(v) => parse_bool(v).ok_or_else(|| ConfigError::Invalid {
                key: "DOCKET_REPORT_INDEX_COLUMN",
                value: v.to_string(),
            })?,
        };

        let config = PipelineConfig {
            storage,
            analysis,
            containers,
            poll_interval: Duration::from_secs(poll_secs),
            max_polls,
            request_timeout,
            report: ReportOptions {
                index_column,
                ..ReportOptions::default()
            },
            ledger_path: get("DOCKET_LEDGER_PATH").map(PathBuf::from),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for name in [
            &self.containers.raw,
            &self.containers.processed,
            &self.containers.report,
        ] {
            if !is_valid_container_name(name) {
                return Err(ConfigError::InvalidContainer(name.clone()));
            }
        }
        if self.containers.raw == self.containers.processed
            || self.containers.raw == self.containers.report
        {
            return Err(ConfigError::Invalid {
                key: "DOCKET_RAW_CONTAINER",
                value: format!("'{}' must differ from the output containers", self.containers.raw),
            });
        }
        if self.max_polls == 0 {
            return Err(ConfigError::Invalid {
                key: "DOCKET_ANALYSIS_TIMEOUT_SECS",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// Ledger location alone, for commands that only read history.
    pub fn ledger_path_from_env() -> Option<PathBuf> {
        let _ = dotenvy::dotenv();
        std::env::var("DOCKET_LEDGER_PATH")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    }

    /// Longest time an analysis may take before it is abandoned.
    pub fn analysis_timeout(&self) -> Duration {
        self.poll_interval
            .checked_mul(self.max_polls)
            .unwrap_or(Duration::MAX)
    }
}

/// Polls needed to cover `timeout_secs` at `poll_secs` apart, rounded up, at least one.
/// `None` when the count does not fit in a `u32`.
fn poll_budget(timeout_secs: u64, poll_secs: u64) -> Option<u32> {
    let polls = timeout_secs / poll_secs + u64::from(timeout_secs % poll_secs != 0);
    u32::try_from(polls.max(1)).ok()
}

fn parse_bool(v: &str) -> Option<bool> {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Blob container naming rules: 3-63 chars, lowercase alphanumerics, hyphens only between alphanumerics.
pub fn is_valid_container_name(name: &str) -> bool {
    let Ok(re) = Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$") else {
        return false;
    };
    (3..=63).contains(&name.len()) && re.is_match(name)
}
