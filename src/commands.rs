use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::analysis::{AnalysisError, AzureDocumentAnalyzer};
use crate::config::{ConfigError, PipelineConfig, StorageBackend};
use crate::db::{Db, LedgerEntry, LedgerError};
use crate::error::PipelineError;
use crate::pipeline::Pipeline;
use crate::storage::{AzureBlobStore, BlobStore, LocalBlobStore, StorageError};
use crate::types::ScanSummary;

/// Printed once a triggered document has been fully processed.
pub const ACKNOWLEDGEMENT: &str = "This Blob triggered function executed successfully.";

/// Turns scanned delivery dockets into colour-coded Excel reports.
#[derive(Parser, Debug)]
#[command(
    name = "docket-scanner",
    version,
    about = "Extract fields from scanned dockets into confidence-coded Excel reports",
    long_about = "Each document in the raw container is analysed with a custom Document \
                  Intelligence model. The extracted fields are written to an Excel report \
                  whose confidence column is colour-coded, and the source is moved to the \
                  processed container.\n\n\
                  Configuration is read from the environment and from a .env file."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, value_name = "LEVEL", help = "Set logging level")]
    pub log_level: Option<String>,

    #[arg(short = 'v', long, global = true, help = "Debug logging")]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long,
        global = true,
        conflicts_with = "verbose",
        help = "Only log errors"
    )]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Process one document that arrived in the raw container
    Process {
        #[arg(value_name = "BLOB")]
        name: String,
    },

    /// Process every document currently in the raw container
    Scan,

    /// Show recorded state transitions from the ledger
    History {
        #[arg(long, help = "Only documents whose latest state is failed")]
        failed: bool,

        #[arg(long, default_value_t = 20)]
        limit: u32,

        #[arg(value_name = "BLOB")]
        name: Option<String>,
    },
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Ledger: {0}")]
    Ledger(#[from] LedgerError),

    #[error("DOCKET_LEDGER_PATH is not set; no history is recorded")]
    NoLedger,
}

/// Wire the store, analyzer and optional ledger described by `config`.
pub fn build_pipeline(config: PipelineConfig) -> Result<Pipeline, CommandError> {
    let store: Box<dyn BlobStore> = match &config.storage {
        StorageBackend::Azure {
            account_url,
            sas_token,
        } => Box::new(AzureBlobStore::new(
            account_url,
            sas_token.as_deref(),
            config.request_timeout,
        )?),
        StorageBackend::Local { root } => {
            let store = LocalBlobStore::new(root)?;
            tracing::info!(root = %store.root().display(), "Using local blob store");
            Box::new(store)
        }
    };
    let analyzer = AzureDocumentAnalyzer::new(
        &config.analysis.endpoint,
        &config.analysis.key,
        &config.analysis.api_version,
        config.request_timeout,
    )?;

    let ledger = match &config.ledger_path {
        Some(path) => match Db::new(path) {
            Ok(db) => Some(db),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ledger unavailable; continuing without it");
                None
            }
        },
        None => None,
    };

    let pipeline = Pipeline::new(config, Box::new(analyzer), store);
    Ok(match ledger {
        Some(db) => pipeline.with_ledger(db),
        None => pipeline,
    })
}

pub fn handle(command: &Commands) -> i32 {
    let result = match command {
        Commands::Process { name } => handle_process(name),
        Commands::Scan => handle_scan(),
        Commands::History {
            failed,
            limit,
            name,
        } => handle_history(name.as_deref(), *failed, *limit),
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("Error: {}", e);
            2
        }
    }
}

fn load_pipeline() -> Result<Pipeline, CommandError> {
    let config = PipelineConfig::from_env()?;
    tracing::debug!(config = ?config, "Loaded configuration");
    build_pipeline(config)
}

fn handle_process(name: &str) -> Result<i32, CommandError> {
    let pipeline = load_pipeline()?;
    match pipeline.process(name) {
        Ok(_) => {
            println!("{}", ACKNOWLEDGEMENT);
            Ok(0)
        }
        Err(e) => {
            eprintln!("{}: {}", name, e);
            Ok(1)
        }
    }
}

fn handle_scan() -> Result<i32, CommandError> {
    let pipeline = load_pipeline()?;
    let summary = pipeline.scan()?;
    print!("{}", format_summary(&summary));
    Ok(if summary.all_succeeded() { 0 } else { 1 })
}

fn handle_history(name: Option<&str>, failed: bool, limit: u32) -> Result<i32, CommandError> {
    let path = PipelineConfig::ledger_path_from_env().ok_or(CommandError::NoLedger)?;
    let db = Db::new(&path)?;
    let entries = match name {
        Some(name) => db.history_for(name)?,
        None if failed => db.latest_failures(limit)?,
        None => db.recent(limit)?,
    };
    if entries.is_empty() {
        println!("No history recorded.");
    }
    for entry in &entries {
        println!("{}", format_entry(entry));
    }
    Ok(0)
}

pub fn format_summary(summary: &ScanSummary) -> String {
    let mut out = String::new();
    for record in &summary.relocated {
        out.push_str(&format!("relocated  {} -> {}\n", record.name, record.report_name));
    }
    for record in &summary.failed {
        out.push_str(&format!(
            "failed     {}: {}\n",
            record.name,
            record.error.as_deref().unwrap_or("unknown error")
        ));
    }
    out.push_str(&format!(
        "{} relocated, {} failed\n",
        summary.relocated.len(),
        summary.failed.len()
    ));
    out
}

pub fn format_entry(entry: &LedgerEntry) -> String {
    let mut line = format!(
        "{}  {:<9}  {}",
        entry.created_at,
        entry.state.as_str(),
        entry.document
    );
    if let Some(err) = &entry.error_message {
        line.push_str(&format!("  ({})", err));
    }
    line
}
