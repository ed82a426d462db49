pub mod analysis;
pub mod commands;
pub mod confidence;
pub mod config;
pub mod db;
pub mod error;
pub mod excel;
pub mod normalizer;
pub mod pipeline;
pub mod storage;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use confidence::ConfidenceBand;
pub use config::PipelineConfig;
pub use error::PipelineError;
pub use pipeline::Pipeline;
pub use types::{DocumentRecord, DocumentReport, DocumentState, ExtractedField};

use clap::Parser;
use commands::CliArgs;
use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Parse arguments, set up logging and dispatch. Returns the process exit code.
pub fn run() -> i32 {
    let args = CliArgs::parse();
    init_logging(&args);
    tracing::debug!("docket-scanner v{} starting", VERSION);
    commands::handle(&args.command)
}

fn init_logging(args: &CliArgs) {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        let level = if let Some(level_str) = &args.log_level {
            parse_level(level_str)
        } else if args.verbose {
            Level::DEBUG
        } else if args.quiet {
            Level::ERROR
        } else {
            let level_str = env::var("DOCKET_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
            parse_level(&level_str)
        };

        let filter = if env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::new(format!(
                "docket_scanner_lib={level},docket_scanner={level},h2=warn,hyper=warn,reqwest=warn",
                level = level
            ))
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    });
}

fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}
