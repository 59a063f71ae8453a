//! mpcwallet - command-line client for the MPC wallet backend.
//!
//! Logs in against the backend, keeps the access token fresh through the
//! core client's refresh handling, and prints endpoint results as JSON.

mod commands;

use std::io;
use std::sync::Arc;

use anyhow::Result;
use mpcwallet_core::{ApiClient, Config, Session};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use commands::Command;

/// Set to a directory to also write logs to a file there
const LOG_DIR_ENV: &str = "MPCWALLET_LOG_DIR";

/// Log file name inside the log directory
const LOG_FILE: &str = "mpcwallet.log";

/// Initialize the tracing subscriber for logging.
/// The returned guard must live until exit so buffered file logs are flushed.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var_os(LOG_DIR_ENV) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;

    let mut config = Config::load()?;
    let session = Arc::new(Session::new());
    let client = ApiClient::from_config(&config, Arc::clone(&session))?;
    info!(api_url = client.base_url(), "mpcwallet starting");

    commands::run(command, &client, &mut config).await
}
