//! resilient-sql - Main entry point.
//!
//! Runs one statement (or a schema snapshot with `--describe`) and prints the
//! result as JSON on stdout. Logs go to stderr.

use resilient_sql::config::Config;
use resilient_sql::error::SqlError;
use resilient_sql::{SqlClient, template};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String, SqlError> {
    let json = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    json.map_err(|e| SqlError::invalid_input(format!("Failed to serialize output: {}", e)))
}

/// Run the configured statement and return the JSON to print.
async fn run(config: &Config) -> Result<String, SqlError> {
    let connection = config.connection_config().map_err(SqlError::invalid_input)?;
    let encoding = template::encoding_for_label(&config.encoding)?;
    let client = SqlClient::from_config(connection, config.executor_config())?;

    match config.statement_source() {
        Some(source) if !config.describe => {
            // materialize before touching the database
            let statement =
                template::materialize_with_encoding(&source, &config.substitutions(), encoding)
                    .await?;
            if config.print_query {
                info!(sql = %statement, "Materialized statement");
            }
            let rows = client
                .scoped(|c| Box::pin(async move { c.execute_statement(&statement).await }))
                .await?;
            info!(rows = rows.len(), "Done");
            to_json(&rows, config.pretty)
        }
        _ => {
            let snapshot = client
                .scoped(|c| Box::pin(async move { c.metadata_snapshot().await }))
                .await?;
            info!(tables = snapshot.tables.len(), "Done");
            to_json(snapshot.as_ref(), config.pretty)
        }
    }
}

#[tokio::main]
async fn main() {
    // Parse configuration from command line and environment
    let config = Config::parse_args();

    // Initialize logging
    init_tracing(&config);

    match config.credentials() {
        Ok(target) => info!(
            database = %target,
            "Starting resilient-sql v{}",
            env!("CARGO_PKG_VERSION")
        ),
        Err(_) => info!("Starting resilient-sql v{}", env!("CARGO_PKG_VERSION")),
    }

    match run(&config).await {
        Ok(output) => println!("{}", output),
        Err(e) => {
            error!(error = %e, "Execution failed");
            eprintln!("Error: {}", e);
            if let Some(suggestion) = e.suggestion() {
                eprintln!("Suggestion: {}", suggestion);
            }
            std::process::exit(1);
        }
    }
}
