//! Order Forecast CLI
//!
//! Merges an uploaded CSV into the stored history and prints next month's
//! order forecast as a JSON envelope on stdout.

use anyhow::{Context, Result};
use clap::Parser;
use order_forecast::{
    CsvHistoryStore, ForecastConfig, ForecastRequest, ForecastResponse, ForecastService,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "order_forecast", version, about = "Forecast next month's order quantities")]
struct Cli {
    /// CSV file with monthly store/product observations
    #[arg(long)]
    upload: Option<PathBuf>,

    /// Minimum months of history a store/product pair needs
    #[arg(long)]
    min_months: Option<String>,

    /// History CSV to merge into and persist
    #[arg(long, env = "ORDER_FORECAST_HISTORY")]
    history: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Pretty-print the JSON response
    #[arg(long)]
    pretty: bool,
}

fn main() -> Result<ExitCode> {
    // Logs go to stderr; stdout carries the response
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ForecastConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ForecastConfig::default(),
    };
    if let Some(history) = cli.history {
        config = config.with_history_path(history);
    }

    let upload = match &cli.upload {
        Some(path) => Some(
            std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?,
        ),
        None => None,
    };
    let request = ForecastRequest {
        upload,
        min_months: cli.min_months,
    };

    let service = ForecastService::new(CsvHistoryStore::new(&config.history_path), config);
    let (response, code) = match service.run(request) {
        Ok(outcome) => (ForecastResponse::from_outcome(&outcome), ExitCode::SUCCESS),
        Err(err) => {
            tracing::warn!(error = %err, status = err.http_status(), "forecast failed");
            let code = if err.is_user_error() { 2 } else { 1 };
            (ForecastResponse::failure(&err), ExitCode::from(code))
        }
    };

    let json = if cli.pretty {
        response.to_json_pretty()?
    } else {
        response.to_json()?
    };
    println!("{}", json);

    Ok(code)
}
