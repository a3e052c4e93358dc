use anyhow::{Context, Result};
use clap::Parser;
use std::time::Duration;

use loglocal::config::{Cli, load_config_with_cli};
use loglocal::{LogLocal, callsite};

#[derive(Debug, thiserror::Error)]
#[error("division by zero")]
struct DivisionByZero;

fn divide(a: i64, b: i64) -> Result<i64, DivisionByZero> {
    if b == 0 { Err(DivisionByZero) } else { Ok(a / b) }
}

async fn fetch_report(id: u32) -> String {
    tokio::time::sleep(Duration::from_millis(50)).await;
    format!("report-{id}")
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = load_config_with_cli(&cli).context("Failed to load configuration")?;

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let log = LogLocal::from_config(&config).context("Failed to initialize logging")?;

    let divide = log.wrap(callsite!(divide), divide);
    let quotient = divide(10, 2)?;
    tracing::info!(quotient, "Sample division finished");
    if let Err(e) = divide(10, 0) {
        tracing::warn!(error = %e, "Sample division failed as expected");
    }

    let fetch_report = log
        .wrapper()
        .start_span(true)
        .wrap_async(callsite!(fetch_report), fetch_report);
    let report = fetch_report(7).await;
    tracing::info!(%report, "Sample report fetched");

    log.shutdown()?;
    Ok(())
}
