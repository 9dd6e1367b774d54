//! cover-analytics - coverage analytics service
//!
//! `serve` (default) answers `GET /api/analytics`; `report` runs the same
//! pipeline once and prints the JSON report to stdout.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use cover_analytics::{
    config::{Args, Command},
    logging, pipeline,
    server::{self, AppState},
    subgraph::SubgraphClient,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    logging::init(&args.log_level, args.log_json);

    match args.command.clone().unwrap_or(Command::Serve) {
        Command::Serve => {
            let fetch = match args.fetch_config() {
                Ok(fetch) => Some(fetch),
                Err(e) => {
                    error!("Configuration error: {}", e);
                    None
                }
            };
            info!(
                "Page size {}, event source {:?}, tie-break {:?}",
                args.page_size, args.event_source, args.tie_break
            );
            let state = Arc::new(AppState { fetch, fold: args.fold_options() });
            server::run(state, args.listen).await?;
        }
        Command::Report { pretty } => {
            let fetch = args.fetch_config()?;
            let client = SubgraphClient::from_config(&fetch)?;
            let report = pipeline::build_report(&client, &args.fold_options()).await?;
            let json = if pretty {
                serde_json::to_string_pretty(&report)
            } else {
                serde_json::to_string(&report)
            }
            .context("failed to serialize report")?;
            println!("{json}");
        }
    }

    Ok(())
}
