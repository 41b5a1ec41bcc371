//! Gateway binary

use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;

use unigate::config::GatewayConfig;
use unigate::core::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Display with the context chain, not Debug
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .init();

    let config = GatewayConfig::parse();

    let db = unigate::storage::connect_and_migrate(&config.database_url)
        .await
        .with_context(|| format!("opening database {}", config.database_url))?;

    let orchestrator = Orchestrator::new(db, config.strategy(), config.requests_per_minute);

    unigate::server::run(&config, orchestrator)
        .await
        .with_context(|| format!("serving on {}", config.bind_addr))?;
    Ok(())
}
