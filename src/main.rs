use std::sync::Arc;

use anyhow::Context;
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing::{error, info};

mod analysis;
mod config;
mod db;
mod handlers;
mod llm;
mod state;
mod utils;

use analysis::builder::AdviceRequestBuilder;
use analysis::orchestrator::Orchestrator;
use config::{Config, LoggingSettings};
use db::ledger::Ledger;
use llm::gemini::{GeminiClient, GeminiSettings};
use state::AppState;
use utils::logging::init_logging;

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {err}");
        return;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let logging = LoggingSettings::from_env();
    let _logging_guards = init_logging(&logging.log_level, &logging.log_dir);

    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            error!("Failed to load configuration: {err:#}");
            return Err(err);
        }
    };

    info!(
        model = %config.gemini_model,
        database = %config.database_url,
        "Starting GreenIt plant care service"
    );

    let ledger = Ledger::init(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to open search ledger")?;

    let model = GeminiClient::new(GeminiSettings::from_config(&config))?;
    let orchestrator = Orchestrator::new(
        Arc::new(model),
        ledger.clone(),
        AdviceRequestBuilder::new(&config.fallback_language),
    );
    let state = AppState::new(orchestrator, ledger.clone(), config.stats_top_limit);
    let app = handlers::http::router(state, config.max_body_bytes);

    let address = config.bind_address()?;
    let listener = TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!("Running on http://{address}");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    ledger.close().await;
    served.context("HTTP server stopped with an error")?;
    info!("Server stopped");
    Ok(())
}
