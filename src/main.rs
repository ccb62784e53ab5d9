use anyhow::Result;
use std::process::ExitCode;
use std::sync::Arc;

mod auth;
mod chromedriver_manager;
mod config;
mod diagnostics;
mod error;
mod export;
mod logging;
mod models;
mod scraper;

use chromedriver_manager::ChromeDriverManager;
use config::AppConfig;
use scraper::{ScraperConfig, ScraperEngine, TracingLogger};

#[tokio::main]
async fn main() -> ExitCode {
    // Configuration problems abort before any browser is launched
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logging::init(&config.settings) {
        eprintln!("{:#}", e);
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AppConfig) -> Result<()> {
    tracing::debug!(?config, "Loaded configuration");

    let manager = Arc::new(ChromeDriverManager::new(
        config.credentials.driver_path.clone(),
        config.settings.driver_port,
    ));

    let mut engine = ScraperEngine::connect(
        ScraperConfig::from_app_config(&config),
        TracingLogger::shared(),
        manager,
        config.settings.headless,
    )
    .await?;

    let result = engine.run().await;

    if let Err(e) = engine.close().await {
        tracing::warn!("{:#}", e);
    }
    tracing::info!("Browser closed");

    let summary = result?;
    tracing::info!(
        recorded = summary.recorded,
        duplicates = summary.duplicates,
        unlabeled = summary.unlabeled,
        stop_reason = ?summary.stop_reason,
        "Done"
    );
    Ok(())
}
