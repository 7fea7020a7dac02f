use anyhow::{anyhow, Result};
use std::env;
use std::sync::Arc;
use tokio;
use tracing;
use tracing_subscriber;
use waterme_core::{Config, WorkerContext};
use waterme_delivery::FcmProvider;
use waterme_dispatch::{run as run_dispatch, TemplateRegistry};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if env::var("LOG_FORMAT").map(|v| v.eq_ignore_ascii_case("json")).unwrap_or(false) {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    tracing::info!("Starting Water Me notification worker");

    // Load configuration
    let config = Config::from_env();
    let templates = TemplateRegistry::load(&config.worker.messages_dir)
        .map_err(|e| anyhow!("Failed to load notification messages: {}", e))?;
    let provider = FcmProvider::new(&config.delivery)?;

    tracing::info!("========================================");
    tracing::info!("Notification Worker Started");
    tracing::info!("========================================");
    tracing::info!("Configuration:");
    tracing::info!("  - Items page size: {}", config.worker.scan_page_size);
    tracing::info!("  - Push batch size: {}", config.worker.push_batch_size);
    tracing::info!("  - Check interval: {:?}", config.worker.interval());
    tracing::info!("  - Cycle timeout: {:?}", config.worker.cycle_timeout());
    tracing::info!("  - Cooldown period: {}s", config.worker.cooldown_secs);
    tracing::info!("  - User concurrency: {}", config.worker.user_concurrency);
    tracing::info!("========================================");

    let ctx = WorkerContext::new(config).await?;
    tracing::info!("Worker context initialized");

    run_dispatch(ctx, Arc::new(provider), templates, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await;

    tracing::info!("Notification worker stopped");
    Ok(())
}
