/// askpanel coordinator - main entry point
use askpanel_core::backend::HttpBackend;
use askpanel_core::{Config, Coordinator};
use std::env;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    // Parse configuration
    let args: Vec<String> = env::args().collect();
    let config = Config::from_args(&args)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let backend = HttpBackend::new(&config.backend_url)
        .map_err(|e| anyhow::anyhow!("Backend error: {}", e))?;

    let coordinator = Coordinator::new(config, Arc::new(backend))
        .map_err(|e| anyhow::anyhow!("Startup error: {}", e))?;
    info!("   Command API:  {}", coordinator.config().api_addr);
    info!("   Observer API: http://{}", coordinator.config().observer_addr);

    // Runs until shutdown signal
    coordinator.run().await
        .map_err(|e| anyhow::anyhow!("Coordinator error: {}", e))?;

    Ok(())
}
