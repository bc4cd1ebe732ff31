use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tx_readable::config::Config;
use tx_readable::handlers::{AppState, router};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; the process environment still applies
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting transaction explainer server...");
    let config = Config::from_env()?;

    let http = reqwest::Client::builder()
        .timeout(config.http_timeout)
        .build()
        .context("Failed to build HTTP client")?;

    if config.gemini_api_key.is_none() {
        info!("GOOGLE_GEMINI_API_KEY not set, AI enhancement is off");
    }
    let state = Arc::new(AppState::from_config(&config, http));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("Server running on http://{}", config.bind_addr);
    info!("API endpoint: http://{}/api/explain", config.bind_addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
