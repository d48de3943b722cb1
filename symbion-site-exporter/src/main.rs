//! Symbion Site Exporter - entry point
//!
//! Registers the gauges, starts the metrics endpoint, then runs the
//! collection loop until the process is killed.

use anyhow::{Context, Result};
use std::sync::Arc;
use symbion_site_exporter::http::{self, AppState};
use symbion_site_exporter::{Collector, ExporterConfig, SiteMetrics};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("symbion_site_exporter=info")),
        )
        .init();

    info!("Symbion Site Exporter v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = ExporterConfig::from_env().context("Invalid exporter configuration")?;
    let metrics = Arc::new(SiteMetrics::new().context("Failed to register metrics")?);

    let listener = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind metrics endpoint on {}", config.listen_addr))?;
    info!("Serving metrics on http://{}/metrics", config.listen_addr);

    let collector = Collector::new(&config, metrics.clone())
        .context("Failed to create collector")?;
    let app_state = AppState { metrics };

    tokio::select! {
        result = http::serve(listener, app_state) => {
            result.context("Metrics endpoint failed")?;
        }
        _ = collector.run() => {}
    }

    Ok(())
}
