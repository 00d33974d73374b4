//! txstats - live transaction statistics over a trailing window
//!
//! Boots the transaction service, starts the expiry sweeper and serves the
//! HTTP API until Ctrl-C.

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use std::{path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use txstats_backend::{
    api,
    config::{Args, ServiceConfig},
    service::TransactionService,
    sweeper::Sweeper,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Environment first so clap sees .env values
    load_env();
    init_tracing();

    let config = ServiceConfig::try_from(Args::parse()).context("Invalid configuration")?;

    info!("🚀 txstats starting");
    info!(
        "⏱️  Window: {}s | Sweep interval: {}ms",
        config.window.num_seconds(),
        config.sweep_interval.as_millis()
    );

    let service = Arc::new(TransactionService::from_config(&config));
    let sweeper = Sweeper::new(service.clone(), config.sweep_interval).spawn();

    let app = api::create_router(service);

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    info!("🎯 API server listening on {}", config.bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    sweeper.stop().await;
    info!("👋 txstats stopped");

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    info!("Shutdown signal received");
}

/// Initialize tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "txstats_backend=debug,txstats=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // Standard dotenv search (cwd + parents)
    let _ = dotenv();

    // Also try the crate directory when launched from elsewhere
    let manifest_env = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if manifest_env.exists() {
        let _ = dotenv::from_path(&manifest_env);
    }
}
