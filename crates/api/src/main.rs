//! CalWeave server binary
//!
//! Wires the application context, starts the sweep scheduler, and serves
//! the HTTP surface until interrupted. Shutdown drains the sync queue so
//! in-flight mirror pushes finish before the process exits.

use std::sync::Arc;

use anyhow::Result;
use calweave_app::{routes, AppContext};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = calweave_infra::config::load()?;
    let context = Arc::new(AppContext::new(config)?);

    let mut scheduler = context.scheduler();
    // Catch up on anything missed while the process was down, then let the
    // periodic sweep take over.
    if let Err(err) = scheduler.run_once().await {
        warn!(error = %err, "startup sweep failed");
    }
    scheduler.start()?;

    let app = routes::router(Arc::clone(&context));
    let listener =
        TcpListener::bind((context.config.server.host.as_str(), context.config.server.port))
            .await?;
    info!(address = %listener.local_addr()?, "calweave listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("shutting down");
    scheduler.stop().await;
    context.sync.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
