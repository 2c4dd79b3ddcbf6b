// Revenue Ledger - Web Server
// REST API with Axum

use anyhow::{Context, Result};
use clap::Parser;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::info;

use revenue_ledger::log::init_logging;
use revenue_ledger::{build_router, AppConfig, AppState, Store};

#[derive(Parser)]
#[command(version, about = "Revenue ledger REST API server")]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to optional YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = AppConfig::load(args.config.as_deref())?;
    let store = Store::open(Path::new(&config.database_path))?;

    let addr = config.server.bind_address();
    let app = build_router(AppState::new(store, config));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(address = %addr, "Revenue server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(tokio::signal::ctrl_c()))
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal(signal: impl Future<Output = std::io::Result<()>>) {
    if let Err(e) = signal.await {
        // Without a signal handler, keep serving until the process is killed
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
