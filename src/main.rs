//! EdgeHost Worker Daemon
//!
//! Multi-tenant subdomain worker: tenant registration API, billing webhook
//! reconciliation, and static origin proxying behind one listener.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use edgehost::store::InMemoryStore;
use edgehost::{build_router, AppState, WorkerConfig};

/// EdgeHost Worker Daemon
#[derive(Parser, Debug)]
#[command(name = "edgehostd")]
#[command(version)]
#[command(about = "Multi-tenant subdomain worker: registry, billing webhooks, static proxy")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "8787")]
    port: u16,

    /// Host to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing; RUST_LOG directives layer over the baseline level
    let default_level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.into()))
        .init();

    let config = WorkerConfig::from_env().context("loading worker configuration")?;
    tracing::info!(
        origin = %config.origin,
        deployment = %config.deployment,
        webhook_path = %config.webhook_path,
        "edgehostd starting"
    );

    let store = Arc::new(InMemoryStore::new());
    let state = Arc::new(AppState::new(config, store).context("wiring worker state")?);
    let app = build_router(state);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(addr = %addr, "listening");

    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}
