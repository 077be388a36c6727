mod config;
mod health;
mod http;
mod metrics;
mod policy;
mod target;
mod transport;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::metrics::MetricsRegistry;
use crate::policy::AccessPolicy;
use crate::transport::TransportMode;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "ghproxy", about = "GitHub download reverse proxy")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Socket address for the HTTP listener.
    #[arg(short, long, default_value = "0.0.0.0:5340")]
    listen: SocketAddr,

    /// Directory holding `index.html` and `favicon.ico`.
    #[arg(long, default_value = ".")]
    static_dir: PathBuf,
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// State shared read-only by all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub policy: Arc<AccessPolicy>,
    /// Pooled upstream client, direct or through SOCKS5.
    pub http_client: reqwest::Client,
    pub metrics: MetricsRegistry,
    pub static_dir: PathBuf,
}

// ---------------------------------------------------------------------------
// HTTP server (axum)
// ---------------------------------------------------------------------------

async fn run_http_server(state: AppState, listen_addr: SocketAddr) -> Result<()> {
    let app = http::handler::create_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind HTTP listener on {listen_addr}"))?;

    tracing::info!(%listen_addr, "HTTP server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("HTTP server error")?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Graceful shutdown
// ---------------------------------------------------------------------------

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("received SIGINT"),
        () = terminate => tracing::info!("received SIGTERM"),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // ---- CLI ----
    let cli = Cli::parse();

    // ---- Config ----
    let config = config::load_config(&cli.config)?;
    let config = Arc::new(config);

    // ---- Tracing ----
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!(config_path = %cli.config.display(), "starting ghproxy");

    // ---- Transport ----
    let mode = TransportMode::from_config(&config);
    let http_client = transport::build_client(&mode)?;
    tracing::info!(transport = %mode, "upstream transport initialised");

    // ---- Policy ----
    let policy = AccessPolicy::from_config(&config);
    tracing::info!(
        whitelist = policy.whitelist_len(),
        blacklist = policy.blacklist_len(),
        size_limit = config.size_limit,
        "access policy loaded"
    );

    // ---- App state ----
    let state = AppState {
        config: Arc::clone(&config),
        policy: Arc::new(policy),
        http_client,
        metrics: MetricsRegistry::new(),
        static_dir: cli.static_dir,
    };

    run_http_server(state, cli.listen).await?;

    tracing::info!("ghproxy shut down cleanly");
    Ok(())
}
