use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use accessgate::access::{PolicyTable, RequestGate};
use accessgate::config::AccessGateConfig;
use accessgate::http::{default_policies, demo_router, AccessGuard, AppState, HttpServer};
use accessgate::identity::MemorySessionStore;
use accessgate::store;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

/// Per-endpoint access limiting gateway
#[derive(Debug, Parser)]
#[command(name = "accessgate", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match args.log_format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }

    info!("Starting accessgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = AccessGateConfig::load(args.config.as_deref())?;
    if let Some(listen) = args.listen {
        config.server.http_addr = listen;
    }
    info!(http_addr = %config.server.http_addr, backend = ?config.store.backend, "Configuration loaded");

    let mut policies = default_policies();
    if let Some(path) = &config.access.policies_path {
        policies.merge(PolicyTable::from_file(path)?);
    }
    info!(endpoints = policies.len(), "Access policies loaded");

    let counters = store::connect(&config.store).await?;
    let gate = RequestGate::new(counters)
        .with_key_prefix(config.store.key_prefix.clone())
        .with_store_failure_policy(config.access.on_store_error);

    let sessions = Arc::new(MemorySessionStore::new(config.session.session_ttl_secs));
    store::spawn_sweeper(
        &sessions,
        Duration::from_secs(config.store.sweep_interval_secs.max(1)),
    );
    let guard = AccessGuard::new(gate, policies, sessions.clone())
        .with_token_name(&config.session.token_name);

    let state = AppState {
        sessions,
        token_name: config.session.token_name.clone(),
    };
    let server = HttpServer::new(config.server.http_addr, demo_router(state, guard));

    // Run the server with graceful shutdown on Ctrl+C
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("accessgate stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
