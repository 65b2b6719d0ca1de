//! AScaler - request-rate autoscaler
//!
//! Polls a label-selected group of application pods, derives a replica
//! target from their request rate and applies it, draining pods gracefully
//! on scale-down.

use anyhow::{Context, Result};
use ascaler::{api, bootstrap, config::AppConfig};
use ascaler_lib::health::components;
use ascaler_lib::{HealthRegistry, PollDriver, ScalerMetrics};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

/// Command-line flags
#[derive(Debug, Parser)]
#[command(name = "ascaler")]
#[command(author, version, about = "Request-rate autoscaler for a label-selected pod group", long_about = None)]
struct Cli {
    /// Configuration file (optional; ASCALER_* environment variables override it)
    #[arg(long, env = "ASCALER_CONFIG", default_value = "/etc/ascaler/config.yaml")]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value = "json")]
    log_format: LogFormat,

    /// Run a single poll cycle and exit
    #[arg(long)]
    once: bool,
}

fn init_tracing(format: LogFormat) {
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Text => registry.with(fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    info!(
        version = VERSION,
        args = ?std::env::args().collect::<Vec<_>>(),
        "Starting ascaler"
    );

    let config = AppConfig::load(&cli.config)?;
    info!(
        source = ?config.source,
        master = %config.orchestrator.master,
        selector = %config.group.selector,
        replica_group = %config.group.replica_group,
        poll_interval_secs = config.poll_interval_secs,
        "Configuration loaded"
    );

    let health = HealthRegistry::new();
    let metrics = ScalerMetrics::new();

    let orchestrator = bootstrap::build_orchestrator(&config)?;
    bootstrap::probe_orchestrator(&config, orchestrator.as_ref(), &health).await;
    let source = bootstrap::build_source(&config, orchestrator, &health).await?;

    if config.api_port != 0 {
        let state = Arc::new(api::AppState::new(health.clone(), metrics));
        let port = config.api_port;
        tokio::spawn(async move {
            if let Err(e) = api::serve(port, state).await {
                error!(error = %e, "API server stopped");
            }
        });
    }

    let mut driver = PollDriver::new(source, config.poll_config(), health.clone());
    health.set_ready(true).await;

    if cli.once {
        health.register(components::POLL_LOOP).await;
        return driver.tick().await.context("Poll cycle failed");
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("SIGINT received");
                let _ = shutdown_tx.send(());
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for shutdown signal");
                // Dropping the sender would stop the loop
                let _keep = shutdown_tx;
                std::future::pending::<()>().await
            }
        }
    });

    driver.run(shutdown_rx).await.context("Poll loop stopped")?;
    info!("Shutting down");
    Ok(())
}
