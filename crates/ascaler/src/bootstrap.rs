//! Wiring the configured metric source to its collaborators

use crate::config::AppConfig;
use anyhow::{Context, Result};
use ascaler_lib::health::components;
use ascaler_lib::orchestrator::{KubeOrchestrator, Orchestrator};
use ascaler_lib::source::influx::InfluxClient;
use ascaler_lib::source::management::ManagementClient;
use ascaler_lib::source::{DirectPollSource, MetricSource, SourceKind, TimeSeriesSource};
use ascaler_lib::{HealthRegistry, Scaler};
use std::sync::Arc;
use tracing::{info, warn};

/// Connect to the orchestrator
pub fn build_orchestrator(config: &AppConfig) -> Result<Arc<dyn Orchestrator>> {
    let orchestrator = KubeOrchestrator::new(config.orchestrator_config())?;
    Ok(Arc::new(orchestrator))
}

/// Build the metric source selected by `config.source`
pub async fn build_source(
    config: &AppConfig,
    orchestrator: Arc<dyn Orchestrator>,
    health: &HealthRegistry,
) -> Result<Arc<dyn MetricSource>> {
    let target = config.target()?;
    let scaler = Scaler::new(orchestrator, config.scaling_policy(), config.drain_config());

    let source: Arc<dyn MetricSource> = match config.source {
        SourceKind::K8s => {
            let client = ManagementClient::new(config.request_timeout())?;
            Arc::new(DirectPollSource::new(
                target,
                config.endpoint_mode.resolver(),
                client,
                scaler,
                config.poll_interval(),
                config.drain_settle(),
            ))
        }
        SourceKind::Influxdb => {
            let store = InfluxClient::new(config.influx_config(), config.request_timeout())
                .context("Failed to create store client")?;

            // The database usually exists already
            if let Err(e) = store.create_database().await {
                info!(database = %store.database(), error = %e, "Database creation failed");
            }

            Arc::new(TimeSeriesSource::new(
                target,
                Arc::new(store),
                config.influxdb.table.clone(),
                config.influxdb.columns.clone(),
                scaler,
                config.poll_interval(),
            ))
        }
    };

    health.register(components::METRIC_SOURCE).await;
    info!(
        source = source.name(),
        selector = %source.selector(),
        replica_group = %source.replica_group(),
        "Metric source ready"
    );
    Ok(source)
}

/// Check that the orchestrator answers before entering the poll loop
pub async fn probe_orchestrator(
    config: &AppConfig,
    orchestrator: &dyn Orchestrator,
    health: &HealthRegistry,
) {
    match orchestrator.get_replicas(&config.group.replica_group).await {
        Ok(replicas) => {
            info!(
                replica_group = %config.group.replica_group,
                replicas,
                "Orchestrator reachable"
            );
            health.register(components::ORCHESTRATOR).await;
        }
        Err(e) => {
            warn!(error = %e, "Orchestrator not reachable yet");
            health
                .set_degraded(components::ORCHESTRATOR, format!("{:#}", e))
                .await;
        }
    }
}
